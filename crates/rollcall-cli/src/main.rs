use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// D-Bus proxy — `#[zbus::proxy]` generates `RollcallProxy` (async).
#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn start_session(&self) -> zbus::Result<String>;
    async fn submit_frame(&self, detections_json: &str) -> zbus::Result<String>;
    async fn end_session(&self) -> zbus::Result<String>;
    async fn roster(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn enroll(&self, label: &str, descriptors_json: &str) -> zbus::Result<String>;
    async fn list_enrollments(&self) -> zbus::Result<String>;
    async fn remove_enrollment(&self, label: &str) -> zbus::Result<bool>;
    async fn purge_enrollments(&self) -> zbus::Result<u32>;
    async fn export_csv(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an attendance session from the current enrollments
    Start,
    /// End the session and print the final roster
    Stop,
    /// Show the running roster
    Roster,
    /// Show daemon status
    Status,
    /// Enroll a person from a JSON file of 128-float descriptors
    Enroll {
        /// Label for this person (e.g., a name or student ID)
        #[arg(short, long)]
        label: String,
        /// Path to a JSON array of descriptors
        #[arg(short, long)]
        descriptors: PathBuf,
    },
    /// List enrolled people
    List,
    /// Remove one enrollment
    Remove {
        /// Label to remove
        label: String,
    },
    /// Remove all enrollments
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Export the current roster as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay a JSON-lines detection capture as session frames
    Feed {
        /// File with one frame per line: [{x, y, descriptor|null}, ...]
        file: PathBuf,
        /// Delay between frames in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is rollcalld running?)")?;
    let proxy = RollcallProxy::new(&conn)
        .await
        .context("creating rollcalld proxy")?;

    match cli.command {
        Commands::Start => {
            let info: serde_json::Value = serde_json::from_str(&proxy.start_session().await?)?;
            println!(
                "Session started: {} enrolled label(s), threshold {}",
                info["enrolled_labels"], info["threshold"]
            );
            if info["enrolled_labels"] == 0 {
                println!("warning: no enrollments — every face will be reported unknown");
            }
        }
        Commands::Stop => {
            let roster: serde_json::Value = serde_json::from_str(&proxy.end_session().await?)?;
            println!("Session ended.");
            print_roster(&roster);
        }
        Commands::Roster => {
            let roster: serde_json::Value = serde_json::from_str(&proxy.roster().await?)?;
            print_roster(&roster);
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Enroll { label, descriptors } => {
            let raw = std::fs::read_to_string(&descriptors)
                .with_context(|| format!("reading {}", descriptors.display()))?;
            // Validate shape client-side for a friendly error before the call.
            let parsed: Vec<Vec<f32>> =
                serde_json::from_str(&raw).context("descriptor file must be a JSON array of float arrays")?;
            println!("Enrolling '{label}' with {} descriptor(s)...", parsed.len());

            let summary: serde_json::Value =
                serde_json::from_str(&proxy.enroll(&label, &raw).await?)?;
            if summary["replaced"] == true {
                println!("Replaced previous enrollment for '{label}'");
            } else {
                println!("Enrolled '{label}'");
            }
        }
        Commands::List => {
            let listing: serde_json::Value =
                serde_json::from_str(&proxy.list_enrollments().await?)?;
            let entries = listing.as_array().map(Vec::as_slice).unwrap_or_default();
            if entries.is_empty() {
                println!("No enrollments");
            }
            for entry in entries {
                println!(
                    "{} ({} descriptor(s), enrolled {})",
                    entry["label"].as_str().unwrap_or("?"),
                    entry["descriptor_count"],
                    entry["created_at"].as_str().unwrap_or("?")
                );
            }
        }
        Commands::Remove { label } => {
            if proxy.remove_enrollment(&label).await? {
                println!("Removed '{label}'");
            } else {
                println!("No enrollment found for '{label}'");
            }
        }
        Commands::Purge { yes } => {
            if !yes {
                anyhow::bail!("refusing to remove all enrollments without --yes");
            }
            let removed = proxy.purge_enrollments().await?;
            println!("Removed {removed} enrollment(s)");
        }
        Commands::Export { output } => {
            let csv = proxy.export_csv().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::Feed { file, interval_ms } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut frames = 0u64;
            let mut dropped = 0u64;

            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reply: serde_json::Value =
                    serde_json::from_str(&proxy.submit_frame(line).await?)?;
                frames += 1;
                if reply["dropped"] == true {
                    dropped += 1;
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }

            println!("Fed {frames} frame(s), {dropped} dropped");
            let roster: serde_json::Value = serde_json::from_str(&proxy.roster().await?)?;
            print_roster(&roster);
        }
    }

    Ok(())
}

fn print_roster(roster: &serde_json::Value) {
    let known = roster["known_labels"].as_array().map(Vec::as_slice).unwrap_or_default();
    println!("Present ({}):", known.len());
    for label in known {
        println!("  {}", label.as_str().unwrap_or("?"));
    }
    println!("Unknown faces: {}", roster["unknown_count"]);
}
