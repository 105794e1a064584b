use anyhow::{Context, Result};
use cafewatch_core::{load_roster, ArcFaceEncoder, StatusSnapshot};
use cafewatch_store::SqliteStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.cafewatch.Monitor1",
    default_service = "org.cafewatch.Monitor1",
    default_path = "/org/cafewatch/Monitor1"
)]
trait Monitor1 {
    fn status(&self) -> zbus::Result<String>;
    fn reload_roster(&self) -> zbus::Result<bool>;
}

#[derive(Parser)]
#[command(name = "cafewatch", about = "cafewatch monitoring CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// SQLite database for offline reports
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show live daemon status
    Status {
        /// Print the raw JSON reply
        #[arg(long)]
        json: bool,
    },
    /// Ask the daemon to reload the staff roster now
    Reload,
    /// Cups completed per employee
    Scores,
    /// Latest visitor count sample
    Visitors,
    /// Recent system events
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Load the roster directory and report which photos enroll
    Roster {
        /// Directory of staff face photos
        #[arg(long, default_value = "data_wajah")]
        dir: PathBuf,
        /// ArcFace ONNX model file
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(cafewatch_store::default_db_path);

    match cli.command {
        Commands::Status { json } => {
            let proxy = connect(cli.system).await?;
            let reply = proxy.status().await.context("calling Status")?;
            if json {
                println!("{reply}");
            } else {
                let status: StatusSnapshot =
                    serde_json::from_str(&reply).context("decoding status reply")?;
                print_status(&status);
            }
        }
        Commands::Reload => {
            let proxy = connect(cli.system).await?;
            if proxy.reload_roster().await.context("calling ReloadRoster")? {
                println!("Roster reload requested");
            } else {
                println!("Roster reload unavailable (face encoder not loaded)");
            }
        }
        Commands::Scores => {
            let store = open_store(&db_path)?;
            let scores = store.employee_scores()?;
            if scores.is_empty() {
                println!("No employee records");
            }
            for record in scores {
                println!(
                    "{:<20} {:>5} cups  {:<6}  last seen {}",
                    record.name, record.cups, record.status, record.last_seen
                );
            }
        }
        Commands::Visitors => {
            let store = open_store(&db_path)?;
            let sample = store.latest_visitor_stats()?;
            println!("Total in:          {}", sample.total_in);
            println!("Current occupancy: {}", sample.current_occupancy);
            if let (Some(ts), Some(camera)) = (sample.timestamp, sample.camera_id) {
                println!("Sampled:           {ts} ({camera})");
            }
        }
        Commands::Events { limit } => {
            let store = open_store(&db_path)?;
            for event in store.recent_events(limit)? {
                println!("{}  {:<10}  {}", event.timestamp, event.event, event.detail);
            }
        }
        Commands::Roster { dir, model } => {
            let model = model.unwrap_or_else(|| {
                cafewatch_core::default_model_dir().join(cafewatch_core::ARCFACE_MODEL_FILE)
            });
            let mut encoder = ArcFaceEncoder::load(&model)
                .with_context(|| format!("loading face model {}", model.display()))?;
            let roster = load_roster(&dir, &mut encoder)?;
            println!("{} staff enrolled from {}", roster.len(), dir.display());
            for entry in roster.entries() {
                println!("  {:<20} {}-d descriptor", entry.name, entry.embedding.values.len());
            }
        }
    }

    Ok(())
}

async fn connect(system: bool) -> Result<Monitor1Proxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    Monitor1Proxy::new(&conn)
        .await
        .context("cafewatchd is not running")
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("opening database {}", path.display()))
}

fn print_status(status: &StatusSnapshot) {
    println!("Frames processed:  {}", status.frames_processed);
    println!("Visitors total:    {}", status.visitors_total);
    println!("Current occupancy: {}", status.occupancy);
    println!("Roster size:       {}", status.roster_size);
    if !status.phone_violations.is_empty() {
        println!("On phone:          {}", status.phone_violations.join(", "));
    }
    println!("Scores:");
    for (name, cups) in &status.scores {
        println!("  {name:<20} {cups}");
    }
}
