use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use furnace_control::app::App;
use furnace_control::auth::{SharedSecret, StaticIdentity};
use furnace_control::clock::SystemClock;
use furnace_control::config::Config;
use furnace_control::furnace::FurnaceId;
use furnace_control::persistence::{FileStore, Persistence};
use furnace_control::presentation::{format_hhmmss, format_mmss, NullSink, PresentationSink};
use furnace_control::store::FurnaceStore;
use furnace_control::ui::dashboard::{status_label, DashboardView};

/// Furnace Control - operator console for the РП-2/3/4 heating furnaces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Operator whose state is loaded and saved
    #[arg(short, long)]
    user: Option<String>,

    /// Directory for saved furnace state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Interactive dashboard (default)
    Run,
    /// Print the state of every furnace
    Status,
    /// Print the journals of every furnace
    Report,
    /// Start the user with empty furnaces and journals
    Register,
    /// Delete all saved state of the user
    ClearData,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run);

    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };
    if let Some(user) = &args.user {
        config.identity.user = Some(user.clone());
    }

    let file_store = match args
        .data_dir
        .clone()
        .or_else(|| config.storage.dir.as_ref().map(PathBuf::from))
    {
        Some(dir) => FileStore::new(dir)?,
        None => FileStore::default(),
    };

    if command == Command::Run {
        // Logs would corrupt the dashboard, keep them in a file
        init_logging(args.debug, Some(&file_store.dir().join("furnace-control.log")))?;
    } else {
        init_logging(args.debug, None)?;
    }
    info!("Using storage directory {}", file_store.dir().display());
    let identity = StaticIdentity::new(config.identity.user.clone());

    match command {
        Command::Run => {
            if !std::io::stdout().is_terminal() {
                eprintln!("Error: the dashboard must be run in an interactive terminal.");
                eprintln!("Use 'furnace-control status' or 'furnace-control report' instead.");
                std::process::exit(1);
            }

            let mut store = build_store(&config, file_store, identity.clone(), DashboardView::new());
            store.load();
            let mut app = App::new(store, identity, &config);
            if let Err(e) = app.run().await {
                eprintln!("\nFurnace Control encountered an error: {e:#}");
                eprintln!("\nIf the terminal display is corrupted, try running:");
                eprintln!("  reset");
                return Err(e);
            }
        }
        Command::Status => {
            let mut store = build_store(&config, file_store, identity, NullSink);
            store.load();
            for id in FurnaceId::ALL {
                if store.needs_tick(id) {
                    store.tick(id);
                }
            }
            print_status(&store);
        }
        Command::Report => {
            let mut store = build_store(&config, file_store, identity, NullSink);
            store.load();
            print!("{}", store.report());
        }
        Command::Register => {
            let user = register(&config, file_store)?;
            println!("Initialized furnace data for {user}");
        }
        Command::ClearData => {
            let user = required_user(&config)?;
            let mut store = build_store(&config, file_store, identity, NullSink);
            store.clear_all_user_data()?;
            println!("Removed all saved furnace data for {user}");
        }
    }

    Ok(())
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let result = if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    result.context("Failed to set global default subscriber")
}

fn required_user(config: &Config) -> Result<String> {
    match &config.identity.user {
        Some(user) if !user.trim().is_empty() => Ok(user.clone()),
        _ => anyhow::bail!("No user given; pass --user or set identity.user in the config"),
    }
}

/// Replace the user's saved state with a clean table
fn register(config: &Config, file_store: FileStore) -> Result<String> {
    let user = required_user(config)?;
    let identity = StaticIdentity::new(Some(user.clone()));
    let mut store = build_store(config, file_store, identity, NullSink);
    store.register_new_user();
    Ok(user)
}

fn build_store<S: PresentationSink>(
    config: &Config,
    file_store: FileStore,
    identity: StaticIdentity,
    sink: S,
) -> FurnaceStore<S> {
    let persistence = Persistence::new(Box::new(file_store), Box::new(identity));
    FurnaceStore::new(
        config.furnace_settings(),
        Box::new(SystemClock),
        persistence,
        Box::new(SharedSecret::new(config.admin.secret.clone())),
        sink,
    )
}

fn print_status<S: PresentationSink>(store: &FurnaceStore<S>) {
    for (id, record) in store.records() {
        let stats = store.stats(id);
        println!(
            "{:<5} {:<12} карточка: {:<10} осталось: {:<4} нагрев: {}  простой: {}  выдано: {}  простой, мин: {}",
            id.label(),
            status_label(record.status()),
            if record.card_number.is_empty() { "-" } else { record.card_number.as_str() },
            record.remaining_sheets,
            format_mmss(store.heating_time_left(id)),
            format_hhmmss(store.downtime_elapsed_secs(id)),
            stats.total_sheets,
            stats.total_downtime_minutes,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use furnace_control::persistence::{storage_key, KeyValueStore};
    use tempfile::tempdir;

    #[test]
    fn test_register_replaces_saved_state() {
        let dir = tempdir().unwrap();
        let files = FileStore::new(dir.path()).unwrap();
        files
            .set(
                &storage_key("op"),
                r#"{"rp3": {"cardNumber": "K-1", "journal": [
                    {"timestamp": "2024-01-01T08:00:00Z", "message": "process-started", "cardNumber": "K-1"}
                ]}}"#,
            )
            .unwrap();

        let mut config = Config::default();
        config.identity.user = Some("op".to_string());
        assert_eq!(register(&config, files.clone()).unwrap(), "op");

        let mut store = build_store(&config, files, StaticIdentity::new(Some("op".to_string())), NullSink);
        assert_eq!(store.load(), 3);
        let record = store.record(FurnaceId::Rp3);
        assert_eq!(record.card_number, "");
        assert!(record.journal.is_empty());
    }

    #[test]
    fn test_register_needs_a_user() {
        let dir = tempdir().unwrap();
        let files = FileStore::new(dir.path()).unwrap();
        assert!(register(&Config::default(), files.clone()).is_err());
        assert_eq!(files.get(&storage_key("")).unwrap(), None);
    }
}
