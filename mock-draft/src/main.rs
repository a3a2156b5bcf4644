// Mock draft entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout is the command console)
// 2. Load config
// 3. Open database
// 4. Load the player pool and seed the configured event if it is new
// 5. Create channels and spawn the update logger
// 6. Spawn the command loop
// 7. Read commands from stdin until quit or EOF
// 8. Cleanup on exit

use std::path::Path;

use mock_draft::app::{self, App, Command};
use mock_draft::config;
use mock_draft::db;
use mock_draft::service::DraftService;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Mock draft starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: event={} ({}), {} teams",
        config.event.id,
        config.event.name,
        config.event.teams.len()
    );

    // 3. Open database
    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);
    let service = DraftService::from_config(db, &config);

    // 4. Seed the event
    let players = app::load_players(Path::new(&config.data_paths.players))
        .context("failed to load player pool")?;
    if app::seed_event(&service, &config, &players).context("failed to seed event")? {
        println!("Created event {} with {} players", config.event.id, players.len());
    }

    // 5. Channels and observers
    let (update_tx, update_rx) = broadcast::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let logger_handle = app::spawn_update_logger(update_rx);

    // 6. Command loop
    let app_state = App::new(service, config.event.id.clone(), update_tx);
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, out_tx, app_state).await {
            error!("Command loop error: {}", e);
        }
    });

    // 7. Console: one command per line, one reply per command
    println!("{} ({}). Type `help` for commands.", config.event.name, config.event.id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let cmd = match Command::parse(&line) {
            Ok(cmd) => cmd,
            Err(app::CommandError::Empty) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        let quit = cmd == Command::Quit;
        if cmd_tx.send(cmd).await.is_err() || quit {
            break;
        }
        match out_rx.recv().await {
            Some(reply) => println!("{reply}"),
            None => break,
        }
    }

    // 8. Cleanup: closing the command channel stops the loop, which drops the
    // update sender and lets the logger finish.
    drop(cmd_tx);
    let _ = app_handle.await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), logger_handle).await;

    info!("Mock draft shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (stdout is reserved for the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("mockdraft.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_draft=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
