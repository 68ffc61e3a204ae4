//! `dronelens` -- operator console for the drone camera workbench.
//!
//! Connects to a drone (through the device control service) or a local
//! webcam, captures two photos, compares them on several vision models at
//! once, reads a short summary of each answer aloud and archives the run.
//! Commands are read line by line from stdin; type `help` for the list.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default                 | Description                         |
//! |---------------------------|----------|-------------------------|-------------------------------------|
//! | `DEVICE_API_URL`          | no       | `http://localhost:3001` | Device control service              |
//! | `WEBCAM_DEVICE`           | no       | `/dev/video0`           | Local capture device                |
//! | `INFERENCE_ENDPOINTS`     | no       | two local models        | `model@url` list, comma-separated   |
//! | `COMPARE_PROMPT`          | no       | built-in                | Prompt sent with both photos        |
//! | `INFERENCE_TIMEOUT_SECS`  | no       | `300`                   | Per-model time limit                |
//! | `REPORT_URL`              | no       | --                      | Archive endpoint; off when unset    |
//! | `TELEMETRY_INTERVAL_SECS` | no       | `5`                     | Seconds between status polls        |
//! | `SPEECH_COMMAND`          | no       | `espeak`                | Text-to-speech program              |
//! | `ROTATE_RESET_MS`         | no       | `600`                   | Slider return-to-neutral delay      |

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dronelens_console::command::ConsoleCommand;
use dronelens_console::render::print_events;
use dronelens_console::{ConsoleConfig, Reply, Workbench};
use dronelens_events::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dronelens_console=info,dronelens_device=info,dronelens_inference=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ConsoleConfig::from_env().context("Invalid configuration")?;

    tracing::info!(
        device_api = %config.device_api_url,
        webcam = %config.webcam_device.display(),
        models = ?config.endpoints.iter().map(|e| e.model.as_str()).collect::<Vec<_>>(),
        reporting = config.report_url.is_some(),
        "Starting dronelens console",
    );

    let bus = Arc::new(EventBus::default());
    let printer = tokio::spawn(print_events(bus.subscribe()));

    let mut workbench = Workbench::from_config(&config, Arc::clone(&bus))
        .context("Failed to set up the workbench")?;

    println!("{}", workbench.snapshot().status);
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match workbench.execute(command).await {
            Ok(Reply::Text(text)) => println!("{text}"),
            Ok(Reply::Quit) => break,
            Err(e) => println!("Error: {e}"),
        }
    }

    tracing::info!("Shutting down");
    workbench.shutdown().await;
    drop(workbench);
    drop(bus);
    // Let the printer flush events published during shutdown.
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}
