//! CLI for messaging
//!
//! Subcommands:
//! - `demo`: publish a few messages through an in-process broker and print what arrives
//! - `config`: print the effective configuration as JSON

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use messaging::client::{PatternClient, Publisher, Subscriber, message_handler, payload_handler};
use messaging::config::{Settings, load_config, load_config_from};
use messaging::factory::{ClientFactory, MessagingModule};
use messaging::message::Message;
use messaging::patterns::Pattern;
use messaging::transport::MemoryBroker;
use messaging::utils::logging;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "messaging")]
struct Cli {
    /// Configuration file; defaults to `config/default.toml` when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Round-trip messages through an in-process broker
    Demo {
        #[arg(long, default_value = "demo")]
        topic: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
        /// Use a pattern client instead of the configured structured client
        #[arg(long)]
        pattern: Option<Pattern>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command {
        Command::Demo {
            topic,
            count,
            pattern: None,
        } => run_demo(settings, &topic, count).await,
        Command::Demo {
            topic,
            count,
            pattern: Some(pattern),
        } => run_pattern_demo(settings, pattern, &topic, count).await,
        Command::Config => print_config(&settings),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_demo(
    settings: Settings,
    topic: &str,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(MemoryBroker::new());
    let module = MessagingModule::start(settings.messaging, broker)?;
    let client = module.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            topic,
            message_handler(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(msg);
                    Ok(())
                }
            }),
        )
        .await?;

    for seq in 0..count {
        let msg = Message::new("demo.event").with_data(serde_json::json!({ "seq": seq }));
        client.publish(topic, msg).await?;
    }

    for _ in 0..count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(msg)) => println!("{}", String::from_utf8_lossy(&msg.encode()?)),
            _ => {
                warn!(topic, "demo timed out waiting for messages");
                break;
            }
        }
    }

    module.shutdown().await?;
    Ok(())
}

async fn run_pattern_demo(
    settings: Settings,
    pattern: Pattern,
    topic: &str,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let factory = ClientFactory::new(Arc::new(MemoryBroker::new()));
    let client = factory.pattern_client(&settings.messaging, pattern).await?;
    info!(%pattern, topic, "running pattern demo");

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            topic,
            payload_handler(move |payload: Vec<u8>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(payload);
                    Ok(())
                }
            }),
        )
        .await?;
    if pattern == Pattern::ConsumerGroup {
        // let the member join before anything is published
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for seq in 0..count {
        client
            .publish(topic, format!("{pattern} message {seq}").into_bytes())
            .await?;
    }

    for _ in 0..count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(payload)) => println!("{}", String::from_utf8_lossy(&payload)),
            _ => {
                warn!(topic, "demo timed out waiting for messages");
                break;
            }
        }
    }

    client.close().await?;
    Ok(())
}

fn print_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
