//! Orderflow CLI - Database migrations and test publishing.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! of-cli migrate
//!
//! # Publish an order file to the ingestion subject
//! of-cli publish fixtures/order.json
//!
//! # Publish a file as-is, bypassing local validation
//! of-cli publish broken.json --key replay-1 --unchecked
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `publish` - Publish an order message

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "of-cli")]
#[command(author, version, about = "Orderflow CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Publish an order JSON file to the ingestion subject
    Publish {
        /// Path to the JSON body
        file: PathBuf,

        /// Message key (defaults to the order's `order_uid`)
        #[arg(short, long)]
        key: Option<String>,

        /// Subject to publish on (defaults to `ORDERS_SUBJECT`)
        #[arg(short, long)]
        subject: Option<String>,

        /// Skip decoding and validation before publishing
        #[arg(long)]
        unchecked: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Publish {
            file,
            key,
            subject,
            unchecked,
        } => {
            let options = commands::publish::PublishOptions {
                key,
                subject,
                unchecked,
            };
            commands::publish::run(&file, options).await?;
        }
    }
    Ok(())
}
