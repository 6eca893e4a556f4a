//! Command-line front end for the mail queue
//!
//! - `enqueue`: store a message and queue it for each `--to`
//! - `show`: print a queue entry as the payload delivery workers receive
//! - `remove`: drop a queue entry, and its message once unreferenced

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mailqueue::{MailQueue, find_config_file};
use mailqueue_common::{Address, AddressList, Envelope, Message, logging};
use mailqueue_queue::{Enqueuer, Remover};
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[command(name = "mailqueue")]
#[command(about = "Queue outbound mail for delivery", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides MAILQUEUE_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a message for delivery
    Enqueue {
        /// Envelope sender (omit for the null reverse-path)
        #[arg(long)]
        from: Option<Address>,

        /// Envelope recipient, repeatable
        #[arg(long = "to", required = true)]
        to: Vec<Address>,

        /// Read the message from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a queue entry
    Show {
        /// Queue entry id
        id: i64,
    },
    /// Remove a queue entry
    Remove {
        /// Queue entry id
        id: i64,
    },
}

async fn read_message(file: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read message from {}", path.display())),
        None => {
            let mut raw = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut raw)
                .await
                .context("Failed to read message from stdin")?;
            Ok(raw)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let ctx = MailQueue::load(&config_path)?.into_context().await?;

    match cli.command {
        Command::Enqueue { from, to, file } => {
            let message = Message::parse(read_message(file).await?)?;
            let envelope = Envelope::new(from, to.into_iter().collect::<AddressList>());

            let key = Enqueuer::new(ctx).add_message(&message, &envelope).await?;
            println!("{key}");
        }
        Command::Show { id } => {
            let entry = ctx.records().get(id).await?;
            println!("{}", String::from_utf8_lossy(&entry.to_payload()?));
        }
        Command::Remove { id } => {
            let entry = Remover::new(ctx).delete_by_id(id).await?;
            println!("Removed entry {} ({})", entry.id, entry.rcpt_to);
        }
    }

    Ok(())
}
