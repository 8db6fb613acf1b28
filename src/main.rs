// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use databuffer::buffer::utils;
use databuffer::{response, BufferStore, Config};

#[derive(Parser, Debug)]
#[command(name = "databuffer", about = "Inspect and maintain the buffer cache")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read stdin into the cache entry KEY
    Store { key: String },
    /// Write the cache entry KEY to stdout
    Show { key: String },
    /// Print the first position of NEEDLE in the cache entry KEY
    Find { key: String, needle: String },
    /// Print the value of the line NAME<SEP>VALUE in the cache entry KEY
    Field {
        key: String,
        name: String,
        #[arg(long, default_value = ":")]
        sep: String,
    },
    /// Delete the cache entry KEY
    Remove { key: String },
    /// Delete every expired cache entry
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => databuffer::config::load_config(path)?,
        None => Config::default(),
    };

    // Initialize logging
    let filter = format!("{},databuffer={}", config.logging.level, config.logging.level);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr);
    if config.logging.format == "compact" {
        subscriber.compact().init();
    } else {
        subscriber.init();
    }

    let store = BufferStore::new(config)?;

    match cli.command {
        Command::Store { key } => {
            let body = store
                .body_reader()
                .read_from_async(tokio::io::stdin())
                .await
                .context("Failed to read body from stdin")?;
            let entry = store.cache().store(&key, &body)?;
            tracing::info!("Stored {} bytes under {}", entry.size(), key);
        }
        Command::Show { key } => {
            let entry = store
                .cache()
                .open(&key)?
                .ok_or_else(|| anyhow::anyhow!("No fresh cache entry for {}", key))?;
            let mut stdout = tokio::io::stdout();
            response::write_body_async(&entry, &mut stdout).await?;
        }
        Command::Find { key, needle } => {
            let entry = store
                .cache()
                .open(&key)?
                .ok_or_else(|| anyhow::anyhow!("No fresh cache entry for {}", key))?;
            let pos = entry.find(0, entry.size(), needle.as_bytes());
            if pos == entry.size() {
                println!("not found");
            } else {
                println!("{}", pos);
            }
        }
        Command::Field { key, name, sep } => {
            let entry = store
                .cache()
                .open(&key)?
                .ok_or_else(|| anyhow::anyhow!("No fresh cache entry for {}", key))?;
            match utils::field_value(&entry, name.as_bytes(), sep.as_bytes()) {
                Some(value) => println!("{}", value),
                None => println!("not found"),
            }
        }
        Command::Remove { key } => {
            if !store.cache().remove(&key)? {
                tracing::warn!("No cache entry for {}", key);
            }
        }
        Command::Purge => {
            let removed = store.cache().purge_expired()?;
            println!("{}", removed);
        }
    }

    Ok(())
}
