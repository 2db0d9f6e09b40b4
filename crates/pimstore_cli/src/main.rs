//! PimStore daemon
//!
//! Runs the PimStore command protocol server.
//!
//! # Commands
//!
//! - `serve` - Accept client connections
//! - `init` - Create the database schema and register resources
//! - `version` - Show version information

mod commands;
mod sink;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PimStore storage server.
#[derive(Parser)]
#[command(name = "pimstored")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the SQLite database file
    #[arg(global = true, short, long, default_value = "pimstore.db")]
    db: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept client connections until Ctrl+C
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:4444")]
        bind: SocketAddr,

        /// Maximum concurrent connections
        #[arg(long, default_value = "1000")]
        max_connections: usize,

        /// Milliseconds between notification flushes
        #[arg(long, default_value = "50")]
        flush_interval_ms: u64,

        /// Seconds to wait for a resource to deliver payload
        #[arg(long, default_value = "30")]
        retrieval_timeout_secs: u64,

        /// Log every flushed notification as JSON
        #[arg(long)]
        trace_notifications: bool,
    },

    /// Create the database schema and register resources
    Init {
        /// Resource to register (repeatable)
        #[arg(short, long = "resource")]
        resources: Vec<String>,

        /// Register the resources as virtual
        #[arg(long = "virtual")]
        is_virtual: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            max_connections,
            flush_interval_ms,
            retrieval_timeout_secs,
            trace_notifications,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                database: cli.db,
                max_connections,
                flush_interval_ms,
                retrieval_timeout_secs,
                trace_notifications,
            };
            commands::serve::run(options)?;
        }
        Commands::Init {
            resources,
            is_virtual,
        } => {
            commands::init::run(&cli.db, &resources, is_virtual)?;
        }
        Commands::Version => {
            println!("pimstored v{}", env!("CARGO_PKG_VERSION"));
            println!("verbs: {}", pimstore_server::CommandTable::new().verbs().join(" "));
        }
    }

    Ok(())
}
