// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Switchboard - AI-to-human handoff.
//!
//! One binary runs the reference desk or an interactive console for a
//! customer, an operator, or a supervisor.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod console;
mod customer;
mod operator;
mod serve;
mod shutdown;
mod supervisor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchboard_config::SwitchboardConfig;
use switchboard_core::{CustomerId, OperatorId, SessionId};

/// Switchboard - AI-to-human handoff desk and consoles.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reference desk (REST and WebSocket).
    Desk,
    /// Chat as a customer.
    Customer {
        #[arg(long)]
        id: u64,
        /// Session to open; defaults to the last one used.
        #[arg(long)]
        session: Option<u64>,
        /// Bearer token; a development login is used when absent.
        #[arg(long, env = "SWITCHBOARD_TOKEN")]
        token: Option<String>,
    },
    /// Work the queue as an operator.
    Operator {
        #[arg(long)]
        id: u64,
        #[arg(long, env = "SWITCHBOARD_TOKEN")]
        token: Option<String>,
    },
    /// Watch the roster and broadcast as a supervisor.
    Supervisor {
        #[arg(long)]
        id: u64,
        #[arg(long, env = "SWITCHBOARD_TOKEN")]
        token: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> SwitchboardConfig {
    let loaded = match path {
        Some(path) => switchboard_config::load_and_validate_path(path),
        None => switchboard_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            switchboard_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.client.log_level);

    let cancel = shutdown::install_signal_handler();
    let result = match cli.command {
        Commands::Desk => serve::run_desk(&config, cancel).await,
        Commands::Customer { id, session, token } => {
            customer::run(&config, CustomerId(id), session.map(SessionId), token, cancel).await
        }
        Commands::Operator { id, token } => {
            operator::run(&config, OperatorId(id), token, cancel).await
        }
        Commands::Supervisor { id, token } => supervisor::run(&config, id, token, cancel).await,
    };

    if let Err(e) = result {
        console::print_error(&e);
        std::process::exit(1);
    }
}
