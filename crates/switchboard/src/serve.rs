// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard desk`: run the reference desk until a shutdown signal.

use switchboard_config::SwitchboardConfig;
use switchboard_core::Result;
use switchboard_desk::Desk;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run_desk(config: &SwitchboardConfig, cancel: CancellationToken) -> Result<()> {
    let desk = Desk::from_config(config);
    let listener = switchboard_desk::bind(&config.desk).await?;
    info!(
        auto_assign = config.desk.auto_assign,
        max_queue_length = config.desk.max_queue_length,
        "desk starting"
    );

    let stopper = desk.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        stopper.shutdown();
    });

    switchboard_desk::serve(desk, listener).await?;
    info!("desk stopped");
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured
/// level. Logs go to stderr so they do not interleave with console output.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
