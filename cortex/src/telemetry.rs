// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging setup for binaries and tests embedding the cortex

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a compact `tracing` subscriber.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless; the
/// second call leaves the first subscriber in place.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    Ok(())
}
