//! Log setup for applications that don't configure `tracing` themselves.
//!
//! Hosts, engines and isolated contexts emit `tracing` events regardless;
//! [`Logger::init`] only installs a subscriber printing them to stderr.
//! The filter comes from `STENCIL_LOG`, then `RUST_LOG`, and defaults to `info`.
//!
//! ```rust
//! use stencil::prelude::*;
//!
//! Logger::init();
//! ```
use crate::config::get_config;
use once_cell::sync::OnceCell;
use tracing_subscriber::{filter::LevelFilter, fmt, util::SubscriberInitExt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

pub struct Logger;

impl Logger {
    /// Install the subscriber. Only the first call does anything.
    pub fn init() {
        INITIALIZED.get_or_init(|| {
            install(filter());
            get_config().log_info();
        });
    }
}

fn filter() -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());

    match std::env::var("STENCIL_LOG") {
        Ok(directives) => builder.parse_lossy(directives),
        Err(_) => builder.from_env_lossy(),
    }
}

fn install(filter: EnvFilter) {
    // Another subscriber may already be set by the application.
    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(get_config().general.tty)
        .with_target(false)
        .finish()
        .try_init();
}
