//! Stagelink: participant-side runtime for live broadcast sessions
//!
//! Three cooperating subsystems: a signaling session that keeps an
//! authenticated, self-healing connection to the broadcast server
//! ([`signaling`]), a device and stream lifecycle manager that turns physical
//! capture sources into stable named media streams ([`devices`]), and a
//! rolling recorder that can cut trailing replay clips out of live streams
//! ([`replay`]).

pub mod config;
pub mod devices;
pub mod replay;
pub mod signaling;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for embedding applications
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagelink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Stagelink runtime v{}", env!("CARGO_PKG_VERSION"));
}
