use anyhow::{Context, Result};
use ivi_application::{DiagnosticEvent, DiagnosticsLayer};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs stderr logging filtered by `RUST_LOG` (or `level`), plus the
/// diagnostics layer. Returns the diagnostics receiver.
pub fn init(level: &str) -> Result<mpsc::UnboundedReceiver<DiagnosticEvent>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log filter: {level}"))?;

    let (diagnostics, receiver) = DiagnosticsLayer::channel();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .with(diagnostics)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(receiver)
}
