pub mod chat;
pub mod health;
pub mod signal;
pub mod watch;

use anyhow::{Context, Result};
use ivi_application::Dashboard;
use ivi_core::signal::SignalRecord;
use std::time::Duration;

/// How long one-shot commands wait for the signal server.
const CONNECT_WAIT: Duration = Duration::from_secs(10);

/// Waits until the signal link reports `connected`.
pub async fn wait_connected(dashboard: &Dashboard) -> Result<()> {
    let mut link = dashboard.watch_link();
    tokio::time::timeout(CONNECT_WAIT, async {
        link.wait_for(|status| status.connection.is_connected())
            .await
            .map(|_| ())
    })
    .await
    .with_context(|| {
        let reason = dashboard
            .link_status()
            .last_error
            .unwrap_or_else(|| "no response".to_string());
        format!(
            "Timed out connecting to {}: {reason}",
            dashboard.config().signal.url
        )
    })?
    .context("Signal client stopped")?;
    Ok(())
}

pub fn format_record(record: &SignalRecord) -> String {
    format!(
        "{:<55} {:>12}  {}",
        record.path,
        record.value.to_string(),
        record.timestamp
    )
}
