use super::format_record;
use anyhow::Result;
use ivi_application::{Dashboard, DiagnosticEvent};
use ivi_core::config::DashboardConfig;
use ivi_core::signal::SignalMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(
    config: DashboardConfig,
    paths: Vec<String>,
    mut diagnostics: mpsc::UnboundedReceiver<DiagnosticEvent>,
) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    if paths.is_empty() {
        dashboard.start();
    } else {
        dashboard.start_with(paths);
    }

    let mut signals = dashboard.watch_signals();
    let mut link = dashboard.watch_link();
    let mut shown: Arc<SignalMap> = Arc::default();

    println!("📡 Watching {} (Ctrl-C to stop)", dashboard.config().signal.url);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = signals.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&*signals.borrow_and_update());
                print_changes(&shown, &snapshot);
                shown = snapshot;
            }
            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = link.borrow_and_update().clone();
                match status.last_error {
                    Some(error) => println!("[{}] {error}", status.connection),
                    None => println!("[{}]", status.connection),
                }
            }
            Some(event) = diagnostics.recv() => {
                println!("⚠ {} {}", event.level, event.message);
            }
        }
    }

    dashboard.shutdown();
    Ok(())
}

fn print_changes(previous: &SignalMap, current: &SignalMap) {
    let mut changed: Vec<_> = current
        .values()
        .filter(|record| previous.get(&record.path) != Some(record))
        .collect();
    changed.sort_by(|a, b| a.path.cmp(&b.path));
    for record in changed {
        println!("{}", format_record(record));
    }
}
