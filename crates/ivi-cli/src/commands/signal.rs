use super::{format_record, wait_connected};
use anyhow::Result;
use ivi_application::Dashboard;
use ivi_core::config::DashboardConfig;
use ivi_core::signal::SignalValue;

pub async fn get(config: DashboardConfig, path: &str) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    dashboard.start_with(Vec::new());
    wait_connected(&dashboard).await?;

    let result = dashboard.get_signal(path).await;
    dashboard.shutdown();

    println!("{}", format_record(&result?));
    Ok(())
}

pub async fn set(config: DashboardConfig, path: &str, value: &str) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    dashboard.start_with(Vec::new());
    wait_connected(&dashboard).await?;

    let value = SignalValue::decode(Some(value));
    dashboard.set_actuator(path, value.clone())?;
    println!("✓ Set {path} = {value}");

    // Frames go out in order, so the read-back also confirms the set was sent.
    let result = dashboard.get_signal(path).await;
    dashboard.shutdown();

    match result {
        Ok(record) => println!("{}", format_record(&record)),
        Err(err) => eprintln!("⚠ Read-back failed: {err}"),
    }
    Ok(())
}
