use anyhow::Result;
use ivi_core::config::DashboardConfig;
use ivi_interaction::VehicleAgentClient;

pub async fn run(config: DashboardConfig) -> Result<()> {
    let client = VehicleAgentClient::from_config(&config.agent)?;
    let health = client.health().await?;

    let mark = |ok: bool| if ok { "✓" } else { "✗" };
    println!("Agent at {}: {}", client.base_url(), health.status);
    println!("  {} MCP connected", mark(health.mcp_connected));
    println!("  {} Gemini configured", mark(health.gemini_configured));

    if !health.is_ready() {
        anyhow::bail!("Vehicle agent is not ready");
    }
    Ok(())
}
