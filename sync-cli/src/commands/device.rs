//! Show this device and the user's registered devices.

use anyhow::Result;

use crate::engine::Engine;

/// Print this installation's device record.
pub fn show(engine: &Engine) -> Result<()> {
    let device = engine.store.device_info();

    println!("Device:");
    println!("  ID:         {}", device.device_id);
    println!("  Name:       {}", device.device_name);
    println!("  Type:       {}", device.device_type);
    println!("  Timezone:   {}", device.timezone);
    println!("  Language:   {}", device.language);
    println!("  User agent: {}", device.user_agent);

    Ok(())
}

/// Print every device registered for the signed-in user.
pub async fn list(engine: &Engine) -> Result<()> {
    engine.require_login()?;
    let devices = engine.store.list_devices().await?;
    let own = engine.identity.device_id();

    if devices.is_empty() {
        println!("No devices registered yet. Run 'trailsync pull' to register this one.");
        return Ok(());
    }

    println!("{} device(s):", devices.len());
    for device in devices {
        let marker = if device.device_id == own { "*" } else { " " };
        println!(
            " {} {}  {} ({})",
            marker, device.device_id, device.device_name, device.device_type
        );
    }

    Ok(())
}
