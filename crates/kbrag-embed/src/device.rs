use candle_core::Device;

/// Picks the accelerator for the embedding model.
///
/// `APP_EMBED_DEVICE=cpu` pins the CPU even when the crate is built with
/// `metal`. Accelerator init failures fall through to the CPU.
pub fn select_device() -> Device {
    let wanted = std::env::var("APP_EMBED_DEVICE").unwrap_or_default().to_ascii_lowercase();
    if wanted != "cpu" {
        if let Some(dev) = accelerator() { return dev; }
    }
    tracing::info!("embedding device: CPU");
    Device::Cpu
}

#[cfg(feature = "metal")]
fn accelerator() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(dev) => { tracing::info!("embedding device: Metal"); Some(dev) }
        Err(err) => { tracing::warn!(error = %err, "metal unavailable"); None }
    }
}

#[cfg(not(feature = "metal"))]
fn accelerator() -> Option<Device> { None }
