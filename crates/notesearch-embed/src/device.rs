use candle_core::Device;
use tracing::info;

/// Metal when compiled with the `metal` feature and a GPU answers, else CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            info!("embedding on Metal");
            return device;
        }
        Err(e) => tracing::warn!("Metal unavailable, using CPU: {e}"),
    }
    info!("embedding on CPU");
    Device::Cpu
}
