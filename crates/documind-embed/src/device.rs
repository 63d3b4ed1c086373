use anyhow::Result;
use candle_core::Device;
use tracing::info;

use documind_core::config::DeviceChoice;

/// Resolve the configured device.
///
/// `Auto` prefers Metal and falls back to CPU. An explicit `Metal` request
/// fails when this build has no Metal support or no device answers.
pub fn select_device(choice: DeviceChoice) -> Result<Device> {
    let device = match choice {
        DeviceChoice::Cpu => Device::Cpu,
        DeviceChoice::Metal => metal_device()?,
        DeviceChoice::Auto => metal_device().unwrap_or(Device::Cpu),
    };
    info!(?choice, device = device_name(&device), "embedding device selected");
    Ok(device)
}

pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Metal(_) => "metal",
        Device::Cuda(_) => "cuda",
    }
}

#[cfg(feature = "metal")]
fn metal_device() -> Result<Device> {
    Ok(Device::new_metal(0)?)
}

#[cfg(not(feature = "metal"))]
fn metal_device() -> Result<Device> {
    anyhow::bail!("this build has no Metal support; rebuild with the `metal` feature or set embedding.device = \"cpu\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_available() {
        let device = select_device(DeviceChoice::Cpu).expect("cpu");
        assert_eq!(device_name(&device), "cpu");
    }

    #[test]
    fn auto_always_yields_a_device() {
        assert!(select_device(DeviceChoice::Auto).is_ok());
    }

    #[cfg(not(feature = "metal"))]
    #[test]
    fn explicit_metal_without_support_is_an_error() {
        let err = select_device(DeviceChoice::Metal).expect_err("metal unavailable");
        assert!(err.to_string().contains("metal"));
    }
}
