//! Headless wgpu device for the erosion kernels.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErosionGpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(String),
    #[error("{label} buffer needs {size} bytes, device limit is {limit}")]
    BufferTooLarge { label: &'static str, size: u64, limit: u64 },
    #[error("Failed to map {label} buffer for readback: {reason}")]
    BufferMap { label: &'static str, reason: String },
}

/// Device and queue shared by every erosion dispatch, plus the adapter facts
/// the pipelines need when sizing their buffers.
pub struct ErosionGpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_name: String,
    storage_limit: u64,
}

impl ErosionGpuContext {
    /// Requests a compute-only device with the adapter's full storage limits.
    pub async fn new() -> Result<Self, ErosionGpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ErosionGpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("erosion GPU adapter: {} ({:?})", info.name, info.backend);

        // Terrain for big grids exceeds the default 128 MiB binding.
        let supported = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            ..wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("strata-erosion-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| ErosionGpuError::RequestDevice(e.to_string()))?;

        let storage_limit = device.limits().max_storage_buffer_binding_size as u64;
        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            storage_limit,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Largest storage buffer the device can bind in one piece.
    pub fn storage_limit(&self) -> u64 {
        self.storage_limit
    }

    /// Fails when a storage buffer of `size` bytes could not be bound.
    pub fn ensure_fits(&self, label: &'static str, size: u64) -> Result<(), ErosionGpuError> {
        check_fits(label, size, self.storage_limit)
    }
}

fn check_fits(label: &'static str, size: u64, limit: u64) -> Result<(), ErosionGpuError> {
    if size > limit {
        Err(ErosionGpuError::BufferTooLarge { label, size, limit })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_fits() {
        assert!(check_fits("cells", 64, 64).is_ok());
        let err = check_fits("terrain", 65, 64).unwrap_err();
        assert!(matches!(
            err,
            ErosionGpuError::BufferTooLarge {
                label: "terrain",
                size: 65,
                limit: 64
            }
        ));
        assert_eq!(err.to_string(), "terrain buffer needs 65 bytes, device limit is 64");
    }
}
