//! Adapter and device selection

use crate::params::PUSH_CONSTANT_SIZE;
use crate::{Error, Result};

/// Features without which no sample can record a frame
///
/// Passes are timed with pass-level timestamp writes, which plain
/// `TIMESTAMP_QUERY` covers.
const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS.union(wgpu::Features::TIMESTAMP_QUERY);

/// Enabled when the adapter has them
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;

/// An opened device together with the features it was created with
#[derive(Debug)]
pub(crate) struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub features: wgpu::Features,
}

impl GpuContext {
    pub fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    /// Requests an adapter (compatible with `surface` if given) and opens a device on it
    pub async fn request(instance: &wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Device(format!("No suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        tracing::info!("Using adapter {} ({:?})", info.name, info.backend);

        let available = adapter.features();
        if !available.contains(REQUIRED_FEATURES) {
            let missing = REQUIRED_FEATURES - available;
            return Err(Error::Device(format!("Adapter {} lacks required features {missing:?}", info.name)));
        }
        let features = REQUIRED_FEATURES | (available & OPTIONAL_FEATURES);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("filterlab device"),
                required_features: features,
                required_limits: wgpu::Limits {
                    max_push_constant_size: PUSH_CONSTANT_SIZE,
                    ..wgpu::Limits::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                trace: Default::default(),
            })
            .await
            .map_err(|e| Error::Device(format!("Failed to create device: {e}")))?;

        Ok(Self {
            adapter,
            device,
            queue,
            features,
        })
    }

    pub fn supports_timestamps(&self) -> bool {
        self.features.contains(wgpu::Features::TIMESTAMP_QUERY)
    }

    pub fn supports_border_clamp(&self) -> bool {
        self.features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    }
}
