//! Device selection and enumeration.

use crate::solver::error::SolveError;

/// Shared handle to one compute device. Construct one per independent solve
/// context; there is no hidden global instance.
#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub info: wgpu::AdapterInfo,
}

/// Capabilities of one available adapter, for diagnostics and selection.
#[derive(Clone, Debug)]
pub struct DeviceDescription {
    pub index: usize,
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl GpuContext {
    /// Picks the highest-performance adapter the instance offers.
    pub fn new() -> Result<Self, SolveError> {
        let instance = Self::instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| SolveError::device("no compute adapter available"))?;
        Self::from_adapter(adapter)
    }

    /// Picks the adapter at `index` in [`enumerate_devices`](Self::enumerate_devices)
    /// order. An out-of-range index is a hard failure, not a fallback.
    pub fn with_device_index(index: usize) -> Result<Self, SolveError> {
        let instance = Self::instance();
        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        if index >= adapters.len() {
            return Err(SolveError::device(format!(
                "device index {index} out of range ({} adapters available)",
                adapters.len()
            )));
        }
        Self::from_adapter(adapters.swap_remove(index))
    }

    /// Lists the adapters visible to this process.
    pub fn enumerate_devices() -> Vec<DeviceDescription> {
        Self::instance()
            .enumerate_adapters(wgpu::Backends::all())
            .iter()
            .enumerate()
            .map(|(index, adapter)| {
                let info = adapter.get_info();
                DeviceDescription {
                    index,
                    name: info.name,
                    backend: info.backend,
                    device_type: info.device_type,
                }
            })
            .collect()
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn from_adapter(adapter: wgpu::Adapter) -> Result<Self, SolveError> {
        let info = adapter.get_info();
        let adapter_limits = adapter.limits();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ldusolve device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    // Use the adapter's maxima so large meshes fit.
                    max_buffer_size: adapter_limits.max_buffer_size,
                    max_storage_buffer_binding_size: adapter_limits
                        .max_storage_buffer_binding_size,
                    ..wgpu::Limits::downlevel_defaults()
                },
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| SolveError::device(format!("request_device failed: {e}")))?;

        Ok(Self {
            device,
            queue,
            info,
        })
    }
}
