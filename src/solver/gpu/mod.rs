pub mod context;
pub mod engine;

pub use context::{DeviceDescription, GpuContext};
pub use engine::WgpuEngine;
