//! Device module
//!
//! Backend collaborator traits, the frame-driving `RenderDevice`, and a
//! host-memory mock backend.

mod graphics_device;
mod render_device;
pub mod mock;

pub use graphics_device::{DeviceLimits, FenceValue, GraphicsDevice, ResourceFactory};
pub use render_device::{DeviceConfig, RenderDevice};
