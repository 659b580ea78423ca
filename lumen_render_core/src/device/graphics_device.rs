/// Backend collaborator traits
///
/// A backend implements `ResourceFactory` (one creation call per resource
/// kind) and `GraphicsDevice` (mapping, submission and fences). The core
/// never allocates GPU objects itself; it registers whatever the factory
/// returns and owns the resulting handle.

use std::sync::Arc;
use std::time::Duration;
use crate::error::Result;
use crate::resource::{
    BufferDesc, BufferRangeDesc, DeviceResource, MapAccess, MappedSubresource,
    RenderTargetDesc, ResourceDesc, SamplerDesc, TextureDesc,
};

/// Monotonic value signaled by the backend when submitted work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(pub u64);

/// Backend limits the core needs for range layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Minimum offset alignment of constant-buffer ranges
    pub constant_buffer_alignment: u64,
    /// Minimum offset alignment of structured-buffer ranges
    pub structured_buffer_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            constant_buffer_alignment: 256,
            structured_buffer_alignment: 16,
        }
    }
}

/// Resource factory collaborator
pub trait ResourceFactory: Send + Sync {
    /// Create a buffer
    ///
    /// `desc.size` is the size of one range; a multi-buffered buffer needs
    /// `desc.total_size(limits)` bytes of backing storage.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn DeviceResource>>;

    /// Create a view on a range of an existing buffer
    fn create_buffer_range(&self, desc: &BufferRangeDesc) -> Result<Arc<dyn DeviceResource>>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceResource>>;

    fn create_render_target(&self, desc: &RenderTargetDesc) -> Result<Arc<dyn DeviceResource>>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn DeviceResource>>;

    /// Dispatch on the description kind
    fn create_resource(&self, desc: &ResourceDesc) -> Result<Arc<dyn DeviceResource>> {
        match desc {
            ResourceDesc::Buffer(desc) => self.create_buffer(desc),
            ResourceDesc::BufferRange(desc) => self.create_buffer_range(desc),
            ResourceDesc::Texture(desc) => self.create_texture(desc),
            ResourceDesc::RenderTarget(desc) => self.create_render_target(desc),
            ResourceDesc::Sampler(desc) => self.create_sampler(desc),
        }
    }
}

/// Device collaborator: mapping, submission and fences
pub trait GraphicsDevice: ResourceFactory {
    fn limits(&self) -> DeviceLimits;

    /// Produce a CPU-visible mapping of a sub-resource
    fn map(
        &self,
        resource: &dyn DeviceResource,
        access: MapAccess,
        subresource: u32,
    ) -> Result<MappedSubresource>;

    fn unmap(&self, resource: &dyn DeviceResource, subresource: u32) -> Result<()>;

    /// Submit the command lists recorded for the current frame
    fn submit_command_lists(&self) -> Result<FenceValue>;

    /// Non-blocking fence query
    fn is_fence_complete(&self, fence: FenceValue) -> bool;

    /// Block until `fence` completes or `timeout` elapses; false on timeout
    fn wait_for_fence(&self, fence: FenceValue, timeout: Duration) -> Result<bool>;
}
