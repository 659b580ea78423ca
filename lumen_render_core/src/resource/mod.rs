//! Resource lifetime module
//!
//! Handles, the resource registry, resource descriptions, multi-buffering
//! and the mapped-resource cache.

mod handle;
mod device_resource;
pub mod buffer;
pub mod texture;
mod registry;
mod multi_buffered;
mod mapped;

pub use handle::ResourceHandle;
pub use device_resource::{DeviceResource, ResourceDesc, ResourceKind};
pub use buffer::{
    align_up, BufferDesc, BufferRangeDesc, BufferUsage, MAX_BUFFERING_LEVEL,
};
pub use texture::{
    AddressMode, FilterMode, RenderTargetDesc, SamplerDesc,
    TextureDesc, TextureFormat, TextureUsage,
};
pub use registry::{RegistryConfig, ResourceRegistry};
pub use multi_buffered::MultiBufferedResource;
pub use mapped::{
    MapAccess, MappedMemory, MappedRegion, MappedResourceCache, MappedSubresource,
};
