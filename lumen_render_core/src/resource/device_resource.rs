//! Device resource capability interface.
//!
//! Backends hand the core `Arc<dyn DeviceResource>` objects; the core only
//! needs to know what kind of object it holds, how it was described, and how
//! to destroy it.

use std::fmt;
use super::buffer::{BufferDesc, BufferRangeDesc};
use super::texture::{RenderTargetDesc, SamplerDesc, TextureDesc};

/// Kind of a device resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// GPU buffer (possibly multi-buffered)
    Buffer,
    /// Sub-range of a buffer
    BufferRange,
    /// Sampled or storage texture
    Texture,
    /// Color/depth attachment
    RenderTarget,
    /// Sampler state
    Sampler,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::BufferRange => "buffer range",
            ResourceKind::Texture => "texture",
            ResourceKind::RenderTarget => "render target",
            ResourceKind::Sampler => "sampler",
        };
        f.write_str(name)
    }
}

/// Description a resource was created from
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Buffer(BufferDesc),
    BufferRange(BufferRangeDesc),
    Texture(TextureDesc),
    RenderTarget(RenderTargetDesc),
    Sampler(SamplerDesc),
}

impl ResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDesc::Buffer(_) => ResourceKind::Buffer,
            ResourceDesc::BufferRange(_) => ResourceKind::BufferRange,
            ResourceDesc::Texture(_) => ResourceKind::Texture,
            ResourceDesc::RenderTarget(_) => ResourceKind::RenderTarget,
            ResourceDesc::Sampler(_) => ResourceKind::Sampler,
        }
    }

    /// Debug name carried by the description (may be empty)
    pub fn name(&self) -> &str {
        match self {
            ResourceDesc::Buffer(desc) => &desc.name,
            ResourceDesc::BufferRange(desc) => &desc.name,
            ResourceDesc::Texture(desc) => &desc.name,
            ResourceDesc::RenderTarget(desc) => &desc.name,
            ResourceDesc::Sampler(desc) => &desc.name,
        }
    }
}

/// Backend object owned by the resource registry
///
/// One implementation per backend. `release` destroys the backend object
/// and must be idempotent; the registry calls it exactly once in practice.
pub trait DeviceResource: Send + Sync {
    /// Description the resource was created from
    fn desc(&self) -> &ResourceDesc;

    /// Resource kind
    fn kind(&self) -> ResourceKind {
        self.desc().kind()
    }

    /// Debug name
    fn name(&self) -> &str {
        self.desc().name()
    }

    /// Destroy the backend object
    fn release(&self);

    /// Whether the backend object has been destroyed
    fn is_released(&self) -> bool;
}
