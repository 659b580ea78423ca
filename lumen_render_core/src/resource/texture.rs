/// Texture, render target and sampler descriptors

use bitflags::bitflags;
use glam::{UVec2, UVec3, Vec4};

/// Texel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    D16_UNORM,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    /// Returns size in bytes of one texel
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            TextureFormat::D16_UNORM => 2,
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::D32_FLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::D16_UNORM | TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT
        )
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        /// CPU transfer texture, the only mappable kind
        const STAGING = 1 << 4;
    }
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub name: String,
    /// Width, height, depth in texels
    pub size: UVec3,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// 2D texture with a single mip and layer
    pub fn new_2d(name: impl Into<String>, width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            name: name.into(),
            size: UVec3::new(width, height, 1),
            mip_levels: 1,
            array_layers: 1,
            format,
            usage,
        }
    }

    /// Number of addressable sub-resources (mips x layers)
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels.max(1) * self.array_layers.max(1)
    }

    /// Extent of a mip level (never below 1 texel per axis)
    pub fn mip_size(&self, mip: u32) -> UVec3 {
        UVec3::new(
            (self.size.x >> mip).max(1),
            (self.size.y >> mip).max(1),
            (self.size.z >> mip).max(1),
        )
    }

    /// Row and depth pitch in bytes of a sub-resource
    pub fn pitches(&self, subresource: u32) -> (u32, u32) {
        let mip = subresource % self.mip_levels.max(1);
        let extent = self.mip_size(mip);
        let row_pitch = extent.x * self.format.bytes_per_texel();
        (row_pitch, row_pitch * extent.y)
    }
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self::new_2d("", 1, 1, TextureFormat::R8G8B8A8_UNORM, TextureUsage::SAMPLED)
    }
}

// ===== RENDER TARGET DESC =====

/// Descriptor for creating a render target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub name: String,
    pub size: UVec2,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub clear_color: Vec4,
}

impl RenderTargetDesc {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            size: UVec2::new(width, height),
            format,
            sample_count: 1,
            clear_color: Vec4::ZERO,
        }
    }
}

// ===== SAMPLER DESC =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Descriptor for creating a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub name: String,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_filter: FilterMode,
    /// U, V, W addressing
    pub address_mode: [AddressMode; 3],
    pub max_anisotropy: u32,
    pub lod_bias: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_filter: FilterMode::Linear,
            address_mode: [AddressMode::Repeat; 3],
            max_anisotropy: 1,
            lod_bias: 0.0,
        }
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
