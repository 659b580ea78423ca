/// Buffer usage flags, buffer and buffer-range descriptors

use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::device::DeviceLimits;
use super::handle::ResourceHandle;

/// Upper bound on the number of parallel ranges of a multi-buffered resource
pub const MAX_BUFFERING_LEVEL: usize = 3;

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex input
        const VERTEX_BUFFER = 1 << 0;
        /// Index input
        const INDEX_BUFFER = 1 << 1;
        /// Uniform/constant data; ranges aligned to the constant-buffer alignment
        const CONSTANT_BUFFER = 1 << 2;
        /// Read-only structured buffer
        const STRUCTURED_BUFFER_READ_ONLY = 1 << 3;
        /// Read-write structured buffer
        const STRUCTURED_BUFFER_READ_WRITE = 1 << 4;
        /// Indirect draw arguments
        const INDIRECT_BUFFER = 1 << 5;
        /// Updated frequently, mappable for writing
        const DYNAMIC = 1 << 6;
        /// CPU transfer buffer, mappable in any mode
        const STAGING = 1 << 7;
        /// Mapping returns the same pointer for the buffer's lifetime
        const PERSISTENT_MAPPING = 1 << 8;
        /// Two parallel ranges, rotated once per frame
        const DOUBLE_BUFFERED = 1 << 9;
        /// Three parallel ranges, rotated once per frame
        const TRIPLE_BUFFERED = 1 << 10;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        BufferUsage::CONSTANT_BUFFER
    }
}

impl BufferUsage {
    /// Number of parallel ranges a buffer with these flags is split into
    pub fn buffering_level(self) -> usize {
        if self.contains(BufferUsage::TRIPLE_BUFFERED) {
            3
        } else if self.contains(BufferUsage::DOUBLE_BUFFERED) {
            2
        } else {
            1
        }
    }

    pub fn is_dynamic(self) -> bool {
        self.intersects(BufferUsage::DYNAMIC | BufferUsage::PERSISTENT_MAPPING)
    }

    pub fn is_staging(self) -> bool {
        self.contains(BufferUsage::STAGING)
    }

    /// Minimum range offset alignment for these flags
    pub fn range_alignment(self, limits: &DeviceLimits) -> u64 {
        if self.contains(BufferUsage::CONSTANT_BUFFER) {
            limits.constant_buffer_alignment.max(1)
        } else if self.intersects(
            BufferUsage::STRUCTURED_BUFFER_READ_ONLY | BufferUsage::STRUCTURED_BUFFER_READ_WRITE,
        ) {
            limits.structured_buffer_alignment.max(1)
        } else {
            1
        }
    }

    /// Reject flag combinations backends cannot honor
    pub fn validate(self) -> Result<()> {
        let conflicts = [
            (BufferUsage::DOUBLE_BUFFERED | BufferUsage::TRIPLE_BUFFERED, "DOUBLE_BUFFERED with TRIPLE_BUFFERED"),
            (BufferUsage::DYNAMIC | BufferUsage::STRUCTURED_BUFFER_READ_WRITE, "DYNAMIC with STRUCTURED_BUFFER_READ_WRITE"),
            (BufferUsage::DYNAMIC | BufferUsage::INDIRECT_BUFFER, "DYNAMIC with INDIRECT_BUFFER"),
        ];
        for (pair, label) in conflicts {
            if self.contains(pair) {
                return Err(Error::ContractViolation(format!("buffer usage cannot combine {}", label)));
            }
        }

        if self.is_staging() {
            let allowed = BufferUsage::STAGING | BufferUsage::PERSISTENT_MAPPING;
            if !allowed.contains(self) {
                return Err(Error::ContractViolation(
                    "STAGING buffer usage can only be combined with PERSISTENT_MAPPING".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Round `size` up to the next multiple of `alignment`
pub fn align_up(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug name
    pub name: String,
    /// Size in bytes of one range
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsage,
    /// Element stride for structured buffers (0 otherwise)
    pub stride: u32,
}

impl BufferDesc {
    pub fn new(name: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self { name: name.into(), size, usage, stride: 0 }
    }

    /// Size of one range rounded up to the range alignment
    pub fn aligned_size(&self, limits: &DeviceLimits) -> u64 {
        align_up(self.size, self.usage.range_alignment(limits))
    }

    /// Bytes the backend allocates for all ranges
    pub fn total_size(&self, limits: &DeviceLimits) -> u64 {
        self.aligned_size(limits) * self.usage.buffering_level() as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::ContractViolation(format!("buffer '{}' has zero size", self.name)));
        }
        self.usage.validate()
    }
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self::new("", 0, BufferUsage::default())
    }
}

/// Descriptor for one range of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRangeDesc {
    /// Debug name
    pub name: String,
    /// Buffer the range belongs to
    pub buffer: ResourceHandle,
    /// Byte offset inside the buffer
    pub offset: u64,
    /// Byte size of the range
    pub size: u64,
    /// Usage flags inherited from the buffer
    pub usage: BufferUsage,
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
