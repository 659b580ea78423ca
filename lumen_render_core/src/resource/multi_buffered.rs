/// Multi-buffered resource: N parallel ranges of one buffer, one current per frame

use crate::device::{DeviceLimits, ResourceFactory};
use crate::error::{Error, Result};
use crate::{lumen_error, lumen_trace, lumen_warn};
use super::buffer::{BufferDesc, BufferRangeDesc, MAX_BUFFERING_LEVEL};
use super::handle::ResourceHandle;
use super::registry::ResourceRegistry;

const SOURCE: &str = "lumen::MultiBufferedResource";

/// Parallel backing ranges of a buffer, rotated once per frame
///
/// Each range is a registered resource holding one reference owned by this
/// object. `current_index < buffering_count <= MAX_BUFFERING_LEVEL` always
/// holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiBufferedResource {
    ranges: [ResourceHandle; MAX_BUFFERING_LEVEL],
    buffering_count: usize,
    current_index: usize,
    aligned_size: u64,
}

impl MultiBufferedResource {
    /// Wrap already-registered ranges
    ///
    /// The caller keeps responsibility for the references on `ranges`.
    pub fn new(ranges: &[ResourceHandle], aligned_size: u64) -> Result<Self> {
        if ranges.is_empty() || ranges.len() > MAX_BUFFERING_LEVEL {
            return Err(Error::ContractViolation(format!(
                "buffering count must be between 1 and {}, got {}",
                MAX_BUFFERING_LEVEL,
                ranges.len()
            )));
        }
        let mut slots = [ResourceHandle::default(); MAX_BUFFERING_LEVEL];
        slots[..ranges.len()].copy_from_slice(ranges);
        Ok(Self {
            ranges: slots,
            buffering_count: ranges.len(),
            current_index: 0,
            aligned_size,
        })
    }

    /// Create, register and reference one range per buffering level of `buffer`
    ///
    /// Range `i` starts at `i * desc.aligned_size(limits)`. If a range fails
    /// to create, the ranges created so far are released before returning.
    pub fn create(
        registry: &ResourceRegistry,
        factory: &dyn ResourceFactory,
        buffer: ResourceHandle,
        desc: &BufferDesc,
        limits: &DeviceLimits,
    ) -> Result<Self> {
        let aligned_size = desc.aligned_size(limits);
        let count = desc.usage.buffering_level();
        let mut ranges = Vec::with_capacity(count);

        for index in 0..count {
            let range_desc = BufferRangeDesc {
                name: format!("{}[{}]", desc.name, index),
                buffer,
                offset: index as u64 * aligned_size,
                size: desc.size,
                usage: desc.usage,
            };
            let created = factory
                .create_buffer_range(&range_desc)
                .and_then(|resource| {
                    let handle = registry.register(resource);
                    registry.inc_ref(handle).map(|_| handle)
                });
            match created {
                Ok(handle) => ranges.push(handle),
                Err(err) => {
                    release_ranges(registry, &ranges);
                    lumen_error!(SOURCE, "Failed to create range {} of buffer '{}': {}",
                        index, desc.name, err);
                    return Err(err);
                }
            }
        }

        lumen_trace!(SOURCE, "Created {} ranges of {} bytes for buffer '{}'",
            count, aligned_size, desc.name);
        Self::new(&ranges, aligned_size)
    }

    /// Range used by reads and writes this frame
    pub fn current_range(&self) -> ResourceHandle {
        self.ranges[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn buffering_count(&self) -> usize {
        self.buffering_count
    }

    /// Byte stride between consecutive ranges
    pub fn aligned_size(&self) -> u64 {
        self.aligned_size
    }

    pub fn range(&self, index: usize) -> Option<ResourceHandle> {
        self.ranges().get(index).copied()
    }

    pub fn ranges(&self) -> &[ResourceHandle] {
        &self.ranges[..self.buffering_count]
    }

    /// Advance to the next range (no-op with a single range)
    pub fn swap_buffers(&mut self) {
        self.current_index = (self.current_index + 1) % self.buffering_count;
    }

    /// Drop the owned range references and queue the ranges for release
    pub fn release(self, registry: &ResourceRegistry) -> Result<()> {
        let mut first_error = None;
        for &range in self.ranges() {
            let result = registry.dec_ref(range).and_then(|_| registry.enqueue_release(range));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Roll back ranges created before a failure
fn release_ranges(registry: &ResourceRegistry, ranges: &[ResourceHandle]) {
    for &range in ranges {
        if let Err(err) = registry.dec_ref(range).and_then(|_| registry.release(range)) {
            lumen_warn!(SOURCE, "Rollback of range slot {} failed: {}", range.slot_index(), err);
        }
    }
}

#[cfg(test)]
#[path = "multi_buffered_tests.rs"]
mod tests;
