//! Mapped-resource cache
//!
//! CPU-visible mappings are cached per (resource, sub-resource). Nested
//! `map` calls with the same access mode share one `MappedRegion`; the
//! backend unmap only happens when the last matching `unmap` arrives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use bytemuck::Pod;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::{lumen_err, lumen_trace};
use super::handle::ResourceHandle;

const SOURCE: &str = "lumen::MappedResourceCache";

/// CPU access requested for a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    Read,
    Write,
    ReadWrite,
}

impl MapAccess {
    pub fn allows_read(self) -> bool {
        matches!(self, MapAccess::Read | MapAccess::ReadWrite)
    }

    pub fn allows_write(self) -> bool {
        matches!(self, MapAccess::Write | MapAccess::ReadWrite)
    }
}

/// CPU-visible memory handed out by a backend map call
///
/// Implementations stay valid until the backend unmaps the sub-resource.
pub trait MappedMemory: Send + Sync {
    /// Size in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Copy `src` into the mapping starting at `offset`
    fn write(&self, offset: usize, src: &[u8]) -> Result<()>;
}

/// Result of a backend map call
pub struct MappedSubresource {
    pub memory: Box<dyn MappedMemory>,
    pub row_pitch: u32,
    pub depth_pitch: u32,
}

// ============================================================================
// MappedRegion
// ============================================================================

/// A cached CPU mapping of one sub-resource
pub struct MappedRegion {
    handle: ResourceHandle,
    subresource: u32,
    access: MapAccess,
    row_pitch: u32,
    depth_pitch: u32,
    memory: Box<dyn MappedMemory>,
}

impl MappedRegion {
    fn new(handle: ResourceHandle, subresource: u32, access: MapAccess, mapped: MappedSubresource) -> Self {
        Self {
            handle,
            subresource,
            access,
            row_pitch: mapped.row_pitch,
            depth_pitch: mapped.depth_pitch,
            memory: mapped.memory,
        }
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn subresource(&self) -> u32 {
        self.subresource
    }

    pub fn access(&self) -> MapAccess {
        self.access
    }

    /// Size in bytes of the mapped memory
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    pub fn depth_pitch(&self) -> u32 {
        self.depth_pitch
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.memory.len() => Ok(()),
            _ => Err(Error::ContractViolation(format!(
                "access of {} bytes at offset {} exceeds mapping of {} bytes",
                len, offset, self.memory.len()
            ))),
        }
    }

    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> Result<()> {
        if !self.access.allows_write() {
            return Err(Error::ContractViolation(format!("mapping is {:?}, not writable", self.access)));
        }
        self.check_bounds(offset, src.len())?;
        self.memory.write(offset, src)
    }

    pub fn read_bytes(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        if !self.access.allows_read() {
            return Err(Error::ContractViolation(format!("mapping is {:?}, not readable", self.access)));
        }
        self.check_bounds(offset, dst.len())?;
        self.memory.read(offset, dst)
    }

    /// Write a slice of plain-old-data values
    pub fn write_pod<T: Pod>(&self, offset: usize, values: &[T]) -> Result<()> {
        self.write_bytes(offset, bytemuck::cast_slice(values))
    }

    /// Read `count` plain-old-data values
    pub fn read_pod<T: Pod>(&self, offset: usize, count: usize) -> Result<Vec<T>> {
        let mut values = vec![T::zeroed(); count];
        self.read_bytes(offset, bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }
}

// ============================================================================
// MappedResourceCache
// ============================================================================

struct CachedMapping {
    region: Arc<MappedRegion>,
    ref_count: u32,
}

/// Cache of live mappings, guarded independently from the resource registry
#[derive(Default)]
pub struct MappedResourceCache {
    entries: Mutex<FxHashMap<(ResourceHandle, u32), CachedMapping>>,
}

impl MappedResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<(ResourceHandle, u32), CachedMapping>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map a sub-resource, reusing the cached mapping when present
    ///
    /// `backend_map` only runs on a cache miss. A cached mapping with a
    /// different access mode is a `MapModeMismatch`.
    pub fn map<F>(
        &self,
        handle: ResourceHandle,
        access: MapAccess,
        subresource: u32,
        backend_map: F,
    ) -> Result<Arc<MappedRegion>>
    where
        F: FnOnce() -> Result<MappedSubresource>,
    {
        let key = (handle, subresource);
        let mut entries = self.lock();
        let cached = entries.get_mut(&key).map(|cached| {
            if cached.region.access == access {
                cached.ref_count += 1;
                Ok(cached.region.clone())
            } else {
                Err(cached.region.access)
            }
        });
        match cached {
            Some(Ok(region)) => return Ok(region),
            Some(Err(cached_access)) => {
                drop(entries);
                return Err(lumen_err!(SOURCE, MapModeMismatch,
                    "slot {} sub-resource {} is mapped {:?}, requested {:?}",
                    handle.slot_index(), subresource, cached_access, access));
            }
            None => {}
        }

        let mapped = backend_map()?;
        let region = Arc::new(MappedRegion::new(handle, subresource, access, mapped));
        entries.insert(key, CachedMapping {
            region: region.clone(),
            ref_count: 1,
        });
        drop(entries);
        lumen_trace!(SOURCE, "Mapped slot {} sub-resource {} ({:?}, {} bytes)",
            handle.slot_index(), subresource, access, region.size());
        Ok(region)
    }

    /// Release one map reference; returns true when the backend unmap ran
    pub fn unmap<F>(&self, handle: ResourceHandle, subresource: u32, backend_unmap: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let key = (handle, subresource);
        let mut entries = self.lock();
        let remaining = entries.get_mut(&key).map(|cached| {
            cached.ref_count = cached.ref_count.saturating_sub(1);
            cached.ref_count
        });

        match remaining {
            None => {
                drop(entries);
                Err(lumen_err!(SOURCE, ContractViolation,
                    "unmap of slot {} sub-resource {} which is not mapped",
                    handle.slot_index(), subresource))
            }
            Some(0) => {
                if let Err(err) = backend_unmap() {
                    if let Some(cached) = entries.get_mut(&key) {
                        cached.ref_count = 1;
                    }
                    return Err(err);
                }
                entries.remove(&key);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    pub fn is_mapped(&self, handle: ResourceHandle, subresource: u32) -> bool {
        self.lock().contains_key(&(handle, subresource))
    }

    /// Outstanding map calls for a sub-resource
    pub fn map_count(&self, handle: ResourceHandle, subresource: u32) -> Option<u32> {
        self.lock().get(&(handle, subresource)).map(|cached| cached.ref_count)
    }

    /// Sub-resources of `handle` that are currently mapped
    pub fn mapped_subresources(&self, handle: ResourceHandle) -> Vec<u32> {
        let mut subresources: Vec<u32> = self
            .lock()
            .keys()
            .filter(|(mapped, _)| *mapped == handle)
            .map(|(_, subresource)| *subresource)
            .collect();
        subresources.sort_unstable();
        subresources
    }

    /// Number of cached mappings
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "mapped_tests.rs"]
mod tests;
