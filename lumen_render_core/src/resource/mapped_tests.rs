/// Tests for MappedResourceCache and MappedRegion
///
/// These tests validate nested map idempotence, access mode checks,
/// unmap accounting and bounds-checked region access.

use super::*;
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Host memory standing in for a backend mapping
struct VecMemory {
    bytes: Mutex<Vec<u8>>,
}

impl MappedMemory for VecMemory {
    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock().unwrap();
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock().unwrap();
        bytes[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }
}

fn mapping(size: usize) -> MappedSubresource {
    MappedSubresource {
        memory: Box::new(VecMemory { bytes: Mutex::new(vec![0; size]) }),
        row_pitch: size as u32,
        depth_pitch: size as u32,
    }
}

fn handles(count: usize) -> Vec<ResourceHandle> {
    let mut table: SlotMap<ResourceHandle, ()> = SlotMap::with_key();
    (0..count).map(|_| table.insert(())).collect()
}

// ============================================================================
// Tests: Map / Unmap
// ============================================================================

#[test]
fn test_nested_map_returns_same_region() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let backend_maps = AtomicU32::new(0);

    let first = cache.map(handle, MapAccess::Write, 0, || {
        backend_maps.fetch_add(1, Ordering::SeqCst);
        Ok(mapping(64))
    }).unwrap();
    let second = cache.map(handle, MapAccess::Write, 0, || {
        backend_maps.fetch_add(1, Ordering::SeqCst);
        Ok(mapping(64))
    }).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend_maps.load(Ordering::SeqCst), 1);
    assert_eq!(cache.map_count(handle, 0), Some(2));
}

#[test]
fn test_only_last_unmap_reaches_backend() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let backend_unmaps = AtomicU32::new(0);

    cache.map(handle, MapAccess::Write, 0, || Ok(mapping(16))).unwrap();
    cache.map(handle, MapAccess::Write, 0, || Ok(mapping(16))).unwrap();

    let first = cache.unmap(handle, 0, || {
        backend_unmaps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }).unwrap();
    assert!(!first);
    assert_eq!(backend_unmaps.load(Ordering::SeqCst), 0);
    assert!(cache.is_mapped(handle, 0));

    let second = cache.unmap(handle, 0, || {
        backend_unmaps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }).unwrap();
    assert!(second);
    assert_eq!(backend_unmaps.load(Ordering::SeqCst), 1);
    assert!(!cache.is_mapped(handle, 0));
    assert!(cache.is_empty());
}

#[test]
fn test_access_mode_mismatch_is_fatal() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];

    cache.map(handle, MapAccess::Write, 0, || Ok(mapping(16))).unwrap();
    let result = cache.map(handle, MapAccess::Read, 0, || Ok(mapping(16)));

    let err = result.err().unwrap();
    assert!(matches!(err, Error::MapModeMismatch(_)));
    assert!(err.is_fatal());
    assert_eq!(cache.map_count(handle, 0), Some(1));
}

#[test]
fn test_unmap_without_map_is_error() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let result = cache.unmap(handle, 0, || Ok(()));
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
fn test_subresources_are_cached_independently() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];

    let mip0 = cache.map(handle, MapAccess::Read, 0, || Ok(mapping(16))).unwrap();
    let mip1 = cache.map(handle, MapAccess::Read, 1, || Ok(mapping(4))).unwrap();

    assert!(!Arc::ptr_eq(&mip0, &mip1));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.mapped_subresources(handle), vec![0, 1]);
}

#[test]
fn test_failed_backend_map_caches_nothing() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let result = cache.map(handle, MapAccess::Write, 0, || Err(Error::OutOfMemory));
    assert!(matches!(result, Err(Error::OutOfMemory)));
    assert!(!cache.is_mapped(handle, 0));
}

#[test]
fn test_failed_backend_unmap_keeps_mapping() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    cache.map(handle, MapAccess::Write, 0, || Ok(mapping(16))).unwrap();

    let result = cache.unmap(handle, 0, || Err(Error::BackendError("lost".to_string())));
    assert!(result.is_err());
    assert_eq!(cache.map_count(handle, 0), Some(1));
}

// ============================================================================
// Tests: MappedRegion access
// ============================================================================

#[test]
fn test_region_pod_round_trip() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let region = cache.map(handle, MapAccess::ReadWrite, 0, || Ok(mapping(32))).unwrap();

    region.write_pod(8, &[1.5f32, -2.0, 4.25]).unwrap();
    let values: Vec<f32> = region.read_pod(8, 3).unwrap();
    assert_eq!(values, vec![1.5, -2.0, 4.25]);
    assert_eq!(region.size(), 32);
    assert_eq!(region.handle(), handle);
}

#[test]
fn test_region_out_of_bounds() {
    let cache = MappedResourceCache::new();
    let handle = handles(1)[0];
    let region = cache.map(handle, MapAccess::Write, 0, || Ok(mapping(8))).unwrap();
    assert!(region.write_bytes(4, &[0u8; 8]).is_err());
    assert!(region.write_bytes(usize::MAX, &[0u8; 2]).is_err());
}

#[test]
fn test_region_respects_access_mode() {
    let cache = MappedResourceCache::new();
    let pair = handles(2);
    let (read_handle, write_handle) = (pair[0], pair[1]);

    let read_only = cache.map(read_handle, MapAccess::Read, 0, || Ok(mapping(8))).unwrap();
    assert!(read_only.write_bytes(0, &[1]).is_err());

    let write_only = cache.map(write_handle, MapAccess::Write, 0, || Ok(mapping(8))).unwrap();
    let mut out = [0u8; 1];
    assert!(write_only.read_bytes(0, &mut out).is_err());
}
