/// Tests for MultiBufferedResource
///
/// These tests validate range layout, swap cycling and release of the
/// owned range references.

use super::*;
use crate::device::mock::MockGraphicsDevice;
use crate::device::ResourceFactory;
use crate::resource::{BufferUsage, DeviceResource, ResourceDesc, ResourceKind};

fn create_buffer(
    registry: &ResourceRegistry,
    device: &MockGraphicsDevice,
    desc: &BufferDesc,
) -> (ResourceHandle, MultiBufferedResource) {
    let buffer = registry.register(device.create_buffer(desc).unwrap());
    let multi = MultiBufferedResource::create(registry, device, buffer, desc, &DeviceLimits::default()).unwrap();
    (buffer, multi)
}

// ============================================================================
// Tests: Creation
// ============================================================================

#[test]
fn test_new_rejects_bad_counts() {
    assert!(MultiBufferedResource::new(&[], 16).is_err());

    let handles = [ResourceHandle::default(); MAX_BUFFERING_LEVEL + 1];
    assert!(MultiBufferedResource::new(&handles, 16).is_err());
}

#[test]
fn test_create_triple_buffered_layout() {
    let registry = ResourceRegistry::new();
    let device = MockGraphicsDevice::new();
    let desc = BufferDesc::new("camera", 80, BufferUsage::CONSTANT_BUFFER | BufferUsage::TRIPLE_BUFFERED);

    let (buffer, multi) = create_buffer(&registry, &device, &desc);
    assert_eq!(multi.buffering_count(), 3);
    assert_eq!(multi.aligned_size(), 256);
    assert_eq!(multi.current_index(), 0);

    for (index, &range) in multi.ranges().iter().enumerate() {
        assert_eq!(registry.ref_count(range), Some(1));
        let resource = registry.get(range).unwrap();
        assert_eq!(resource.name(), format!("camera[{}]", index));
        match resource.desc() {
            ResourceDesc::BufferRange(range_desc) => {
                assert_eq!(range_desc.buffer, buffer);
                assert_eq!(range_desc.offset, index as u64 * 256);
                assert_eq!(range_desc.size, 80);
            }
            other => panic!("expected a buffer range, got {:?}", other.kind()),
        }
    }
    assert!(multi.range(3).is_none());
}

#[test]
fn test_create_single_range_without_buffering_flags() {
    let registry = ResourceRegistry::new();
    let device = MockGraphicsDevice::new();
    let desc = BufferDesc::new("vertices", 1000, BufferUsage::VERTEX_BUFFER);

    let (_, multi) = create_buffer(&registry, &device, &desc);
    assert_eq!(multi.buffering_count(), 1);
    assert_eq!(multi.aligned_size(), 1000);
}

#[test]
fn test_create_rolls_back_on_range_failure() {
    let registry = ResourceRegistry::new();
    let device = MockGraphicsDevice::new();
    let desc = BufferDesc::new("lights", 64, BufferUsage::STRUCTURED_BUFFER_READ_ONLY | BufferUsage::DOUBLE_BUFFERED);
    let buffer = registry.register(device.create_buffer(&desc).unwrap());

    // The first range succeeds, the second one fails
    device.fail_creation_after(1);
    let result = MultiBufferedResource::create(&registry, &device, buffer, &desc, &DeviceLimits::default());
    assert!(result.is_err());

    // Only the buffer itself remains registered
    assert_eq!(registry.len(), 1);
    assert_eq!(device.created_count(ResourceKind::BufferRange), 1);
    assert_eq!(device.live_count(), 1);
    assert!(registry.contains(buffer));
}

// ============================================================================
// Tests: Swap
// ============================================================================

#[test]
fn test_swap_cycles_through_ranges() {
    let registry = ResourceRegistry::new();
    let device = MockGraphicsDevice::new();
    let desc = BufferDesc::new("instances", 32, BufferUsage::DYNAMIC | BufferUsage::TRIPLE_BUFFERED);
    let (_, mut multi) = create_buffer(&registry, &device, &desc);

    let start = multi.current_index();
    for step in 1..=3 {
        multi.swap_buffers();
        let expected = (start + step) % 3;
        assert_eq!(multi.current_index(), expected);
        assert_eq!(multi.current_range(), multi.ranges()[expected]);
    }
    assert_eq!(multi.current_index(), start);
}

#[test]
fn test_swap_single_range_is_noop() {
    let handles = [ResourceHandle::default()];
    let mut multi = MultiBufferedResource::new(&handles, 64).unwrap();

    multi.swap_buffers();
    assert_eq!(multi.current_index(), 0);
}

// ============================================================================
// Tests: Release
// ============================================================================

#[test]
fn test_release_queues_ranges() {
    let registry = ResourceRegistry::new();
    let device = MockGraphicsDevice::new();
    let desc = BufferDesc::new("skinning", 128, BufferUsage::DYNAMIC | BufferUsage::DOUBLE_BUFFERED);
    let (_, multi) = create_buffer(&registry, &device, &desc);
    let ranges = multi.ranges().to_vec();

    multi.release(&registry).unwrap();
    assert_eq!(registry.pending_release_count(), 2);
    assert_eq!(registry.release_resources(), 2);
    for range in ranges {
        assert!(registry.get(range).is_none());
    }
}
