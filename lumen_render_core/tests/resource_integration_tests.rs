//! Integration tests for resource lifetime management
//!
//! These tests verify handles, reference counting, multi-buffering and
//! mapping through the public API with the mock backend.
//!
//! Run with: cargo test --test resource_integration_tests


use std::sync::Arc;
use std::thread;
use graph_test_utils::test_device;
use lumen_render_core::lumen::device::mock::MockGraphicsDevice;
use lumen_render_core::lumen::resource::{
    BufferDesc, BufferUsage, MapAccess, RegistryConfig, ResourceKind, SamplerDesc, TextureDesc,
    TextureFormat, TextureUsage,
};
use lumen_render_core::lumen::{Error, ResourceFactory, ResourceRegistry};

fn registry() -> ResourceRegistry {
    ResourceRegistry::with_config(RegistryConfig { report_leaks: false, ..RegistryConfig::default() })
}

// ============================================================================
// HANDLE TESTS
// ============================================================================

#[test]
fn test_integration_handle_round_trip_until_release() {
    let registry = registry();
    let device = MockGraphicsDevice::new();

    let immediate = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());
    let deferred = registry.register(device.create_texture(&TextureDesc::default()).unwrap());
    assert_eq!(registry.get(immediate).unwrap().kind(), ResourceKind::Sampler);
    assert_eq!(registry.get(deferred).unwrap().kind(), ResourceKind::Texture);

    registry.release(immediate).unwrap();
    assert!(registry.get(immediate).is_none());

    registry.enqueue_release(deferred).unwrap();
    assert!(registry.get(deferred).is_some());
    registry.release_resources();
    assert!(registry.get(deferred).is_none());
    assert_eq!(device.live_count(), 0);
}

#[test]
fn test_integration_generation_safety_after_recycling() {
    let registry = registry();
    let device = MockGraphicsDevice::new();

    let mut stale = Vec::new();
    for _ in 0..8 {
        let handle = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());
        registry.release(handle).unwrap();
        stale.push(handle);
    }
    let live = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());

    for handle in stale {
        assert!(registry.get(handle).is_none());
        assert_ne!(handle, live);
    }
    assert!(registry.get(live).is_some());
}

#[test]
fn test_integration_unbalanced_dec_ref_detected() {
    let registry = registry();
    let device = MockGraphicsDevice::new();
    let handle = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());

    for _ in 0..5 {
        registry.inc_ref(handle).unwrap();
    }
    for _ in 0..5 {
        registry.dec_ref(handle).unwrap();
    }
    assert_eq!(registry.ref_count(handle), Some(0));
    assert!(matches!(registry.dec_ref(handle), Err(Error::LifetimeViolation(_))));
    assert_eq!(registry.ref_count(handle), Some(0));
}

#[test]
fn test_integration_release_from_submission_thread() {
    let registry = Arc::new(registry());
    let device = MockGraphicsDevice::new();
    let handles: Vec<_> = (0..16)
        .map(|_| registry.register(device.create_sampler(&SamplerDesc::default()).unwrap()))
        .collect();

    let worker_registry = registry.clone();
    let worker_handles = handles.clone();
    thread::spawn(move || {
        for handle in worker_handles {
            worker_registry.enqueue_release(handle).unwrap();
        }
    })
    .join()
    .unwrap();

    assert_eq!(registry.pending_release_count(), 16);
    assert_eq!(registry.release_resources(), 16);
    assert!(registry.is_empty());
}

// ============================================================================
// MULTI-BUFFERING TESTS
// ============================================================================

#[test]
fn test_integration_multi_buffer_cycles_with_frames() {
    let (_, device) = test_device();
    let buffer = device
        .create_buffer(&BufferDesc::new("per_frame", 48, BufferUsage::CONSTANT_BUFFER | BufferUsage::DYNAMIC | BufferUsage::TRIPLE_BUFFERED))
        .unwrap();
    let multi = device.multi_buffered(buffer).unwrap();
    assert_eq!(multi.buffering_count(), 3);

    let start = device.current_range(buffer).unwrap();
    for frame in 1..=3 {
        device.end_frame().unwrap();
        assert_eq!(device.current_range(buffer).unwrap(), multi.ranges()[frame % 3]);
    }
    assert_eq!(device.current_range(buffer).unwrap(), start);
}

// ============================================================================
// MAPPING TESTS
// ============================================================================

#[test]
fn test_integration_nested_map_and_data_round_trip() {
    let (mock, device) = test_device();
    let staging = device
        .create_buffer(&BufferDesc::new("readback", 16, BufferUsage::STAGING))
        .unwrap();
    let range = device.current_range(staging).unwrap();

    let outer = device.map(range, MapAccess::ReadWrite, 0).unwrap();
    let inner = device.map(range, MapAccess::ReadWrite, 0).unwrap();
    assert!(Arc::ptr_eq(&outer, &inner));

    inner.write_pod(0, &[7u32, 11, 13, 17]).unwrap();
    assert_eq!(outer.read_pod::<u32>(4, 2).unwrap(), vec![11, 13]);

    assert!(!device.unmap(range, 0).unwrap());
    assert_eq!(mock.unmap_calls(), 0);
    assert!(device.unmap(range, 0).unwrap());
    assert_eq!(mock.unmap_calls(), 1);
    assert!(matches!(device.unmap(range, 0), Err(Error::ContractViolation(_))));
}

#[test]
fn test_integration_mismatched_map_mode_is_fatal() {
    let (_, device) = test_device();
    let texture = device
        .create_texture(&TextureDesc::new_2d("upload", 8, 8, TextureFormat::R8G8B8A8_UNORM, TextureUsage::STAGING))
        .unwrap();

    let region = device.map(texture, MapAccess::Write, 0).unwrap();
    assert_eq!(region.row_pitch(), 32);
    let err = device.map(texture, MapAccess::Read, 0).err().unwrap();
    assert!(matches!(err, Error::MapModeMismatch(_)));
    assert!(err.is_fatal());
    assert_eq!(device.mapped_cache().map_count(texture, 0), Some(1));
}
