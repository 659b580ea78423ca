/// Mock graphics device (no GPU required)
///
/// Implements `ResourceFactory` and `GraphicsDevice` with host memory so the
/// registry, the mapped-resource cache, the render device and the render
/// graph can be exercised in tests and headless tools.
///
/// Submitted fences stay pending until `complete_fences_up_to` /
/// `complete_all_fences` is called, or until `wait_for_fence` is called on
/// them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use crate::error::{Error, Result};
use crate::lumen_bail;
use crate::resource::{
    BufferDesc, BufferRangeDesc, DeviceResource, MapAccess, MappedMemory, MappedSubresource,
    RenderTargetDesc, ResourceDesc, ResourceKind, SamplerDesc, TextureDesc,
};
use super::graphics_device::{DeviceLimits, FenceValue, GraphicsDevice, ResourceFactory};

// ============================================================================
// Mock Memory
// ============================================================================

/// Shared host bytes backing a mock mapping
#[derive(Clone)]
pub struct MockMemory {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MockMemory {
    fn new(size: usize) -> Self {
        Self { bytes: Arc::new(Mutex::new(vec![0; size])) }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the stored bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

impl MappedMemory for MockMemory {
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let bytes = self.lock();
        let src = offset
            .checked_add(dst.len())
            .and_then(|end| bytes.get(offset..end))
            .ok_or_else(|| Error::BackendError("mock read out of bounds".to_string()))?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        let mut bytes = self.lock();
        let dst = offset
            .checked_add(src.len())
            .and_then(|end| bytes.get_mut(offset..end))
            .ok_or_else(|| Error::BackendError("mock write out of bounds".to_string()))?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

// ============================================================================
// Mock Resource
// ============================================================================

/// Device resource backed by host memory
pub struct MockResource {
    desc: ResourceDesc,
    /// One storage block per sub-resource
    storage: Vec<MockMemory>,
    released: AtomicBool,
}

impl MockResource {
    pub fn new(desc: ResourceDesc, limits: &DeviceLimits) -> Self {
        let storage = match &desc {
            ResourceDesc::Buffer(buffer) => vec![MockMemory::new(buffer.total_size(limits) as usize)],
            ResourceDesc::BufferRange(range) => vec![MockMemory::new(range.size as usize)],
            ResourceDesc::Texture(texture) => (0..texture.subresource_count())
                .map(|subresource| {
                    let (_, depth_pitch) = texture.pitches(subresource);
                    let mip = subresource % texture.mip_levels.max(1);
                    MockMemory::new((depth_pitch * texture.mip_size(mip).z) as usize)
                })
                .collect(),
            ResourceDesc::RenderTarget(_) | ResourceDesc::Sampler(_) => Vec::new(),
        };
        Self { desc, storage, released: AtomicBool::new(false) }
    }

    /// Host bytes of a sub-resource
    pub fn memory(&self, subresource: u32) -> Option<&MockMemory> {
        self.storage.get(subresource as usize)
    }
}

impl DeviceResource for MockResource {
    fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

#[derive(Default)]
struct MockState {
    created: Vec<Arc<MockResource>>,
    /// Successful creations left before one injected failure
    fail_countdown: Option<usize>,
    map_calls: u32,
    unmap_calls: u32,
    submitted_fence: u64,
    completed_fence: u64,
}

/// Host-memory graphics device
pub struct MockGraphicsDevice {
    limits: DeviceLimits,
    state: Mutex<MockState>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self { limits, state: Mutex::new(MockState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create(&self, desc: ResourceDesc) -> Result<Arc<dyn DeviceResource>> {
        let mut state = self.lock();
        let fail = match state.fail_countdown {
            Some(0) => {
                state.fail_countdown = None;
                true
            }
            Some(remaining) => {
                state.fail_countdown = Some(remaining - 1);
                false
            }
            None => false,
        };
        if fail {
            drop(state);
            lumen_bail!("lumen::mock", BackendError, "injected failure creating {} '{}'",
                desc.kind(), desc.name());
        }
        let resource = Arc::new(MockResource::new(desc, &self.limits));
        state.created.push(resource.clone());
        Ok(resource)
    }

    /// Make the next creation call fail with a backend error
    pub fn fail_next_creation(&self) {
        self.fail_creation_after(0);
    }

    /// Let `successes` creation calls through, then fail the following one
    pub fn fail_creation_after(&self, successes: usize) {
        self.lock().fail_countdown = Some(successes);
    }

    /// Every resource created so far, in creation order
    pub fn created(&self) -> Vec<Arc<MockResource>> {
        self.lock().created.clone()
    }

    /// Created resource by debug name (last match wins)
    pub fn find(&self, name: &str) -> Option<Arc<MockResource>> {
        self.lock().created.iter().rev().find(|resource| resource.name() == name).cloned()
    }

    pub fn created_count(&self, kind: ResourceKind) -> usize {
        self.lock().created.iter().filter(|resource| resource.kind() == kind).count()
    }

    /// Created resources not yet released
    pub fn live_count(&self) -> usize {
        self.lock().created.iter().filter(|resource| !resource.is_released()).count()
    }

    pub fn map_calls(&self) -> u32 {
        self.lock().map_calls
    }

    pub fn unmap_calls(&self) -> u32 {
        self.lock().unmap_calls
    }

    /// Last fence handed out by `submit_command_lists`
    pub fn submitted_fence(&self) -> FenceValue {
        FenceValue(self.lock().submitted_fence)
    }

    /// Signal every fence up to and including `fence`
    pub fn complete_fences_up_to(&self, fence: FenceValue) {
        let mut state = self.lock();
        state.completed_fence = state.completed_fence.max(fence.0.min(state.submitted_fence));
    }

    pub fn complete_all_fences(&self) {
        let mut state = self.lock();
        state.completed_fence = state.submitted_fence;
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFactory for MockGraphicsDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn DeviceResource>> {
        self.create(ResourceDesc::Buffer(desc.clone()))
    }

    fn create_buffer_range(&self, desc: &BufferRangeDesc) -> Result<Arc<dyn DeviceResource>> {
        self.create(ResourceDesc::BufferRange(desc.clone()))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn DeviceResource>> {
        self.create(ResourceDesc::Texture(desc.clone()))
    }

    fn create_render_target(&self, desc: &RenderTargetDesc) -> Result<Arc<dyn DeviceResource>> {
        self.create(ResourceDesc::RenderTarget(desc.clone()))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn DeviceResource>> {
        self.create(ResourceDesc::Sampler(desc.clone()))
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn map(
        &self,
        resource: &dyn DeviceResource,
        _access: MapAccess,
        subresource: u32,
    ) -> Result<MappedSubresource> {
        // Resolve the concrete mock object through the creation list
        let mut state = self.lock();
        let target = state
            .created
            .iter()
            .find(|created| std::ptr::addr_eq(Arc::as_ptr(created), resource as *const dyn DeviceResource))
            .cloned();
        let Some(target) = target else {
            drop(state);
            lumen_bail!("lumen::mock", BackendError, "resource '{}' was not created by this device",
                resource.name());
        };
        let Some(memory) = target.memory(subresource).cloned() else {
            drop(state);
            lumen_bail!("lumen::mock", BackendError, "{} '{}' has no sub-resource {}",
                resource.kind(), resource.name(), subresource);
        };
        state.map_calls += 1;

        let (row_pitch, depth_pitch) = match target.desc() {
            ResourceDesc::Texture(texture) => texture.pitches(subresource),
            _ => (memory.len() as u32, memory.len() as u32),
        };
        Ok(MappedSubresource {
            memory: Box::new(memory),
            row_pitch,
            depth_pitch,
        })
    }

    fn unmap(&self, _resource: &dyn DeviceResource, _subresource: u32) -> Result<()> {
        self.lock().unmap_calls += 1;
        Ok(())
    }

    fn submit_command_lists(&self) -> Result<FenceValue> {
        let mut state = self.lock();
        state.submitted_fence += 1;
        Ok(FenceValue(state.submitted_fence))
    }

    fn is_fence_complete(&self, fence: FenceValue) -> bool {
        self.lock().completed_fence >= fence.0
    }

    fn wait_for_fence(&self, fence: FenceValue, _timeout: Duration) -> Result<bool> {
        let mut state = self.lock();
        if fence.0 > state.submitted_fence {
            return Ok(false);
        }
        state.completed_fence = state.completed_fence.max(fence.0);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
