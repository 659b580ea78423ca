/// Render device: resource creation and frame driving on top of a backend
///
/// `RenderDevice` owns the resource registry, the mapped-resource cache and
/// the multi-buffered buffers of one `GraphicsDevice`. It is the frame
/// driver: `end_frame` submits the frame, rotates every multi-buffered
/// buffer once, and drains the deferred releases of every frame whose fence
/// has completed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::render_graph::RenderGraphBuilder;
use crate::resource::{
    BufferDesc, DeviceResource, MapAccess, MappedRegion, MappedResourceCache,
    MultiBufferedResource, RegistryConfig, RenderTargetDesc, ResourceDesc, ResourceHandle,
    ResourceRegistry, SamplerDesc, TextureDesc, BufferUsage, TextureUsage,
};
use crate::{lumen_bail, lumen_debug, lumen_err, lumen_info, lumen_trace, lumen_warn};
use super::graphics_device::{DeviceLimits, FenceValue, GraphicsDevice, ResourceFactory};

const SOURCE: &str = "lumen::RenderDevice";

/// Render device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Debug name used in log lines
    pub name: String,
    /// Frames submitted but not yet completed before `end_frame` blocks
    pub max_frames_in_flight: usize,
    /// Timeout of a single fence wait
    pub fence_timeout: Duration,
    /// Configuration of the owned registry
    pub registry: RegistryConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "lumen".to_string(),
            max_frames_in_flight: 2,
            fence_timeout: Duration::from_secs(1),
            registry: RegistryConfig::default(),
        }
    }
}

struct FrameState {
    /// (frame, fence) of every submitted frame not yet seen complete
    in_flight: VecDeque<(u64, FenceValue)>,
    /// Latest frame whose fence completed
    retired_through: Option<u64>,
}

/// Frame driver and resource front-end for one backend
pub struct RenderDevice {
    config: DeviceConfig,
    device: Arc<dyn GraphicsDevice>,
    factory: Arc<dyn ResourceFactory>,
    registry: Arc<ResourceRegistry>,
    mapped: MappedResourceCache,
    /// Buffer handle -> its parallel ranges
    buffers: Mutex<FxHashMap<ResourceHandle, MultiBufferedResource>>,
    frames: Mutex<FrameState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderDevice {
    /// Wrap a backend device
    pub fn new<D: GraphicsDevice + 'static>(device: Arc<D>, config: DeviceConfig) -> Self {
        let graphics: Arc<dyn GraphicsDevice> = device.clone();
        let factory: Arc<dyn ResourceFactory> = device;
        let registry = Arc::new(ResourceRegistry::with_config(config.registry.clone()));
        lumen_info!(SOURCE, "Render device '{}' created ({} frames in flight)",
            config.name, config.max_frames_in_flight);
        Self {
            config,
            device: graphics,
            factory,
            registry,
            mapped: MappedResourceCache::new(),
            buffers: Mutex::new(FxHashMap::default()),
            frames: Mutex::new(FrameState {
                in_flight: VecDeque::new(),
                retired_through: None,
            }),
        }
    }

    // ===== ACCESSORS =====

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Shared registry of every resource created through this device
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<dyn ResourceFactory> {
        &self.factory
    }

    pub fn graphics_device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn limits(&self) -> DeviceLimits {
        self.device.limits()
    }

    pub fn mapped_cache(&self) -> &MappedResourceCache {
        &self.mapped
    }

    /// New graph builder wired to this device's registry and factory
    pub fn graph_builder(&self) -> RenderGraphBuilder {
        RenderGraphBuilder::new(self.registry.clone(), self.factory.clone())
    }

    // ===== RESOURCE CREATION =====

    /// Create a buffer and its parallel ranges
    ///
    /// The returned handle holds one reference owned by the caller; give it
    /// back with `destroy_resource`.
    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<ResourceHandle> {
        if let Err(err) = desc.validate() {
            lumen_bail!(SOURCE, ContractViolation, "cannot create buffer '{}': {}", desc.name, err);
        }
        let limits = self.limits();
        let buffer = self.register_owned(self.factory.create_buffer(desc)?)?;

        let multi = match MultiBufferedResource::create(&self.registry, self.factory.as_ref(), buffer, desc, &limits) {
            Ok(multi) => multi,
            Err(err) => {
                self.drop_owned(buffer);
                return Err(err);
            }
        };
        lumen_debug!(SOURCE, "Created buffer '{}' ({} bytes x {})",
            desc.name, multi.aligned_size(), multi.buffering_count());
        lock(&self.buffers).insert(buffer, multi);
        Ok(buffer)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<ResourceHandle> {
        self.register_owned(self.factory.create_texture(desc)?)
    }

    pub fn create_render_target(&self, desc: &RenderTargetDesc) -> Result<ResourceHandle> {
        self.register_owned(self.factory.create_render_target(desc)?)
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<ResourceHandle> {
        self.register_owned(self.factory.create_sampler(desc)?)
    }

    fn register_owned(&self, resource: Arc<dyn DeviceResource>) -> Result<ResourceHandle> {
        let handle = self.registry.register(resource);
        self.registry.inc_ref(handle)?;
        Ok(handle)
    }

    fn drop_owned(&self, handle: ResourceHandle) {
        if let Err(err) = self.registry.dec_ref(handle).and_then(|_| self.registry.release(handle)) {
            lumen_warn!(SOURCE, "Cleanup of slot {} failed: {}", handle.slot_index(), err);
        }
    }

    /// Give back the caller's reference and queue the resource for release
    ///
    /// A buffer's ranges go through the same deferred path. Destroying a
    /// resource that is still mapped is a contract violation.
    pub fn destroy_resource(&self, handle: ResourceHandle) -> Result<()> {
        if !self.registry.contains(handle) {
            lumen_bail!(SOURCE, LifetimeViolation, "destroy of stale handle (slot {}, generation {})",
                handle.slot_index(), handle.generation());
        }

        let mut buffers = lock(&self.buffers);
        let mapped_ranges = buffers
            .get(&handle)
            .map(|multi| multi.ranges().iter().any(|range| !self.mapped.mapped_subresources(*range).is_empty()))
            .unwrap_or(false);
        if mapped_ranges || !self.mapped.mapped_subresources(handle).is_empty() {
            drop(buffers);
            lumen_bail!(SOURCE, ContractViolation, "slot {} is still mapped", handle.slot_index());
        }
        let multi = buffers.remove(&handle);
        drop(buffers);

        if let Some(multi) = multi {
            multi.release(&self.registry)?;
        }
        self.registry.dec_ref(handle)?;
        self.registry.enqueue_release(handle)?;
        lumen_trace!(SOURCE, "Queued slot {} for release", handle.slot_index());
        Ok(())
    }

    // ===== MULTI-BUFFERING =====

    /// Range of a buffer used this frame
    pub fn current_range(&self, buffer: ResourceHandle) -> Result<ResourceHandle> {
        match lock(&self.buffers).get(&buffer) {
            Some(multi) => Ok(multi.current_range()),
            None => Err(Error::InvalidResource(format!(
                "slot {} is not a live buffer of this device", buffer.slot_index()
            ))),
        }
    }

    /// Snapshot of a buffer's ranges
    pub fn multi_buffered(&self, buffer: ResourceHandle) -> Option<MultiBufferedResource> {
        lock(&self.buffers).get(&buffer).cloned()
    }

    // ===== MAPPING =====

    /// Map a sub-resource for CPU access
    ///
    /// Repeated calls with the same access mode return the same region until
    /// the matching number of `unmap` calls.
    pub fn map(&self, handle: ResourceHandle, access: MapAccess, subresource: u32) -> Result<Arc<MappedRegion>> {
        let Some(resource) = self.registry.get(handle) else {
            lumen_warn!(SOURCE, "map on stale handle (slot {})", handle.slot_index());
            return Err(Error::InvalidResource(format!("stale handle (slot {})", handle.slot_index())));
        };
        validate_map(resource.desc(), access, subresource)?;
        self.mapped.map(handle, access, subresource, || {
            self.device.map(resource.as_ref(), access, subresource)
        })
    }

    /// Release one map reference; returns true when the backend unmap ran
    pub fn unmap(&self, handle: ResourceHandle, subresource: u32) -> Result<bool> {
        let resource = self.registry.get(handle);
        self.mapped.unmap(handle, subresource, || match &resource {
            Some(resource) => self.device.unmap(resource.as_ref(), subresource),
            None => Err(Error::InvalidResource(format!("stale handle (slot {})", handle.slot_index()))),
        })
    }

    // ===== FRAME DRIVING =====

    /// Submit the frame, rotate multi-buffered buffers and retire completed frames
    pub fn end_frame(&self) -> Result<FenceValue> {
        let fence = self.device.submit_command_lists()?;

        for multi in lock(&self.buffers).values_mut() {
            multi.swap_buffers();
        }

        let oldest = {
            let mut frames = lock(&self.frames);
            let frame = self.registry.advance_frame();
            frames.in_flight.push_back((frame, fence));
            if frames.in_flight.len() > self.config.max_frames_in_flight {
                frames.in_flight.front().map(|&(_, fence)| fence)
            } else {
                None
            }
        };

        if let Some(oldest) = oldest {
            if !self.device.wait_for_fence(oldest, self.config.fence_timeout)? {
                lumen_warn!(SOURCE, "Timed out waiting for fence {}", oldest.0);
            }
        }
        self.retire_frames();
        Ok(fence)
    }

    /// Forget completed frames and destroy what they queued for release
    ///
    /// Releases queued during a frame wait for that frame's fence, so a GPU
    /// running behind the CPU holds back at most the frames it has not
    /// finished. Returns the number of destroyed resources.
    pub fn retire_frames(&self) -> usize {
        let retired = {
            let mut frames = lock(&self.frames);
            while let Some(&(frame, fence)) = frames.in_flight.front() {
                if !self.device.is_fence_complete(fence) {
                    break;
                }
                frames.in_flight.pop_front();
                frames.retired_through = Some(frame);
            }
            frames.retired_through
        };

        match retired {
            Some(frame) => self.registry.release_resources_through(frame),
            None => 0,
        }
    }

    /// Wait for every in-flight frame, then drain the whole release queue
    ///
    /// Releases queued in the current, unsubmitted frame go too: nothing on
    /// the GPU can reference them once it is idle.
    pub fn wait_for_idle(&self) -> Result<usize> {
        let pending: Vec<FenceValue> = lock(&self.frames).in_flight.iter().map(|&(_, fence)| fence).collect();
        for fence in pending {
            if !self.device.wait_for_fence(fence, self.config.fence_timeout)? {
                return Err(lumen_err!(SOURCE, BackendError, "timed out waiting for fence {}", fence.0));
            }
        }
        let retired = self.retire_frames();
        Ok(retired + self.registry.release_resources())
    }

    /// Frames ended so far
    pub fn frame_index(&self) -> u64 {
        self.registry.current_frame()
    }

    pub fn frames_in_flight(&self) -> usize {
        lock(&self.frames).in_flight.len()
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        let buffers: Vec<(ResourceHandle, MultiBufferedResource)> = lock(&self.buffers).drain().collect();
        for (buffer, multi) in buffers {
            let result = multi
                .release(&self.registry)
                .and_then(|_| self.registry.dec_ref(buffer))
                .and_then(|_| self.registry.enqueue_release(buffer));
            if let Err(err) = result {
                lumen_warn!(SOURCE, "Failed to release buffer slot {}: {}", buffer.slot_index(), err);
            }
        }
        if let Err(err) = self.wait_for_idle() {
            lumen_warn!(SOURCE, "Device '{}' dropped while busy: {}", self.config.name, err);
        }
    }
}

/// Check that a resource can be mapped with `access` at `subresource`
fn validate_map(desc: &ResourceDesc, access: MapAccess, subresource: u32) -> Result<()> {
    match desc {
        ResourceDesc::Buffer(buffer) => validate_buffer_map(&buffer.name, buffer.usage, access, subresource),
        ResourceDesc::BufferRange(range) => validate_buffer_map(&range.name, range.usage, access, subresource),
        ResourceDesc::Texture(texture) => {
            if !texture.usage.contains(TextureUsage::STAGING) {
                lumen_bail!(SOURCE, ContractViolation, "texture '{}' is not STAGING", texture.name);
            }
            if subresource >= texture.subresource_count() {
                lumen_bail!(SOURCE, ContractViolation, "texture '{}' has no sub-resource {} (count {})",
                    texture.name, subresource, texture.subresource_count());
            }
            Ok(())
        }
        ResourceDesc::RenderTarget(_) | ResourceDesc::Sampler(_) => {
            lumen_bail!(SOURCE, ContractViolation, "{} '{}' is not mappable", desc.kind(), desc.name());
        }
    }
}

fn validate_buffer_map(name: &str, usage: BufferUsage, access: MapAccess, subresource: u32) -> Result<()> {
    if !usage.intersects(BufferUsage::DYNAMIC | BufferUsage::STAGING) {
        lumen_bail!(SOURCE, ContractViolation, "buffer '{}' is neither DYNAMIC nor STAGING", name);
    }
    if subresource != 0 {
        lumen_bail!(SOURCE, ContractViolation, "buffer '{}' has no sub-resource {}", name, subresource);
    }
    if access.allows_read() && !usage.is_staging() {
        lumen_bail!(SOURCE, ContractViolation, "buffer '{}' must be STAGING to map for reading", name);
    }
    Ok(())
}

#[cfg(test)]
#[path = "render_device_tests.rs"]
mod tests;
