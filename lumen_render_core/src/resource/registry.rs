//! Resource registry
//!
//! Owns every registered device resource behind a generation-tagged
//! `ResourceHandle`. Callers never hold the backend object across
//! operations; they hold a handle and look it up, so a destroyed resource
//! shows up as a stale handle instead of a dangling pointer.
//!
//! All mutations go through one `RwLock` write guard scoped to the table
//! update; lookups take the read guard. Backend objects are destroyed after
//! the guard is dropped.
//!
//! Deferred releases are tagged with the frame that queued them. The frame
//! driver advances the frame counter and drains entries whose frame the GPU
//! has finished with.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::{lumen_debug, lumen_err, lumen_info, lumen_trace, lumen_warn};
use super::device_resource::DeviceResource;
use super::handle::ResourceHandle;

const SOURCE: &str = "lumen::ResourceRegistry";

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Slots reserved up front
    pub initial_capacity: usize,
    /// Log a leak report when the registry is dropped
    pub report_leaks: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            report_leaks: true,
        }
    }
}

struct RegisteredResource {
    resource: Arc<dyn DeviceResource>,
    ref_count: u32,
    queued: bool,
}

struct QueuedRelease {
    frame: u64,
    handle: ResourceHandle,
}

struct RegistryState {
    resources: SlotMap<ResourceHandle, RegisteredResource>,
    release_queue: Vec<QueuedRelease>,
    frame: u64,
}

/// Thread-safe owner of all device resources
pub struct ResourceRegistry {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
}

enum RefOutcome {
    Stale,
    Underflow,
    Count(u32),
}

impl ResourceRegistry {
    /// Create a registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                resources: SlotMap::with_capacity_and_key(config.initial_capacity),
                release_queue: Vec::new(),
                frame: 0,
            }),
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== REGISTRATION AND LOOKUP =====

    /// Register a live resource and return its handle
    ///
    /// The reference count starts at zero: owners that keep the handle
    /// across operations take a reference with `inc_ref`.
    pub fn register(&self, resource: Arc<dyn DeviceResource>) -> ResourceHandle {
        let kind = resource.kind();
        let handle = self.write().resources.insert(RegisteredResource {
            resource,
            ref_count: 0,
            queued: false,
        });
        lumen_trace!(SOURCE, "Registered {} at slot {} (generation {})",
            kind, handle.slot_index(), handle.generation());
        handle
    }

    /// Look up a resource, `None` if the handle is stale
    pub fn get(&self, handle: ResourceHandle) -> Option<Arc<dyn DeviceResource>> {
        self.read().resources.get(handle).map(|entry| entry.resource.clone())
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.read().resources.contains_key(handle)
    }

    /// Current reference count, `None` if the handle is stale
    pub fn ref_count(&self, handle: ResourceHandle) -> Option<u32> {
        self.read().resources.get(handle).map(|entry| entry.ref_count)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resources waiting for the next `release_resources`
    pub fn pending_release_count(&self) -> usize {
        self.read().release_queue.len()
    }

    /// Frame that new deferred releases are tagged with
    pub fn current_frame(&self) -> u64 {
        self.read().frame
    }

    /// Close the current frame, returns the frame that was closed
    pub fn advance_frame(&self) -> u64 {
        let mut state = self.write();
        let closed = state.frame;
        state.frame += 1;
        closed
    }

    // ===== REFERENCE COUNTING =====

    /// Take one reference, returns the new count
    pub fn inc_ref(&self, handle: ResourceHandle) -> Result<u32> {
        let outcome = {
            let mut state = self.write();
            match state.resources.get_mut(handle) {
                Some(entry) => {
                    entry.ref_count += 1;
                    RefOutcome::Count(entry.ref_count)
                }
                None => RefOutcome::Stale,
            }
        };
        self.finish_ref_change("inc_ref", handle, outcome)
    }

    /// Drop one reference, returns the new count
    ///
    /// Dropping a reference that was never taken is a lifetime violation:
    /// the count is left untouched and the error is reported.
    pub fn dec_ref(&self, handle: ResourceHandle) -> Result<u32> {
        let outcome = {
            let mut state = self.write();
            match state.resources.get_mut(handle) {
                Some(entry) if entry.ref_count == 0 => RefOutcome::Underflow,
                Some(entry) => {
                    entry.ref_count -= 1;
                    RefOutcome::Count(entry.ref_count)
                }
                None => RefOutcome::Stale,
            }
        };
        self.finish_ref_change("dec_ref", handle, outcome)
    }

    fn finish_ref_change(&self, op: &str, handle: ResourceHandle, outcome: RefOutcome) -> Result<u32> {
        match outcome {
            RefOutcome::Count(count) => Ok(count),
            RefOutcome::Stale => Err(stale_handle(op, handle)),
            RefOutcome::Underflow => Err(lumen_err!(SOURCE, LifetimeViolation,
                "{} would take the reference count of slot {} below zero", op, handle.slot_index())),
        }
    }

    // ===== RELEASE =====

    /// Destroy a resource immediately
    ///
    /// The slot generation is bumped before the backend object is destroyed,
    /// so no lookup can observe a half-destroyed resource. Releasing a stale
    /// handle is a double release.
    pub fn release(&self, handle: ResourceHandle) -> Result<()> {
        let removed = {
            let mut state = self.write();
            match state.resources.get(handle).map(|entry| entry.ref_count) {
                None => Err(None),
                Some(count) if count > 0 => Err(Some(count)),
                Some(_) => {
                    state.release_queue.retain(|queued| queued.handle != handle);
                    Ok(state.resources.remove(handle))
                }
            }
        };

        match removed {
            Ok(Some(entry)) => {
                lumen_trace!(SOURCE, "Released {} '{}'", entry.resource.kind(), entry.resource.name());
                entry.resource.release();
                Ok(())
            }
            Ok(None) | Err(None) => Err(lumen_err!(SOURCE, LifetimeViolation,
                "double release of slot {} (generation {})", handle.slot_index(), handle.generation())),
            Err(Some(count)) => {
                lumen_warn!(SOURCE, "Cannot release slot {}: {} references outstanding",
                    handle.slot_index(), count);
                Err(Error::ResourceInUse(format!("slot {} has {} references", handle.slot_index(), count)))
            }
        }
    }

    /// Queue a resource for destruction once the current frame retires
    pub fn enqueue_release(&self, handle: ResourceHandle) -> Result<()> {
        let queued = {
            let mut state = self.write();
            let frame = state.frame;
            match state.resources.get_mut(handle) {
                None => false,
                Some(entry) if entry.queued => false,
                Some(entry) => {
                    entry.queued = true;
                    state.release_queue.push(QueuedRelease { frame, handle });
                    true
                }
            }
        };

        if queued {
            Ok(())
        } else {
            Err(lumen_err!(SOURCE, LifetimeViolation,
                "slot {} (generation {}) is already released or queued for release",
                handle.slot_index(), handle.generation()))
        }
    }

    /// Destroy every queued resource whose reference count is zero
    ///
    /// Queued resources that are still referenced stay queued for the next
    /// call. Returns the number of destroyed resources.
    pub fn release_resources(&self) -> usize {
        self.release_queued(u64::MAX)
    }

    /// Destroy queued resources tagged with `frame` or an earlier frame
    ///
    /// Entries of later frames, and entries that are still referenced, stay
    /// queued. Returns the number of destroyed resources.
    pub fn release_resources_through(&self, frame: u64) -> usize {
        self.release_queued(frame)
    }

    fn release_queued(&self, through: u64) -> usize {
        let (released, deferred) = {
            let mut state = self.write();
            let queue = std::mem::take(&mut state.release_queue);
            let mut released = Vec::new();
            let mut kept = Vec::new();
            for queued in queue {
                if queued.frame > through {
                    kept.push(queued);
                    continue;
                }
                match state.resources.get(queued.handle).map(|entry| entry.ref_count) {
                    Some(0) => released.extend(state.resources.remove(queued.handle)),
                    Some(_) => kept.push(queued),
                    None => {}
                }
            }
            let deferred = kept.len();
            state.release_queue = kept;
            (released, deferred)
        };

        for entry in &released {
            entry.resource.release();
        }
        if !released.is_empty() || deferred > 0 {
            lumen_debug!(SOURCE, "Released {} queued resources ({} still pending)",
                released.len(), deferred);
        }
        released.len()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if !self.config.report_leaks {
            return;
        }
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.resources.is_empty() {
            lumen_info!(SOURCE, "All device resources have been cleaned-up");
            return;
        }
        lumen_warn!(SOURCE, "{} device resources have not been cleaned-up", state.resources.len());
        for (handle, entry) in state.resources.iter() {
            lumen_debug!(SOURCE, "Leaked {} '{}' (slot {}, {} references)",
                entry.resource.kind(), entry.resource.name(), handle.slot_index(), entry.ref_count);
        }
    }
}

fn stale_handle(op: &str, handle: ResourceHandle) -> Error {
    lumen_warn!(SOURCE, "{} on stale handle (slot {}, generation {})",
        op, handle.slot_index(), handle.generation());
    Error::InvalidResource(format!("stale handle (slot {}, generation {})",
        handle.slot_index(), handle.generation()))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
