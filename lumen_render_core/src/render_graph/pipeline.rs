/// Compiled pipeline: ordered passes with materialized resource bindings
///
/// The pipeline owns one registry reference on every resource the graph
/// materialized and hands them back through the deferred release path when
/// dropped. Imported resources are resolved but never released.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::resource::{DeviceResource, ResourceHandle, ResourceKind, ResourceRegistry};
use crate::{lumen_error, lumen_trace, lumen_warn};
use super::resource::{GraphResourceBindType, GraphResourceHandle, GraphResourceId};

const SOURCE: &str = "lumen::CompiledPipeline";

// ============================================================================
// Resources
// ============================================================================

/// A graph resource bound to a registered backend object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResource {
    pub handle: ResourceHandle,
    pub kind: ResourceKind,
    pub bind_type: GraphResourceBindType,
    pub name: String,
}

/// Graph resource id -> backend handle map of a compiled pipeline
#[derive(Debug, Default)]
pub struct PipelineResources {
    bindings: FxHashMap<GraphResourceId, BoundResource>,
    /// Handles materialized by the graph, one reference each
    owned: Vec<ResourceHandle>,
}

impl PipelineResources {
    pub(crate) fn bind(&mut self, id: GraphResourceId, bound: BoundResource, owned: bool) {
        if owned {
            self.owned.push(bound.handle);
        }
        self.bindings.insert(id, bound);
    }

    /// Backend handle of a graph resource (any version)
    pub fn resolve(&self, handle: GraphResourceHandle) -> Option<ResourceHandle> {
        self.bindings.get(&handle.id()).map(|bound| bound.handle)
    }

    pub fn get(&self, handle: GraphResourceHandle) -> Option<&BoundResource> {
        self.bindings.get(&handle.id())
    }

    /// Handles owned by the pipeline, in materialization order
    pub fn owned(&self) -> &[ResourceHandle] {
        &self.owned
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// What a pass sees when it is compiled or executed
pub struct PassContext<'a> {
    resources: &'a PipelineResources,
    registry: &'a ResourceRegistry,
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(resources: &'a PipelineResources, registry: &'a ResourceRegistry) -> Self {
        Self { resources, registry }
    }

    /// Backend handle of a graph resource
    pub fn resolve(&self, handle: GraphResourceHandle) -> Option<ResourceHandle> {
        self.resources.resolve(handle)
    }

    /// Live backend object of a graph resource, `None` if unbound or stale
    pub fn resource(&self, handle: GraphResourceHandle) -> Option<Arc<dyn DeviceResource>> {
        self.resolve(handle).and_then(|resolved| self.registry.get(resolved))
    }

    pub fn resources(&self) -> &PipelineResources {
        self.resources
    }

    pub fn registry(&self) -> &ResourceRegistry {
        self.registry
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Executable pass produced by `RenderGraphNode::compile`
pub trait RenderPass: Send {
    /// Record or perform the pass's work
    fn execute(&mut self, ctx: &PassContext<'_>) -> Result<()>;
}

/// Custom pass (closure-based)
pub struct CustomPass {
    callback: Box<dyn FnMut(&PassContext<'_>) -> Result<()> + Send>,
}

impl CustomPass {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&PassContext<'_>) -> Result<()> + Send + 'static,
    {
        Self { callback: Box::new(callback) }
    }
}

impl RenderPass for CustomPass {
    fn execute(&mut self, ctx: &PassContext<'_>) -> Result<()> {
        (self.callback)(ctx)
    }
}

/// A named pass of a compiled pipeline
pub struct CompiledPass {
    name: String,
    pass: Box<dyn RenderPass>,
}

impl CompiledPass {
    pub(crate) fn new(name: String, pass: Box<dyn RenderPass>) -> Self {
        Self { name, pass }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass(&self) -> &dyn RenderPass {
        self.pass.as_ref()
    }

    pub fn pass_mut(&mut self) -> &mut dyn RenderPass {
        self.pass.as_mut()
    }
}

/// Event emitted around each pass by `CompiledPipeline::execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEvent<'a> {
    BeforePass(&'a str),
    AfterPass(&'a str),
}

type PassListener = Box<dyn FnMut(PassEvent<'_>) + Send>;

// ============================================================================
// CompiledPipeline
// ============================================================================

/// Ordered passes and the resources they were compiled against
pub struct CompiledPipeline {
    registry: Arc<ResourceRegistry>,
    resources: PipelineResources,
    passes: Vec<CompiledPass>,
    culled: Vec<String>,
    listeners: Vec<PassListener>,
}

impl CompiledPipeline {
    pub(crate) fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            resources: PipelineResources::default(),
            passes: Vec::new(),
            culled: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub(crate) fn resources_mut(&mut self) -> &mut PipelineResources {
        &mut self.resources
    }

    pub(crate) fn set_passes(&mut self, passes: Vec<CompiledPass>, culled: Vec<String>) {
        self.passes = passes;
        self.culled = culled;
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn resources(&self) -> &PipelineResources {
        &self.resources
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|compiled| compiled.name()).collect()
    }

    /// Names of the nodes removed by culling, in insertion order
    pub fn culled_passes(&self) -> &[String] {
        &self.culled
    }

    pub fn passes(&self) -> &[CompiledPass] {
        &self.passes
    }

    pub fn get_pass(&self, name: &str) -> Option<&CompiledPass> {
        self.passes.iter().find(|compiled| compiled.name == name)
    }

    pub fn get_pass_mut(&mut self, name: &str) -> Option<&mut CompiledPass> {
        self.passes.iter_mut().find(|compiled| compiled.name == name)
    }

    pub fn contains_pass(&self, name: &str) -> bool {
        self.get_pass(name).is_some()
    }

    /// Backend handle of a graph resource
    pub fn resolve(&self, handle: GraphResourceHandle) -> Option<ResourceHandle> {
        self.resources.resolve(handle)
    }

    /// Register a callback receiving `BeforePass`/`AfterPass` events
    pub fn add_pass_listener<F>(&mut self, listener: F)
    where
        F: FnMut(PassEvent<'_>) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Run every pass in order
    ///
    /// A pass failing with a recoverable error is logged and skipped; a
    /// fatal error stops execution after its `AfterPass` event. Returns the
    /// number of passes that ran successfully.
    pub fn execute(&mut self) -> Result<usize> {
        let ctx = PassContext::new(&self.resources, &self.registry);
        let mut succeeded = 0;

        for compiled in &mut self.passes {
            for listener in &mut self.listeners {
                listener(PassEvent::BeforePass(&compiled.name));
            }
            let result = compiled.pass.execute(&ctx);
            for listener in &mut self.listeners {
                listener(PassEvent::AfterPass(&compiled.name));
            }
            match result {
                Ok(()) => succeeded += 1,
                Err(err) if err.is_fatal() => {
                    lumen_error!(SOURCE, "Pass '{}' failed, execution stopped: {}", compiled.name, err);
                    return Err(err);
                }
                Err(err) => lumen_error!(SOURCE, "Pass '{}' failed: {}", compiled.name, err),
            }
        }
        Ok(succeeded)
    }
}

impl Drop for CompiledPipeline {
    fn drop(&mut self) {
        for &handle in &self.resources.owned {
            let result = self
                .registry
                .dec_ref(handle)
                .and_then(|_| self.registry.enqueue_release(handle));
            if let Err(err) = result {
                lumen_warn!(SOURCE, "Failed to release graph resource slot {}: {}", handle.slot_index(), err);
            }
        }
        if !self.resources.owned.is_empty() {
            lumen_trace!(SOURCE, "Queued {} graph resources for release", self.resources.owned.len());
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
