/// Render graph node trait, setup context and resource bindings

use rustc_hash::FxHashMap;
use slotmap::new_key_type;
use crate::error::{Error, Result};
use crate::resource::{BufferDesc, RenderTargetDesc, ResourceHandle, SamplerDesc, TextureDesc};
use super::builder::RenderGraphBuilder;
use super::pipeline::{PassContext, RenderPass};
use super::resource::{GraphResourceBindType, GraphResourceHandle};

new_key_type! {
    /// Key of a node inside one render graph builder
    pub struct NodeId;
}

/// A render pass as declared to the graph builder
///
/// `setup` declares the resources the node creates, reads and writes.
/// Nodes that survive culling are then asked to `compile` themselves into
/// an executable pass, in insertion order.
pub trait RenderGraphNode {
    /// Declare resources; an error drops the node from the graph
    fn setup(&mut self, setup: &mut NodeSetup<'_>, bindings: &ResourceBindings) -> Result<()>;

    /// Produce the executable pass once resources are materialized
    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<Box<dyn RenderPass>>;

    /// Whether the frame wants this node's effects
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Builder view handed to `RenderGraphNode::setup`
///
/// Every declaration is attributed to the node being set up.
pub struct NodeSetup<'a> {
    builder: &'a mut RenderGraphBuilder,
    node: NodeId,
}

impl<'a> NodeSetup<'a> {
    pub(crate) fn new(builder: &'a mut RenderGraphBuilder, node: NodeId) -> Self {
        Self { builder, node }
    }

    /// Id of the node being set up
    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn builder(&self) -> &RenderGraphBuilder {
        &*self.builder
    }

    pub fn import(&mut self, handle: ResourceHandle) -> Result<GraphResourceHandle> {
        self.builder.import(handle)
    }

    pub fn create_buffer(&mut self, desc: BufferDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.builder.create_buffer(self.node, desc, bind_type)
    }

    pub fn create_texture(&mut self, desc: TextureDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.builder.create_texture(self.node, desc, bind_type)
    }

    pub fn create_render_target(&mut self, desc: RenderTargetDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.builder.create_render_target(self.node, desc, bind_type)
    }

    pub fn create_sampler(&mut self, desc: SamplerDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.builder.create_sampler(self.node, desc, bind_type)
    }

    pub fn read(&mut self, handle: GraphResourceHandle) -> Result<GraphResourceHandle> {
        self.builder.read(self.node, handle)
    }

    pub fn write(&mut self, handle: GraphResourceHandle) -> Result<GraphResourceHandle> {
        self.builder.write(self.node, handle)
    }
}

/// Named graph resources handed to a node's setup
#[derive(Debug, Clone, Default)]
pub struct ResourceBindings {
    bindings: FxHashMap<String, GraphResourceHandle>,
}

impl ResourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, handle: GraphResourceHandle) -> Self {
        self.insert(name, handle);
        self
    }

    /// Insert or replace a binding, returns the previous handle
    pub fn insert(&mut self, name: impl Into<String>, handle: GraphResourceHandle) -> Option<GraphResourceHandle> {
        self.bindings.insert(name.into(), handle)
    }

    pub fn get(&self, name: &str) -> Option<GraphResourceHandle> {
        self.bindings.get(name).copied()
    }

    /// Binding that setup cannot proceed without
    pub fn require(&self, name: &str) -> Result<GraphResourceHandle> {
        self.get(name)
            .ok_or_else(|| Error::ContractViolation(format!("missing resource binding '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
