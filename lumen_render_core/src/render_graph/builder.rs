/// Render graph builder: construction phase
///
/// Nodes are added in order; each node's setup declares the resources it
/// creates, reads and writes. Declarations only record descriptions and
/// reference counts; no backend object exists until `compile`.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use crate::device::ResourceFactory;
use crate::error::{Error, Result};
use crate::resource::{
    BufferDesc, RenderTargetDesc, ResourceDesc, ResourceHandle, ResourceRegistry,
    SamplerDesc, TextureDesc,
};
use crate::{lumen_bail, lumen_debug, lumen_err, lumen_error, lumen_warn};
use super::node::{NodeId, NodeSetup, RenderGraphNode, ResourceBindings};
use super::resource::{GraphResource, GraphResourceBindType, GraphResourceHandle, GraphResourceId};

pub(crate) const SOURCE: &str = "lumen::RenderGraphBuilder";

/// Per-node bookkeeping
pub(crate) struct NodeEntry {
    pub(crate) name: String,
    /// `None` while the node is being set up
    pub(crate) node: Option<Box<dyn RenderGraphNode>>,
    /// Writes by other nodes into resources this node produced
    pub(crate) ref_count: u32,
    pub(crate) reads: Vec<GraphResourceId>,
    pub(crate) writes: Vec<GraphResourceId>,
    pub(crate) produced: Vec<GraphResourceId>,
}

/// Accumulates nodes and resource declarations for one frame
pub struct RenderGraphBuilder {
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) factory: Arc<dyn ResourceFactory>,
    pub(crate) nodes: SlotMap<NodeId, NodeEntry>,
    /// Successfully added nodes, in insertion order
    pub(crate) node_order: Vec<NodeId>,
    node_names: FxHashMap<String, NodeId>,
    pub(crate) resources: SlotMap<GraphResourceId, GraphResource>,
    /// Declaration order, used for deterministic materialization
    pub(crate) resource_order: Vec<GraphResourceId>,
    /// Logical namespace of created resources
    resource_names: FxHashMap<String, GraphResourceId>,
    imported: FxHashMap<ResourceHandle, GraphResourceId>,
}

impl RenderGraphBuilder {
    /// Create an empty builder
    ///
    /// `registry` resolves imported handles and receives materialized
    /// resources; `factory` materializes pending resources at compile time.
    pub fn new(registry: Arc<ResourceRegistry>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            registry,
            factory,
            nodes: SlotMap::with_key(),
            node_order: Vec::new(),
            node_names: FxHashMap::default(),
            resources: SlotMap::with_key(),
            resource_order: Vec::new(),
            resource_names: FxHashMap::default(),
            imported: FxHashMap::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    // ===== NODES =====

    /// Add a node and run its setup
    ///
    /// Returns `Ok(true)` when the node was added. A failed setup drops the
    /// node with everything it declared and returns `Ok(false)`, unless the
    /// failure is fatal, in which case the error is returned.
    pub fn add_node<N>(&mut self, name: &str, node: N, bindings: &ResourceBindings) -> Result<bool>
    where
        N: RenderGraphNode + 'static,
    {
        if self.node_names.contains_key(name) {
            lumen_error!(SOURCE, "Setup of node '{}' failed: a node with this name already exists", name);
            return Ok(false);
        }

        let id = self.nodes.insert(NodeEntry {
            name: name.to_string(),
            node: None,
            ref_count: 0,
            reads: Vec::new(),
            writes: Vec::new(),
            produced: Vec::new(),
        });

        let mut node = node;
        let result = node.setup(&mut NodeSetup::new(self, id), bindings);

        match result {
            Ok(()) => {
                if let Some(entry) = self.nodes.get_mut(id) {
                    entry.node = Some(Box::new(node));
                }
                self.node_order.push(id);
                self.node_names.insert(name.to_string(), id);
                lumen_debug!(SOURCE, "Added node '{}'", name);
                Ok(true)
            }
            Err(err) => {
                self.rollback_node(id)?;
                lumen_error!(SOURCE, "Setup of node '{}' failed: {}", name, err);
                if err.is_fatal() {
                    Err(err)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Remove a node whose setup failed, undoing its declarations
    fn rollback_node(&mut self, id: NodeId) -> Result<()> {
        let Some(entry) = self.nodes.remove(id) else {
            return Ok(());
        };

        for resource in &entry.reads {
            if let Some(declared) = self.resources.get_mut(*resource) {
                declared.ref_count = checked_release(declared.ref_count, &declared.name)?;
            }
        }
        for resource in &entry.writes {
            let Some(declared) = self.resources.get_mut(*resource) else {
                continue;
            };
            if declared.producer == Some(id) {
                continue;
            }
            declared.ref_count = checked_release(declared.ref_count, &declared.name)?;
            if let Some(producer) = declared.producer.and_then(|producer| self.nodes.get_mut(producer)) {
                producer.ref_count = checked_release(producer.ref_count, &producer.name)?;
            }
        }
        for resource in &entry.produced {
            if let Some(removed) = self.resources.remove(*resource) {
                if !removed.name.is_empty() {
                    self.resource_names.remove(&removed.name);
                }
            }
        }
        self.resource_order.retain(|resource| !entry.produced.contains(resource));
        Ok(())
    }

    /// Look up an added node by name
    pub fn get_node(&self, name: &str) -> Option<&dyn RenderGraphNode> {
        let id = self.node_names.get(name)?;
        self.nodes.get(*id)?.node.as_deref()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    /// Number of successfully added nodes
    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    /// Node names in insertion order
    pub fn node_names(&self) -> Vec<&str> {
        self.node_order
            .iter()
            .filter_map(|id| self.nodes.get(*id))
            .map(|entry| entry.name.as_str())
            .collect()
    }

    // ===== RESOURCES =====

    pub fn resource(&self, handle: GraphResourceHandle) -> Option<&GraphResource> {
        self.resources.get(handle.id())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Wrap a live, externally owned resource
    ///
    /// No reference is taken: the caller keeps ownership and the graph never
    /// releases it. Importing the same handle twice returns the same entry.
    pub fn import(&mut self, handle: ResourceHandle) -> Result<GraphResourceHandle> {
        if let Some(&id) = self.imported.get(&handle) {
            if let Some(existing) = self.resources.get(id) {
                return Ok(GraphResourceHandle::new(id, existing.version));
            }
        }

        let Some(resource) = self.registry.get(handle) else {
            lumen_warn!(SOURCE, "import of stale handle (slot {}, generation {})",
                handle.slot_index(), handle.generation());
            return Err(Error::InvalidResource(format!("cannot import stale handle (slot {})", handle.slot_index())));
        };

        let id = self.resources.insert(GraphResource::imported(resource.name(), resource.kind(), handle));
        self.resource_order.push(id);
        self.imported.insert(handle, id);
        Ok(GraphResourceHandle::new(id, 0))
    }

    /// Declare a buffer produced by `producer`
    ///
    /// Graph buffers live for one compiled frame, so they are single
    /// buffered: DOUBLE_BUFFERED and TRIPLE_BUFFERED belong on buffers
    /// created through the device.
    pub fn create_buffer(&mut self, producer: NodeId, desc: BufferDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        if let Err(err) = desc.validate() {
            lumen_bail!(SOURCE, ContractViolation, "cannot declare buffer '{}': {}", desc.name, err);
        }
        if desc.usage.buffering_level() > 1 {
            lumen_bail!(SOURCE, ContractViolation,
                "graph buffer '{}' cannot be multi-buffered; create it on the device and import it", desc.name);
        }
        self.create_pending(producer, ResourceDesc::Buffer(desc), bind_type)
    }

    pub fn create_texture(&mut self, producer: NodeId, desc: TextureDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.create_pending(producer, ResourceDesc::Texture(desc), bind_type)
    }

    pub fn create_render_target(&mut self, producer: NodeId, desc: RenderTargetDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.create_pending(producer, ResourceDesc::RenderTarget(desc), bind_type)
    }

    pub fn create_sampler(&mut self, producer: NodeId, desc: SamplerDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        self.create_pending(producer, ResourceDesc::Sampler(desc), bind_type)
    }

    fn create_pending(&mut self, producer: NodeId, desc: ResourceDesc, bind_type: GraphResourceBindType) -> Result<GraphResourceHandle> {
        if bind_type == GraphResourceBindType::Imported {
            lumen_bail!(SOURCE, ContractViolation,
                "{} '{}' cannot be created as Imported; use import", desc.kind(), desc.name());
        }
        if !self.nodes.contains_key(producer) {
            lumen_bail!(SOURCE, ContractViolation, "{} '{}' declared by an unknown node", desc.kind(), desc.name());
        }
        if let Some(existing) = self.resource_names.get(desc.name()).and_then(|id| self.resources.get(*id)) {
            let first = existing
                .producer
                .and_then(|node| self.nodes.get(node))
                .map(|entry| entry.name.clone())
                .unwrap_or_default();
            lumen_bail!(SOURCE, MultipleProducers, "{} '{}' is already produced by node '{}'",
                desc.kind(), desc.name(), first);
        }

        let name = desc.name().to_string();
        let id = self.resources.insert(GraphResource::pending(desc, bind_type, producer));
        self.resource_order.push(id);
        if !name.is_empty() {
            self.resource_names.insert(name, id);
        }
        if let Some(entry) = self.nodes.get_mut(producer) {
            entry.produced.push(id);
        }
        Ok(GraphResourceHandle::new(id, 0))
    }

    /// Declare that `consumer` reads a resource
    pub fn read(&mut self, consumer: NodeId, handle: GraphResourceHandle) -> Result<GraphResourceHandle> {
        let resource = self.access(consumer, handle)?;
        if !resource.bind_type.is_readable() {
            lumen_bail!(SOURCE, ContractViolation, "{} '{}' is {:?} and cannot be read",
                resource.kind, resource.name, resource.bind_type);
        }

        if let Some(resource) = self.resources.get_mut(handle.id()) {
            resource.ref_count += 1;
        }
        if let Some(entry) = self.nodes.get_mut(consumer) {
            entry.reads.push(handle.id());
        }
        Ok(handle)
    }

    /// Declare that `consumer` writes a resource
    ///
    /// A write from another node than the producer keeps both the resource
    /// and its producer alive. Returns the next version of the resource.
    pub fn write(&mut self, consumer: NodeId, handle: GraphResourceHandle) -> Result<GraphResourceHandle> {
        let resource = self.access(consumer, handle)?;
        if !resource.bind_type.is_writable() {
            lumen_bail!(SOURCE, ContractViolation, "{} '{}' is {:?} and cannot be written",
                resource.kind, resource.name, resource.bind_type);
        }
        let producer = resource.producer;

        let foreign = producer != Some(consumer);

        if let Some(producer) = producer.filter(|_| foreign) {
            if let Some(entry) = self.nodes.get_mut(producer) {
                entry.ref_count += 1;
            }
        }
        if let Some(entry) = self.nodes.get_mut(consumer) {
            entry.writes.push(handle.id());
        }
        let version = match self.resources.get_mut(handle.id()) {
            Some(resource) => {
                if foreign {
                    resource.ref_count += 1;
                }
                resource.version += 1;
                resource.version
            }
            None => handle.version(),
        };
        Ok(GraphResourceHandle::new(handle.id(), version))
    }

    /// Validate a read/write target
    fn access(&self, consumer: NodeId, handle: GraphResourceHandle) -> Result<&GraphResource> {
        if !self.nodes.contains_key(consumer) {
            return Err(lumen_err!(SOURCE, ContractViolation, "resource access from an unknown node"));
        }
        match self.resources.get(handle.id()) {
            Some(resource) => Ok(resource),
            None => {
                lumen_warn!(SOURCE, "access to unknown graph resource (version {})", handle.version());
                Err(Error::InvalidResource("unknown graph resource".to_string()))
            }
        }
    }
}

/// Decrement a bookkeeping count, reporting underflow
pub(crate) fn checked_release(count: u32, owner: &str) -> Result<u32> {
    match count.checked_sub(1) {
        Some(count) => Ok(count),
        None => Err(lumen_err!(SOURCE, LifetimeViolation, "reference count of '{}' would go below zero", owner)),
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
