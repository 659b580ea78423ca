//! Logical render graph resources.
//!
//! A graph resource is a description plus bookkeeping: who produced it,
//! what access it allows, how many references keep it alive, and (once the
//! graph is compiled) which registered backend object backs it.

use slotmap::{new_key_type, Key};
use crate::resource::{ResourceDesc, ResourceHandle, ResourceKind};
use super::node::NodeId;

new_key_type! {
    /// Key of a resource inside one render graph builder
    pub struct GraphResourceId;
}

/// Declared access intent of a graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphResourceBindType {
    /// Owned by its producer, survives as long as the producer does
    Transient,
    /// Written by later passes, never read
    WriteOnly,
    /// Read by later passes, never written
    ReadOnly,
    /// Read and written by later passes
    ReadWrite,
    /// Externally owned resource wrapped with `import`
    Imported,
}

impl GraphResourceBindType {
    /// Whether `read` is permitted
    pub fn is_readable(self) -> bool {
        matches!(
            self,
            GraphResourceBindType::ReadOnly | GraphResourceBindType::ReadWrite | GraphResourceBindType::Imported
        )
    }

    /// Whether `write` is permitted
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            GraphResourceBindType::WriteOnly | GraphResourceBindType::ReadWrite | GraphResourceBindType::Imported
        )
    }
}

/// Handle to a graph resource as seen at one point of graph construction
///
/// Every `write` returns a handle with the next version of the same
/// resource; all versions resolve to the same backend object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GraphResourceHandle {
    id: GraphResourceId,
    version: u32,
}

impl GraphResourceHandle {
    pub(crate) fn new(id: GraphResourceId, version: u32) -> Self {
        Self { id, version }
    }

    pub fn id(&self) -> GraphResourceId {
        self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// False for the default (never issued) handle
    pub fn is_valid(&self) -> bool {
        !self.id.is_null()
    }
}

/// Resource entry of a render graph builder
#[derive(Debug, Clone)]
pub struct GraphResource {
    pub(crate) name: String,
    pub(crate) kind: ResourceKind,
    pub(crate) bind_type: GraphResourceBindType,
    pub(crate) producer: Option<NodeId>,
    /// Set for imported resources, filled for the rest at compile time
    pub(crate) backing: Option<ResourceHandle>,
    /// Description to materialize, `None` for imported resources
    pub(crate) pending: Option<ResourceDesc>,
    pub(crate) ref_count: u32,
    pub(crate) version: u32,
}

impl GraphResource {
    pub(crate) fn pending(
        desc: ResourceDesc,
        bind_type: GraphResourceBindType,
        producer: NodeId,
    ) -> Self {
        Self {
            name: desc.name().to_string(),
            kind: desc.kind(),
            bind_type,
            producer: Some(producer),
            backing: None,
            pending: Some(desc),
            // Transient resources are held by their producer
            ref_count: u32::from(bind_type == GraphResourceBindType::Transient),
            version: 0,
        }
    }

    pub(crate) fn imported(name: &str, kind: ResourceKind, handle: ResourceHandle) -> Self {
        Self {
            name: name.to_string(),
            kind,
            bind_type: GraphResourceBindType::Imported,
            producer: None,
            backing: Some(handle),
            pending: None,
            ref_count: 0,
            version: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn bind_type(&self) -> GraphResourceBindType {
        self.bind_type
    }

    /// Node that declared the resource, `None` when imported
    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    /// Backing registry handle (imported resources only, before compile)
    pub fn backing(&self) -> Option<ResourceHandle> {
        self.backing
    }

    pub fn desc(&self) -> Option<&ResourceDesc> {
        self.pending.as_ref()
    }

    /// Reads, foreign writes and the producer's hold on transient resources
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Number of writes declared so far
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_imported(&self) -> bool {
        self.bind_type == GraphResourceBindType::Imported
    }
}
