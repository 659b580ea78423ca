/// Render graph builder: compile phase
///
/// Culling is a reverse-reachability sweep over reference counts.
///
/// - A resource holds one reference per read and per write from a node other
///   than its producer, plus one from its producer when Transient.
/// - A node holds one reference when enabled, one per write by another node
///   into a resource it produced, and one per produced resource that another
///   node reads.
/// - An enabled node whose only outputs are unreferenced resources (and that
///   writes nothing it did not produce) has no observable effect and is not
///   seeded.
///
/// Resources at zero are culled, nodes at zero release everything they
/// hold, and the sweep repeats until nothing changes. Survivors are
/// materialized and compiled in insertion order.
///
/// An import released before compile takes down every node that touches
/// it, and transitively every node that touches what those nodes produce.
/// The rest of the graph compiles as usual.

use slotmap::SecondaryMap;
use crate::error::{Error, Result};
use crate::{lumen_debug, lumen_error, lumen_trace, lumen_warn};
use super::builder::{checked_release, RenderGraphBuilder, SOURCE};
use super::node::NodeId;
use super::pipeline::{BoundResource, CompiledPass, CompiledPipeline, PassContext};
use super::resource::{GraphResourceBindType, GraphResourceId};

pub(crate) struct CullState {
    node_counts: SecondaryMap<NodeId, u32>,
    resource_counts: SecondaryMap<GraphResourceId, u32>,
    /// Reads by nodes other than the producer
    external_reads: SecondaryMap<GraphResourceId, u32>,
    seeded: SecondaryMap<NodeId, bool>,
    pub(crate) dead_nodes: SecondaryMap<NodeId, ()>,
    pub(crate) culled_resources: SecondaryMap<GraphResourceId, ()>,
    node_queue: Vec<NodeId>,
    resource_queue: Vec<GraphResourceId>,
}

impl RenderGraphBuilder {
    /// Cull, materialize and compile the graph
    ///
    /// Materialization failures and fatal node compile errors abort the
    /// compile; resources materialized so far are handed back to the
    /// registry. A node failing to compile with a recoverable error is
    /// logged and left out of the pipeline.
    pub fn compile(mut self) -> Result<CompiledPipeline> {
        let state = self.cull()?;

        let mut pipeline = CompiledPipeline::new(self.registry.clone());
        self.materialize(&state, &mut pipeline)?;

        let mut passes = Vec::new();
        let mut culled = Vec::new();
        {
            let ctx = PassContext::new(pipeline.resources(), &self.registry);
            for &id in &self.node_order {
                let Some(entry) = self.nodes.get_mut(id) else {
                    continue;
                };
                if state.dead_nodes.contains_key(id) {
                    culled.push(entry.name.clone());
                    continue;
                }
                let Some(node) = entry.node.as_mut() else {
                    continue;
                };
                match node.compile(&ctx) {
                    Ok(pass) => passes.push(CompiledPass::new(entry.name.clone(), pass)),
                    Err(err) if err.is_fatal() => {
                        lumen_error!(SOURCE, "Compile of node '{}' failed: {}", entry.name, err);
                        return Err(err);
                    }
                    Err(err) => lumen_error!(SOURCE, "Compile of node '{}' failed, pass skipped: {}", entry.name, err),
                }
            }
        }

        lumen_debug!(SOURCE, "Compiled {} passes ({} culled), {} resources bound",
            passes.len(), culled.len(), pipeline.resources().len());
        pipeline.set_passes(passes, culled);
        Ok(pipeline)
    }

    pub(crate) fn cull(&self) -> Result<CullState> {
        let mut state = CullState {
            node_counts: SecondaryMap::new(),
            resource_counts: SecondaryMap::new(),
            external_reads: SecondaryMap::new(),
            seeded: SecondaryMap::new(),
            dead_nodes: SecondaryMap::new(),
            culled_resources: SecondaryMap::new(),
            node_queue: Vec::new(),
            resource_queue: Vec::new(),
        };

        for (id, resource) in &self.resources {
            state.resource_counts.insert(id, resource.ref_count);
            state.external_reads.insert(id, 0);
        }
        for &node in &self.node_order {
            for &read in &self.nodes[node].reads {
                if self.resources[read].producer != Some(node) {
                    state.external_reads[read] += 1;
                }
            }
        }

        for &node in &self.node_order {
            let entry = &self.nodes[node];
            let holds = entry
                .produced
                .iter()
                .filter(|produced| state.external_reads[**produced] > 0)
                .count() as u32;
            let enabled = entry.node.as_ref().map(|node| node.is_enabled()).unwrap_or(false);
            let seeded = enabled && !self.is_effectless(node, &state);
            let count = entry.ref_count + holds + u32::from(seeded);
            state.node_counts.insert(node, count);
            state.seeded.insert(node, seeded);
            if count == 0 {
                state.node_queue.push(node);
            }
        }

        self.cull_stale_imports(&mut state);

        for &id in &self.resource_order {
            if state.culled_resources.contains_key(id) {
                continue;
            }
            if state.resource_counts[id] == 0 && !self.resources[id].is_imported() {
                state.culled_resources.insert(id, ());
                state.resource_queue.push(id);
            }
        }

        loop {
            if let Some(resource) = state.resource_queue.pop() {
                self.on_resource_culled(resource, &mut state)?;
            } else if let Some(node) = state.node_queue.pop() {
                self.on_node_culled(node, &mut state)?;
            } else {
                break;
            }
        }
        Ok(state)
    }

    /// Cull stale imports and queue every node that depends on one
    ///
    /// Nodes only reference resources declared before them, so one pass in
    /// insertion order reaches every dependent.
    fn cull_stale_imports(&self, state: &mut CullState) {
        for &id in &self.resource_order {
            let resource = &self.resources[id];
            if let Some(backing) = resource.backing.filter(|_| resource.is_imported()) {
                if !self.registry.contains(backing) {
                    lumen_warn!(SOURCE, "Imported resource '{}' was released before compile", resource.name);
                    state.culled_resources.insert(id, ());
                }
            }
        }
        if state.culled_resources.is_empty() {
            return;
        }

        for &node in &self.node_order {
            let entry = &self.nodes[node];
            let depends = entry
                .reads
                .iter()
                .chain(&entry.writes)
                .any(|resource| state.culled_resources.contains_key(*resource));
            if !depends {
                continue;
            }
            lumen_warn!(SOURCE, "Node '{}' depends on a released import and is culled", entry.name);
            for &produced in &entry.produced {
                state.culled_resources.insert(produced, ());
            }
            state.node_queue.push(node);
        }
    }

    /// Enabled node with only unreferenced outputs and no foreign writes
    fn is_effectless(&self, node: NodeId, state: &CullState) -> bool {
        let entry = &self.nodes[node];
        !entry.produced.is_empty()
            && entry.produced.iter().all(|produced| state.resource_counts[*produced] == 0)
            && !self.has_foreign_writes(node)
    }

    fn has_foreign_writes(&self, node: NodeId) -> bool {
        self.nodes[node]
            .writes
            .iter()
            .any(|written| self.resources[*written].producer != Some(node))
    }

    fn on_resource_culled(&self, resource: GraphResourceId, state: &mut CullState) -> Result<()> {
        lumen_trace!(SOURCE, "Culled resource '{}'", self.resources[resource].name);
        let Some(producer) = self.resources[resource].producer else {
            return Ok(());
        };
        if !state.seeded[producer] || state.dead_nodes.contains_key(producer) {
            return Ok(());
        }

        // A seeded producer whose outputs are all gone keeps running only for foreign writes
        let entry = &self.nodes[producer];
        let all_culled = entry.produced.iter().all(|produced| state.culled_resources.contains_key(*produced));
        if all_culled && !self.has_foreign_writes(producer) {
            state.seeded[producer] = false;
            self.release_node(producer, state)?;
        }
        Ok(())
    }

    fn on_node_culled(&self, node: NodeId, state: &mut CullState) -> Result<()> {
        if state.dead_nodes.insert(node, ()).is_some() {
            return Ok(());
        }
        let entry = &self.nodes[node];
        lumen_trace!(SOURCE, "Culled node '{}'", entry.name);

        for &read in &entry.reads {
            let producer = self.resources[read].producer;
            if producer != Some(node) {
                state.external_reads[read] = checked_release(state.external_reads[read], &self.resources[read].name)?;
                if state.external_reads[read] == 0 {
                    if let Some(producer) = producer {
                        self.release_node(producer, state)?;
                    }
                }
            }
            self.release_resource(read, state)?;
        }
        for &produced in &entry.produced {
            if state.resource_counts[produced] > 0 && self.resources[produced].bind_type == GraphResourceBindType::Transient {
                self.release_resource(produced, state)?;
            }
        }
        for &written in &entry.writes {
            let producer = self.resources[written].producer;
            if producer == Some(node) {
                continue;
            }
            if let Some(producer) = producer {
                self.release_node(producer, state)?;
            }
            self.release_resource(written, state)?;
        }
        Ok(())
    }

    fn release_node(&self, node: NodeId, state: &mut CullState) -> Result<()> {
        let count = checked_release(state.node_counts[node], &self.nodes[node].name)?;
        state.node_counts[node] = count;
        if count == 0 {
            state.node_queue.push(node);
        }
        Ok(())
    }

    fn release_resource(&self, resource: GraphResourceId, state: &mut CullState) -> Result<()> {
        let count = checked_release(state.resource_counts[resource], &self.resources[resource].name)?;
        state.resource_counts[resource] = count;
        if count == 0 && !self.resources[resource].is_imported() && !state.culled_resources.contains_key(resource) {
            state.culled_resources.insert(resource, ());
            state.resource_queue.push(resource);
        }
        Ok(())
    }

    /// Create, register and bind every surviving resource
    fn materialize(&mut self, state: &CullState, pipeline: &mut CompiledPipeline) -> Result<()> {
        for &id in &self.resource_order {
            if state.culled_resources.contains_key(id) {
                continue;
            }
            let Some(resource) = self.resources.get_mut(id) else {
                continue;
            };

            let (handle, owned) = if let Some(imported) = resource.backing {
                if !self.registry.contains(imported) {
                    lumen_warn!(SOURCE, "Imported resource '{}' is stale", resource.name);
                    return Err(Error::InvalidResource(format!(
                        "imported resource '{}' was released before compile", resource.name
                    )));
                }
                (imported, false)
            } else if let Some(desc) = &resource.pending {
                let created = match self.factory.create_resource(desc) {
                    Ok(created) => created,
                    Err(err) => {
                        lumen_error!(SOURCE, "Failed to materialize {} '{}': {}", resource.kind, resource.name, err);
                        return Err(err);
                    }
                };
                let handle = self.registry.register(created);
                self.registry.inc_ref(handle)?;
                lumen_trace!(SOURCE, "Materialized {} '{}'", resource.kind, resource.name);
                (handle, true)
            } else {
                continue;
            };

            resource.backing = Some(handle);
            pipeline.resources_mut().bind(id, BoundResource {
                handle,
                kind: resource.kind,
                bind_type: resource.bind_type,
                name: resource.name.clone(),
            }, owned);
        }
        Ok(())
    }
}
