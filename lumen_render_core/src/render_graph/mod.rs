/// Render graph module
///
/// Nodes declare resource intents through a `RenderGraphBuilder`; `compile`
/// culls what no enabled output depends on, materializes the rest and
/// returns a `CompiledPipeline`.

mod resource;
mod node;
mod builder;
mod compile;
mod pipeline;

pub use resource::{GraphResource, GraphResourceBindType, GraphResourceHandle, GraphResourceId};
pub use node::{NodeId, NodeSetup, RenderGraphNode, ResourceBindings};
pub use builder::RenderGraphBuilder;
pub use pipeline::{
    BoundResource, CompiledPass, CompiledPipeline, CustomPass, PassContext, PassEvent,
    PipelineResources, RenderPass,
};
