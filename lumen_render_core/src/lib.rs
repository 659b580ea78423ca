/*!
# Lumen Render Core

GPU resource lifetime and render-graph scheduling for the Lumen renderer.

Backends (Vulkan, Direct3D 12, mock, etc.) plug in through the
`ResourceFactory` and `GraphicsDevice` traits; this crate owns every
resource they create behind generation-tagged handles and schedules the
passes that use them.

## Architecture

- **ResourceRegistry**: handle table with reference counts and deferred release
- **MultiBufferedResource**: per-frame rotation of parallel buffer ranges
- **MappedResourceCache**: nested CPU mappings keyed by (resource, sub-resource)
- **RenderDevice**: resource front-end and frame driver over one backend
- **RenderGraphBuilder**: pass declaration, culling and late materialization
- **CompiledPipeline**: ordered passes bound to live resources
*/

// Internal modules
mod error;
pub mod log;
pub mod resource;
pub mod device;
pub mod render_graph;

// Main lumen namespace module
pub mod lumen {
    // Error types
    pub use crate::error::{Error, Result};

    // Registry and handles
    pub use crate::resource::{ResourceHandle, ResourceRegistry, RegistryConfig};

    // Device front-end and backend traits
    pub use crate::device::{
        DeviceConfig, DeviceLimits, FenceValue, GraphicsDevice, RenderDevice, ResourceFactory,
    };

    // Render graph entry points
    pub use crate::render_graph::{CompiledPipeline, RenderGraphBuilder, RenderGraphNode};

    // Logging sub-module (types and logger installation)
    pub mod log {
        pub use crate::log::{
            reset_logger, set_logger, DefaultLogger, LogEntry, LogSeverity, Logger,
        };
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }

    // Device sub-module
    pub mod device {
        pub use crate::device::*;
    }

    // Render graph sub-module
    pub mod graph {
        pub use crate::render_graph::*;
    }
}

// Re-export math library at crate root
pub use glam;
