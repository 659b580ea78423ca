/// Tests for CompiledPipeline, PipelineResources and CustomPass

use super::*;
use std::sync::Mutex;
use crate::device::mock::MockGraphicsDevice;
use crate::device::ResourceFactory;
use crate::error::Error;
use crate::resource::{RegistryConfig, SamplerDesc};
use slotmap::SlotMap;

fn registry() -> Arc<ResourceRegistry> {
    Arc::new(ResourceRegistry::with_config(RegistryConfig {
        report_leaks: false,
        ..RegistryConfig::default()
    }))
}

fn graph_ids(count: usize) -> Vec<GraphResourceId> {
    let mut table: SlotMap<GraphResourceId, ()> = SlotMap::with_key();
    (0..count).map(|_| table.insert(())).collect()
}

fn bound(handle: ResourceHandle, name: &str) -> BoundResource {
    BoundResource {
        handle,
        kind: ResourceKind::Sampler,
        bind_type: GraphResourceBindType::ReadOnly,
        name: name.to_string(),
    }
}

fn recording_pass(log: &Arc<Mutex<Vec<String>>>, name: &str) -> CompiledPass {
    let log = log.clone();
    let label = name.to_string();
    CompiledPass::new(name.to_string(), Box::new(CustomPass::new(move |_| {
        log.lock().unwrap().push(format!("run {}", label));
        Ok(())
    })))
}

// ============================================================================
// Tests: Resources
// ============================================================================

#[test]
fn test_resolve_ignores_version() {
    let mut resources = PipelineResources::default();
    let ids = graph_ids(2);
    let mut handles: SlotMap<ResourceHandle, ()> = SlotMap::with_key();
    let backend = handles.insert(());

    resources.bind(ids[0], bound(backend, "linear"), false);
    assert_eq!(resources.resolve(GraphResourceHandle::new(ids[0], 0)), Some(backend));
    assert_eq!(resources.resolve(GraphResourceHandle::new(ids[0], 3)), Some(backend));
    assert_eq!(resources.resolve(GraphResourceHandle::new(ids[1], 0)), None);
    assert!(resources.owned().is_empty());
    assert_eq!(resources.get(GraphResourceHandle::new(ids[0], 0)).unwrap().name, "linear");
}

#[test]
fn test_pass_context_resource_lookup() {
    let registry = registry();
    let device = MockGraphicsDevice::new();
    let sampler = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());
    let ids = graph_ids(1);
    let mut resources = PipelineResources::default();
    resources.bind(ids[0], bound(sampler, "sampler"), false);

    let ctx = PassContext::new(&resources, &registry);
    let handle = GraphResourceHandle::new(ids[0], 0);
    assert_eq!(ctx.resolve(handle), Some(sampler));
    assert_eq!(ctx.resource(handle).unwrap().kind(), ResourceKind::Sampler);

    registry.release(sampler).unwrap();
    assert!(ctx.resource(handle).is_none());
}

// ============================================================================
// Tests: Execute
// ============================================================================

#[test]
fn test_execute_runs_passes_in_order_with_events() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = CompiledPipeline::new(registry());
    pipeline.set_passes(vec![recording_pass(&log, "depth"), recording_pass(&log, "color")], Vec::new());

    let events = log.clone();
    pipeline.add_pass_listener(move |event| {
        let line = match event {
            PassEvent::BeforePass(name) => format!("before {}", name),
            PassEvent::AfterPass(name) => format!("after {}", name),
        };
        events.lock().unwrap().push(line);
    });

    assert_eq!(pipeline.execute().unwrap(), 2);
    assert_eq!(*log.lock().unwrap(), vec![
        "before depth", "run depth", "after depth",
        "before color", "run color", "after color",
    ]);
}

#[test]
fn test_execute_skips_recoverable_failures() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let failing = CompiledPass::new("broken".to_string(), Box::new(CustomPass::new(|_| {
        Err(Error::ContractViolation("missing input".to_string()))
    })));
    let mut pipeline = CompiledPipeline::new(registry());
    pipeline.set_passes(vec![failing, recording_pass(&log, "after")], Vec::new());

    assert_eq!(pipeline.execute().unwrap(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["run after"]);
}

#[test]
fn test_execute_stops_on_fatal_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let fatal = CompiledPass::new("fatal".to_string(), Box::new(CustomPass::new(|_| {
        Err(Error::LifetimeViolation("use after release".to_string()))
    })));
    let mut pipeline = CompiledPipeline::new(registry());
    pipeline.set_passes(vec![fatal, recording_pass(&log, "never")], Vec::new());

    assert!(matches!(pipeline.execute(), Err(Error::LifetimeViolation(_))));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_fatal_error_still_closes_pass_events() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let fatal = CompiledPass::new("fatal".to_string(), Box::new(CustomPass::new(|_| {
        Err(Error::LifetimeViolation("use after release".to_string()))
    })));
    let mut pipeline = CompiledPipeline::new(registry());
    pipeline.set_passes(vec![fatal, recording_pass(&log, "never")], Vec::new());

    let events = log.clone();
    pipeline.add_pass_listener(move |event| {
        let line = match event {
            PassEvent::BeforePass(name) => format!("before {}", name),
            PassEvent::AfterPass(name) => format!("after {}", name),
        };
        events.lock().unwrap().push(line);
    });

    assert!(pipeline.execute().is_err());
    assert_eq!(*log.lock().unwrap(), vec!["before fatal", "after fatal"]);
}

#[test]
fn test_pass_queries() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = CompiledPipeline::new(registry());
    pipeline.set_passes(vec![recording_pass(&log, "blit")], vec!["unused".to_string()]);

    assert_eq!(pipeline.len(), 1);
    assert_eq!(pipeline.pass_names(), vec!["blit"]);
    assert_eq!(pipeline.culled_passes(), ["unused".to_string()]);
    assert!(pipeline.contains_pass("blit"));
    assert!(!pipeline.contains_pass("unused"));

    let ctx_registry = registry();
    let resources = PipelineResources::default();
    let ctx = PassContext::new(&resources, &ctx_registry);
    pipeline.get_pass_mut("blit").unwrap().pass_mut().execute(&ctx).unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);
}

// ============================================================================
// Tests: Drop
// ============================================================================

#[test]
fn test_drop_releases_owned_but_not_imported() {
    let registry = registry();
    let device = MockGraphicsDevice::new();
    let owned = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());
    registry.inc_ref(owned).unwrap();
    let imported = registry.register(device.create_sampler(&SamplerDesc::default()).unwrap());

    let ids = graph_ids(2);
    let mut pipeline = CompiledPipeline::new(registry.clone());
    pipeline.resources_mut().bind(ids[0], bound(owned, "owned"), true);
    pipeline.resources_mut().bind(ids[1], bound(imported, "imported"), false);
    drop(pipeline);

    assert_eq!(registry.ref_count(owned), Some(0));
    assert_eq!(registry.pending_release_count(), 1);
    assert_eq!(registry.release_resources(), 1);
    assert!(registry.get(owned).is_none());
    assert!(registry.get(imported).is_some());
}
