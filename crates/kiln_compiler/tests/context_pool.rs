//! Integration tests for context pooling and compiler instance registration.

mod common;

use std::sync::Arc;

use common::{harness, harness_on, shader, vs_fs_pipeline, GFX};
use kiln_common::{GfxIpVersion, ShaderStage};
use kiln_compiler::{
    CompileError, Compiler, ComputePipelineBuildInfo, PipelineShaderInfo, ProcessRegistry,
    ReferenceBackend,
};

#[test]
fn sequential_builds_reuse_one_context() {
    let h = harness(&[]);
    let vs = h.module(&shader(ShaderStage::Vertex, 2));
    let fs_a = h.module(&shader(ShaderStage::Fragment, 2));
    let fs_b = h.module(&shader(ShaderStage::Fragment, 3));

    for fs in [&fs_a, &fs_b] {
        h.compiler
            .build_graphics_pipeline(&vs_fs_pipeline(&vs, fs), None)
            .unwrap();
    }

    let stats = h.compiler.context_pool().stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.in_use, 0);

    let ctx = h.compiler.context_pool().acquire(GFX);
    assert!(ctx.is_clean());
    assert_eq!(ctx.compile_count(), 2);
}

#[test]
fn contexts_are_bound_to_their_target() {
    let h = harness(&[]);
    let pool = h.compiler.context_pool();
    let gfx9 = GfxIpVersion::new(9, 0, 0);
    {
        let a = pool.acquire(GFX);
        let b = pool.acquire(GFX);
        assert_ne!(a.slot(), b.slot());
        assert_eq!(pool.stats().in_use, 2);
    }
    let other = pool.acquire(gfx9);
    assert_eq!(other.gfxip(), gfx9);
    assert_eq!(pool.stats().created, 3);
}

#[test]
fn parallel_builds_use_distinct_contexts() {
    let h = harness(&[]);
    let modules: Vec<_> = (1..=6)
        .map(|n| h.module(&shader(ShaderStage::Compute, n)))
        .collect();

    std::thread::scope(|scope| {
        for module in &modules {
            let compiler = &h.compiler;
            scope.spawn(move || {
                let info = ComputePipelineBuildInfo {
                    cs: PipelineShaderInfo::new(ShaderStage::Compute, module, "main"),
                    ..ComputePipelineBuildInfo::default()
                };
                compiler.build_compute_pipeline(&info, None).unwrap();
            });
        }
    });

    let stats = h.compiler.context_pool().stats();
    assert_eq!(stats.in_use, 0);
    assert!(stats.created >= 1 && stats.created <= 6);
    assert_eq!(h.backend.codegen_count(ShaderStage::Compute), 6);
}

// ===========================================================================
// Registration
// ===========================================================================

#[test]
fn dropping_an_instance_trims_the_pool_to_the_floor() {
    let registry = ProcessRegistry::with_resident_floor(0);
    let h = harness_on(&registry, &[]);
    {
        let _a = h.compiler.context_pool().acquire(GFX);
        let _b = h.compiler.context_pool().acquire(GFX);
    }
    let pool = registry.pool().unwrap();
    assert_eq!(pool.stats().live, 2);

    drop(h);
    assert_eq!(registry.instance_count(), 0);
    assert_eq!(pool.stats().live, 0);
}

#[test]
fn resident_floor_keeps_idle_contexts() {
    let registry = ProcessRegistry::with_resident_floor(4);
    let h = harness_on(&registry, &[]);
    {
        let _a = h.compiler.context_pool().acquire(GFX);
        let _b = h.compiler.context_pool().acquire(GFX);
    }
    drop(h);
    assert_eq!(registry.pool().unwrap().stats().live, 2);
}

#[test]
fn initialization_runs_once_per_registry() {
    let registry = ProcessRegistry::with_resident_floor(0);
    let a = harness_on(&registry, &[]);
    let b = harness_on(&registry, &[]);
    drop(a);
    let c = harness_on(&registry, &[]);
    assert_eq!(registry.init_runs(), 1);
    assert_eq!(registry.instance_count(), 2);
    drop((b, c));
}

#[test]
fn redirecting_instance_pins_the_option_set() {
    let registry = ProcessRegistry::with_resident_floor(0);
    let verbose = harness_on(&registry, &["-enable-outs"]);
    assert_eq!(registry.redirect_count(), 1);

    let err = Compiler::with_registry(
        &registry,
        GFX,
        &["kiln-tests", "-subgroup-size=32"],
        Arc::new(ReferenceBackend::new()),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::OptionConflict));
    assert_eq!(registry.instance_count(), 1);

    // Identical options are always accepted.
    let same = harness_on(&registry, &["-enable-outs"]);
    assert_eq!(registry.instance_count(), 2);
    drop((verbose, same));
    assert_eq!(registry.redirect_count(), 0);
}

#[test]
fn quiet_instances_may_change_the_option_set() {
    let registry = ProcessRegistry::with_resident_floor(0);
    let a = harness_on(&registry, &[]);
    let b = harness_on(&registry, &["-subgroup-size=32"]);
    assert_eq!(registry.instance_count(), 2);
    assert_eq!(registry.option_hash(), Some(b.compiler.option_hash()));
    drop((a, b));
}
