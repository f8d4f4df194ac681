//! The compiler instance.
//!
//! A [`Compiler`] owns its parsed options, its shader cache, and a
//! registration with the process-wide [`ProcessRegistry`]. Shader module and
//! pipeline builds are implemented in [`crate::module_build`] and
//! [`crate::pipeline_build`].

use std::path::PathBuf;
use std::sync::Arc;

use kiln_cache::{BuildIdentity, ShaderCache, ShaderCacheConfig, ShaderCacheStore};
use kiln_common::{ContentHash, GfxIpVersion};
use kiln_config::CompilerOptions;
use kiln_elf::{pipeline_statistics, PipelineStatistics};

use crate::backend::Backend;
use crate::cache_key::{option_cache_hash, option_identity_hash};
use crate::error::CompileError;
use crate::pool::{ContextPool, PooledContext};
use crate::process::{InstanceToken, ProcessRegistry};

/// A compiler bound to one GPU target and one option set.
///
/// Builds may run concurrently from any number of threads.
pub struct Compiler {
    gfxip: GfxIpVersion,
    options: CompilerOptions,
    option_hash: ContentHash,
    identity_hash: ContentHash,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) cache: Arc<dyn ShaderCacheStore>,
    instance: InstanceToken,
}

impl Compiler {
    /// Creates a compiler registered with the process-wide registry.
    ///
    /// `args` is an option vector whose first element names the client.
    pub fn new<S: AsRef<str>>(
        gfxip: GfxIpVersion,
        args: &[S],
        backend: Arc<dyn Backend>,
    ) -> Result<Self, CompileError> {
        Self::with_registry(&ProcessRegistry::global(), gfxip, args, backend)
    }

    /// Creates a compiler registered with `registry`.
    ///
    /// Fails with [`CompileError::OptionConflict`] if the options differ from
    /// those of a live instance that redirects output.
    pub fn with_registry<S: AsRef<str>>(
        registry: &Arc<ProcessRegistry>,
        gfxip: GfxIpVersion,
        args: &[S],
        backend: Arc<dyn Backend>,
    ) -> Result<Self, CompileError> {
        let options = CompilerOptions::parse(args)?;
        let instance = registry.register(&options)?;
        let option_hash = option_cache_hash(&options.args);
        let identity_hash = option_identity_hash(&options.args);

        let dir = Some(options.shader_cache_file_dir.clone())
            .filter(|dir: &PathBuf| !dir.as_os_str().is_empty());
        let cache = ShaderCache::new(ShaderCacheConfig {
            mode: options.shader_cache_mode,
            dir,
            identity: BuildIdentity {
                gfxip,
                option_hash: option_hash.compact64(),
            },
            executable_name: options.executable_name.clone(),
        });

        log::info!(
            "created compiler for gfx {gfxip} (client '{}', options {:#018x}, cache mode {:?})",
            options.client_name(),
            option_hash.compact64(),
            options.shader_cache_mode
        );

        Ok(Self {
            gfxip,
            options,
            option_hash,
            identity_hash,
            backend,
            cache: Arc::new(cache),
            instance,
        })
    }

    /// Replaces the internal shader cache with an application-supplied one.
    pub fn with_shader_cache(mut self, cache: Arc<dyn ShaderCacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// The GPU target.
    pub fn gfxip(&self) -> GfxIpVersion {
        self.gfxip
    }

    /// The parsed options.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Hash of the options that affect generated code.
    pub fn option_hash(&self) -> ContentHash {
        self.option_hash
    }

    /// Hash of every option, used for pipeline identity reports.
    pub fn identity_hash(&self) -> ContentHash {
        self.identity_hash
    }

    /// The shader cache this compiler reads and populates.
    pub fn shader_cache(&self) -> &dyn ShaderCacheStore {
        self.cache.as_ref()
    }

    /// The context pool shared with the other instances of the registry.
    pub fn context_pool(&self) -> &ContextPool {
        self.instance.pool()
    }

    /// Reads register and scratch statistics from a pipeline ELF.
    pub fn pipeline_statistics(&self, elf: &[u8]) -> Result<PipelineStatistics, CompileError> {
        Ok(pipeline_statistics(elf)?)
    }

    pub(crate) fn acquire_context(&self) -> PooledContext<'_> {
        let mut ctx = self.instance.pool().acquire(self.gfxip);
        ctx.set_subgroup_size(self.options.subgroup_size);
        ctx
    }

    pub(crate) fn unroll_loops(&self) -> bool {
        self.options.enable_dynamic_loop_unroll || self.options.force_loop_unroll_count > 0
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("gfxip", &self.gfxip)
            .field("option_hash", &self.option_hash)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
