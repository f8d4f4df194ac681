//! Process-wide compiler state.
//!
//! Backend initialization happens once per process, when the first compiler
//! instance registers. The registry also tracks the effective option set of
//! the live instances, how many of them redirect output, and owns the context
//! pool they share.

use std::sync::{Arc, OnceLock};

use kiln_common::ContentHash;
use kiln_config::{resident_context_floor, CompilerOptions};
use parking_lot::Mutex;

use crate::cache_key::option_cache_hash;
use crate::error::CompileError;
use crate::pool::ContextPool;

#[derive(Default)]
struct ProcessState {
    instances: usize,
    redirects: usize,
    option_hash: Option<ContentHash>,
    initialized: bool,
    init_runs: usize,
    pool: Option<Arc<ContextPool>>,
}

/// Registry of live compiler instances.
pub struct ProcessRegistry {
    state: Mutex<ProcessState>,
    resident_floor: OnceLock<usize>,
}

static GLOBAL: OnceLock<Arc<ProcessRegistry>> = OnceLock::new();

impl ProcessRegistry {
    /// Creates a registry whose resident-context floor is read from the
    /// environment on first use.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProcessState::default()),
            resident_floor: OnceLock::new(),
        })
    }

    /// Creates a registry with a fixed resident-context floor.
    pub fn with_resident_floor(floor: usize) -> Arc<Self> {
        let registry = Self::new();
        let _ = registry.resident_floor.set(floor);
        registry
    }

    /// The registry shared by every compiler in the process.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Registers an instance using `options`.
    ///
    /// When instances are already live and `options` hash differently from
    /// theirs, the new set replaces the old one only if no live instance
    /// redirects output; otherwise the request fails with
    /// [`CompileError::OptionConflict`].
    pub fn register(self: &Arc<Self>, options: &CompilerOptions) -> Result<InstanceToken, CompileError> {
        let hash = option_cache_hash(&options.args);
        let mut state = self.state.lock();

        if state.instances > 0 && state.option_hash != Some(hash) {
            if state.redirects > 0 {
                log::error!(
                    "incompatible compiler options across compiler instances ({:#018x} vs {:#018x})",
                    state.option_hash.map(|h| h.compact64()).unwrap_or_default(),
                    hash.compact64()
                );
                return Err(CompileError::OptionConflict);
            }
            log::debug!("replacing process option set with {:#018x}", hash.compact64());
        }

        if !state.initialized {
            log::info!("initializing kiln backend");
            state.initialized = true;
            state.init_runs += 1;
        }
        let pool = state
            .pool
            .get_or_insert_with(|| Arc::new(ContextPool::new()))
            .clone();

        let redirects = options.redirects_output();
        state.instances += 1;
        if redirects {
            state.redirects += 1;
        }
        state.option_hash = Some(hash);

        Ok(InstanceToken {
            registry: Arc::clone(self),
            pool,
            redirects,
        })
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.state.lock().instances
    }

    /// Number of live instances that redirect output.
    pub fn redirect_count(&self) -> usize {
        self.state.lock().redirects
    }

    /// How many times one-time initialization has run (0 or 1).
    pub fn init_runs(&self) -> usize {
        self.state.lock().init_runs
    }

    /// Option hash of the live instances.
    pub fn option_hash(&self) -> Option<ContentHash> {
        self.state.lock().option_hash
    }

    /// The shared context pool, once the first instance has registered.
    pub fn pool(&self) -> Option<Arc<ContextPool>> {
        self.state.lock().pool.clone()
    }

    fn resident_floor(&self) -> usize {
        *self.resident_floor.get_or_init(resident_context_floor)
    }

    fn unregister(&self, pool: &ContextPool, redirects: bool) {
        let destroyed = pool.trim(self.resident_floor());
        if destroyed > 0 {
            log::debug!("released {destroyed} idle compilation contexts");
        }
        let mut state = self.state.lock();
        if redirects {
            state.redirects -= 1;
        }
        state.instances -= 1;
        if state.instances == 0 {
            log::debug!("last compiler instance released");
            state.option_hash = None;
        }
    }
}

/// Proof of registration held by a compiler instance; unregisters on drop.
pub struct InstanceToken {
    registry: Arc<ProcessRegistry>,
    pool: Arc<ContextPool>,
    redirects: bool,
}

impl InstanceToken {
    /// The shared context pool.
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }
}

impl Drop for InstanceToken {
    fn drop(&mut self) {
        self.registry.unregister(&self.pool, self.redirects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::GfxIpVersion;

    fn options(args: &[&str]) -> CompilerOptions {
        CompilerOptions::parse(args).unwrap()
    }

    #[test]
    fn init_runs_once() {
        let registry = ProcessRegistry::with_resident_floor(0);
        let a = registry.register(&options(&["kiln-tests"])).unwrap();
        let b = registry.register(&options(&["kiln-tests"])).unwrap();
        assert_eq!(registry.instance_count(), 2);
        drop(a);
        drop(b);
        let _c = registry.register(&options(&["kiln-tests"])).unwrap();
        assert_eq!(registry.init_runs(), 1);
    }

    #[test]
    fn differing_options_without_redirect_replace() {
        let registry = ProcessRegistry::with_resident_floor(0);
        let _a = registry.register(&options(&["kiln", "-disable-licm"])).unwrap();
        let before = registry.option_hash();
        let _b = registry.register(&options(&["kiln", "-subgroup-size=32"])).unwrap();
        assert_ne!(registry.option_hash(), before);
        assert_eq!(registry.instance_count(), 2);
    }

    #[test]
    fn differing_options_with_redirect_conflict() {
        let registry = ProcessRegistry::with_resident_floor(0);
        let _a = registry
            .register(&options(&["kiln", "-enable-outs", "-disable-licm"]))
            .unwrap();
        assert_eq!(registry.redirect_count(), 1);
        let err = registry
            .register(&options(&["kiln", "-subgroup-size=32"]))
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::OptionConflict));
        assert_eq!(registry.instance_count(), 1);
    }

    #[test]
    fn same_effective_options_never_conflict() {
        let registry = ProcessRegistry::with_resident_floor(0);
        let _a = registry
            .register(&options(&["kiln", "-enable-outs", "-disable-licm"]))
            .unwrap();
        let _b = registry
            .register(&options(&["other", "-disable-licm", "-enable-errs"]))
            .unwrap();
        assert_eq!(registry.redirect_count(), 2);
    }

    #[test]
    fn last_instance_trims_to_floor() {
        let registry = ProcessRegistry::with_resident_floor(1);
        let token = registry.register(&options(&["kiln"])).unwrap();
        {
            let _a = token.pool().acquire(GfxIpVersion::new(9, 0, 0));
            let _b = token.pool().acquire(GfxIpVersion::new(9, 0, 0));
        }
        assert_eq!(token.pool().stats().live, 2);
        drop(token);
        let pool = registry.pool().unwrap();
        assert_eq!(pool.stats().live, 1);
        assert_eq!(registry.instance_count(), 0);
        assert_eq!(registry.option_hash(), None);
    }
}
