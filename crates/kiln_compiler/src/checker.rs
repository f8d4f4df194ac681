//! Per-stage caching for graphics pipelines.
//!
//! A graphics pipeline is cached as two halves: the fragment stage and
//! everything before it. The code generator calls [`SplitStageChecker::check`]
//! once stage hashes are known; halves found in the cache are dropped from the
//! compile, and [`SplitStageChecker::update_and_merge`] stitches the cached and
//! fresh halves back together.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use kiln_cache::{EntryState, ShaderCacheStore};
use kiln_common::{ContentHash, ShaderStage, StageMask};

use crate::backend::{IrModule, IrUser, StageHashes};
use crate::cache_key::{fragment_hash, non_fragment_hash};
use crate::error::CompileError;
use crate::merge::merge_elf_binary;
use crate::pipeline::GraphicsPipelineBuildInfo;
use crate::reservation::{reserve, Reservation, Reserved};

enum Half<'r> {
    New,
    Ready(Arc<[u8]>),
    Compiling(Reservation<'r>),
}

impl Half<'_> {
    fn state(&self) -> EntryState {
        match self {
            Half::New => EntryState::New,
            Half::Ready(_) => EntryState::Ready,
            Half::Compiling(_) => EntryState::Compiling,
        }
    }
}

/// Returns `true` if a constant global reaches an instruction outside the
/// fragment stage. Such pipelines are not split.
fn constant_used_outside_fragment(module: &IrModule) -> bool {
    for global in module.globals.iter().filter(|g| g.is_constant) {
        let mut seen = HashSet::new();
        let mut worklist: VecDeque<IrUser> = global.users.iter().copied().collect();
        while let Some(user) = worklist.pop_front() {
            match user {
                IrUser::Instruction(stage) if stage != ShaderStage::Fragment => return true,
                IrUser::Instruction(_) => {}
                IrUser::Constant(index) => {
                    if !seen.insert(index) {
                        continue;
                    }
                    if let Some(expr) = module.constant_exprs.get(index) {
                        worklist.extend(expr.users.iter().copied());
                    }
                }
            }
        }
    }
    false
}

/// Split-stage cache state for one graphics pipeline compile.
pub struct SplitStageChecker<'r> {
    store: &'r dyn ShaderCacheStore,
    info: &'r GraphicsPipelineBuildInfo<'r>,
    option_hash: ContentHash,
    fragment: Half<'r>,
    non_fragment: Half<'r>,
}

impl<'r> SplitStageChecker<'r> {
    /// Creates a checker for `info`, keyed with `option_hash`.
    pub fn new(
        store: &'r dyn ShaderCacheStore,
        info: &'r GraphicsPipelineBuildInfo<'r>,
        option_hash: ContentHash,
    ) -> Self {
        Self {
            store,
            info,
            option_hash,
            fragment: Half::New,
            non_fragment: Half::New,
        }
    }

    /// State of the fragment half.
    pub fn fragment_state(&self) -> EntryState {
        self.fragment.state()
    }

    /// State of the non-fragment half.
    pub fn non_fragment_state(&self) -> EntryState {
        self.non_fragment.state()
    }

    /// Looks both halves up and returns the stages that still need code.
    ///
    /// The fragment half is reserved before the non-fragment half.
    pub fn check(&mut self, module: &IrModule, stage_mask: StageMask, hashes: &StageHashes) -> StageMask {
        if constant_used_outside_fragment(module) {
            log::debug!("constant global used outside the fragment stage; not splitting");
            return stage_mask;
        }

        if stage_mask.contains(ShaderStage::Fragment) {
            let hash = fragment_hash(self.info, hashes, &self.option_hash);
            self.fragment = lookup(self.store, hash);
            log::debug!(
                "fragment half {:#018x}: {}",
                hash.compact64(),
                self.fragment.state()
            );
        }
        if !stage_mask.non_fragment_part().is_empty() {
            let hash = non_fragment_hash(self.info, stage_mask, hashes, &self.option_hash);
            self.non_fragment = lookup(self.store, hash);
            log::debug!(
                "non-fragment half {:#018x}: {}",
                hash.compact64(),
                self.non_fragment.state()
            );
        }

        let mut remaining = stage_mask;
        if self.non_fragment.state() != EntryState::Compiling {
            remaining = remaining.fragment_part();
        }
        if self.fragment.state() != EntryState::Compiling {
            remaining.remove(ShaderStage::Fragment);
        }
        remaining
    }

    /// Merges in whichever halves came from the cache, then publishes the
    /// final binary to every reserved half.
    ///
    /// When neither half is cached the compiled ELF is already complete.
    pub fn update_and_merge(self, compiled: Vec<u8>) -> Result<Vec<u8>, CompileError> {
        let Self {
            fragment,
            non_fragment,
            ..
        } = self;

        let output = match (&fragment, &non_fragment) {
            (Half::Ready(_), _) | (_, Half::Ready(_)) => merge_elf_binary(
                cached_or(&fragment, &compiled),
                cached_or(&non_fragment, &compiled),
            )?,
            _ => compiled,
        };

        for half in [fragment, non_fragment] {
            if let Half::Compiling(slot) = half {
                slot.commit(&output);
            }
        }
        Ok(output)
    }
}

fn cached_or<'a>(half: &'a Half<'_>, compiled: &'a [u8]) -> &'a [u8] {
    match half {
        Half::Ready(blob) => &blob[..],
        _ => compiled,
    }
}

fn lookup(store: &dyn ShaderCacheStore, hash: ContentHash) -> Half<'_> {
    match reserve(store, hash) {
        Reserved::Ready(blob) => Half::Ready(blob),
        Reserved::Compiling(slot) => Half::Compiling(slot),
    }
}
