//! # Pass Hooks — Capability-Flagged Extensions
//!
//! Effects and tools sometimes need to run just before or just after a frame
//! is drawn: a camera shake nudging the stage, a profiler reading the frame
//! statistics. They implement [`PassHook`].
//!
//! A hook declares up front which callbacks it actually implements through
//! [`HookCapabilities`]. The flags are read once, when the hook is
//! registered, and stored next to it:
//!
//! ```text
//! hooks: [(shake,    { pre_render: true,  post_render: false }),
//!         (profiler, { pre_render: false, post_render: true  })]
//!
//! run_pre   → shake only
//! run_post  → profiler only
//! ```
//!
//! The per-frame loop just filters on a bool; nothing queries the hook to
//! see what it supports.

use crate::scene::Stage;

use super::stats::FrameStats;

/// Which callbacks a hook implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookCapabilities {
    pub pre_render: bool,
    pub post_render: bool,
}

pub trait PassHook {
    fn capabilities(&self) -> HookCapabilities;

    /// Before depth sorting and transform updates.
    fn pre_render(&mut self, _stage: &mut Stage) {}

    /// After the last flush of the frame.
    fn post_render(&mut self, _stats: &FrameStats) {}
}

/// Registered hooks with their capability flags.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<(Box<dyn PassHook>, HookCapabilities)>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn PassHook>) {
        let capabilities = hook.capabilities();
        self.hooks.push((hook, capabilities));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn run_pre(&mut self, stage: &mut Stage) {
        for (hook, caps) in &mut self.hooks {
            if caps.pre_render {
                hook.pre_render(stage);
            }
        }
    }

    pub fn run_post(&mut self, stats: &FrameStats) {
        for (hook, caps) in &mut self.hooks {
            if caps.post_render {
                hook.post_render(stats);
            }
        }
    }
}
