//! # State Stacks — Push, Pop, and Skip Redundant Binds
//!
//! GPU state (blend mode, shader, render target, viewport, vertex buffer) is
//! expensive to switch and easy to leak. Each kind of state lives in a
//! [`StateStack`] whose bottom entry is a default that can never be popped.
//!
//! ```text
//! blend stack           bound
//! ┌──────────┐
//! │ Add      │  ◄── top    Add     set(Add) bound it
//! │ Normal   │  ◄── [0]            default, installed at construction
//! └──────────┘
//!
//! set(Add)     push, bind unless Add is already what the backend holds
//! pop()        drop Add, rebind Normal
//! pop()        no-op: the default stays
//! ```
//!
//! Binding goes through a closure so the stacks don't care which backend is
//! listening. The stack remembers the last value it bound; after a context
//! loss [`invalidate`](StateStack::invalidate) forgets it so the next `set`
//! binds for real.
//!
//! ## Comparison
//!
//! - **WebGL wrappers**: usually a flat "current state" cache per GL enum.
//!   Same redundant-bind check, but no push/pop, so nested passes must save
//!   and restore by hand.
//! - **wgpu**: pipelines freeze blend and shader together; the stacks here
//!   decide *which* pipeline to use, and the backend maps that to a cached
//!   pipeline object.

use serde::{Deserialize, Serialize};

/// A stack of one kind of render state with a permanent default at index 0.
#[derive(Debug, Clone)]
pub struct StateStack<T> {
    stack: Vec<T>,
    bound: Option<T>,
    binds: u32,
}

impl<T: Clone + PartialEq> StateStack<T> {
    pub fn new(default: T) -> Self {
        Self {
            stack: vec![default],
            bound: None,
            binds: 0,
        }
    }

    pub fn current(&self) -> &T {
        // Index 0 is never popped.
        &self.stack[self.stack.len() - 1]
    }

    pub fn default_value(&self) -> &T {
        &self.stack[0]
    }

    /// Number of entries, the default included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The value the backend was last told about, if any.
    pub fn bound(&self) -> Option<&T> {
        self.bound.as_ref()
    }

    /// Binds issued since construction.
    pub fn bind_count(&self) -> u32 {
        self.binds
    }

    fn bind_if_changed(&mut self, bind: impl FnOnce(&T)) -> bool {
        let current = self.current().clone();
        if self.bound.as_ref() == Some(&current) {
            return false;
        }
        bind(&current);
        self.bound = Some(current);
        self.binds += 1;
        true
    }

    /// Push `value` and bind it, unless it equals the bound value. Returns
    /// whether a bind happened.
    pub fn set(&mut self, value: T, bind: impl FnOnce(&T)) -> bool {
        self.stack.push(value);
        self.bind_if_changed(bind)
    }

    /// Replace the top entry in place (or push over the default), binding
    /// if it differs from what is bound. Used for per-object switches where
    /// pushing would grow the stack by one entry per sprite.
    pub fn replace(&mut self, value: T, bind: impl FnOnce(&T)) -> bool {
        if self.stack.len() > 1 {
            let top = self.stack.len() - 1;
            self.stack[top] = value;
        } else {
            self.stack.push(value);
        }
        self.bind_if_changed(bind)
    }

    /// Pop the top entry and rebind whatever is now current. The default
    /// entry is never popped; returns `false` if there was nothing to pop.
    pub fn pop(&mut self, bind: impl FnOnce(&T)) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        self.stack.pop();
        let current = self.current().clone();
        bind(&current);
        self.bound = Some(current);
        self.binds += 1;
        true
    }

    /// Pop everything above the default, binding the default once if needed.
    pub fn reset(&mut self, bind: impl FnOnce(&T)) {
        self.stack.truncate(1);
        self.bind_if_changed(bind);
    }

    /// Bind the current value if the backend may not hold it.
    pub fn ensure_bound(&mut self, bind: impl FnOnce(&T)) -> bool {
        self.bind_if_changed(bind)
    }

    /// Forget what is bound (the context was lost or restored).
    pub fn invalidate(&mut self) {
        self.bound = None;
    }
}

/// How a sprite's pixels combine with what is already drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Source-over alpha blending.
    #[default]
    Normal,
    /// Additive.
    Add,
    Multiply,
    Screen,
    /// Clears the destination where the source is opaque.
    Erase,
}

impl BlendMode {
    /// The equivalent 2D-canvas composite operation.
    pub fn canvas_operation(self) -> &'static str {
        match self {
            BlendMode::Normal => "source-over",
            BlendMode::Add => "lighter",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Erase => "destination-out",
        }
    }
}

/// A shader program known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

impl ShaderId {
    /// The built-in textured, tinted sprite shader.
    pub const SPRITE: ShaderId = ShaderId(0);
}

impl Default for ShaderId {
    fn default() -> Self {
        Self::SPRITE
    }
}

/// Where draws land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTarget {
    #[default]
    Screen,
    Framebuffer(u32),
}

/// Pixel rectangle of the render target that draws map to.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// True if the axis-aligned box `min..max` overlaps this viewport.
    pub fn intersects(&self, min: [f32; 2], max: [f32; 2]) -> bool {
        min[0] < self.x + self.width && max[0] > self.x && min[1] < self.y + self.height && max[1] > self.y
    }
}

/// A vertex buffer owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexBufferId(pub u32);
