//! # Render — Batched and Canvas Paths
//!
//! Two ways to turn a [`Stage`](crate::scene::Stage) into pixels, fed by the
//! same transforms and frames:
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!   Stage ──────────►│ depth_sort + update_transforms   │
//!                    └────────────────┬─────────────────┘
//!                                     │ visible sprites, paint order
//!                 ┌───────────────────┴───────────────────┐
//!                 ▼                                       ▼
//!   RenderPass (batched)                      CanvasBlitter (immediate)
//!   quads → VertexBatch                       one draw_image per sprite
//!   flush on full / units / blend / shader    save/set_transform/restore
//!   GraphicsBackend                           when not axis-aligned
//!                                             Canvas2d
//! ```
//!
//! For sprites whose final matrix is axis-aligned (no rotation, no skew, no
//! flip) both paths floor the destination rectangle corner by corner, so
//! they land on exactly the same pixels.

mod backend;
mod batch;
mod camera;
mod canvas;
#[cfg(feature = "gpu")]
mod gpu;
mod hooks;
mod pass;
pub mod state;
mod stats;
pub mod vertex;

pub use backend::{BackendError, GpuCommand, GraphicsBackend, RecordingBackend};
pub use batch::VertexBatch;
pub use camera::Camera;
pub use canvas::{Canvas2d, CanvasBlitter, CanvasCommand, ImageCanvas, RecordingCanvas};
#[cfg(feature = "gpu")]
pub use gpu::WgpuBackend;
pub use hooks::{HookCapabilities, HookSet, PassHook};
pub use pass::RenderPass;
pub use state::{BlendMode, RenderTarget, ShaderId, StateStack, VertexBufferId, Viewport};
pub use stats::{FlushCounts, FlushReason, FrameStats, RenderEvent};
pub use vertex::SpriteVertex;

use crate::math::{Matrix2D, Vec2};
use crate::scene::Sprite;
use crate::texture::Frame;

/// Where a sprite's cut rectangle sits in the node's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SpriteGeometry {
    /// Top-left of the cut rect (the trim offset).
    pub offset: Vec2,
    /// Size of the cut rect, unrotated.
    pub size: Vec2,
    /// The untrimmed source size the sprite occupies.
    pub source: Vec2,
}

impl SpriteGeometry {
    pub fn of(frame: &Frame) -> Self {
        let (ox, oy) = frame.draw_offset();
        let (sw, sh) = frame.source_size();
        Self {
            offset: Vec2::new(ox, oy),
            size: Vec2::new(frame.width() as f32, frame.height() as f32),
            source: Vec2::new(sw as f32, sh as f32),
        }
    }

    /// The cut rect's corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vec2; 4] {
        let min = self.offset;
        let max = self.offset + self.size;
        [
            min,
            Vec2::new(max.x, min.y),
            max,
            Vec2::new(min.x, max.y),
        ]
    }
}

/// Mirror within the source box for flipped sprites; identity otherwise.
pub(crate) fn flip_matrix(sprite: &Sprite, source: Vec2) -> Matrix2D {
    if !sprite.flip_x && !sprite.flip_y {
        return Matrix2D::IDENTITY;
    }
    let (sx, tx) = if sprite.flip_x { (-1.0, source.x) } else { (1.0, 0.0) };
    let (sy, ty) = if sprite.flip_y { (-1.0, source.y) } else { (1.0, 0.0) };
    Matrix2D::new(sx, 0.0, 0.0, sy, tx, ty)
}

/// Axis-aligned bounds of a set of points.
pub(crate) fn bounds(points: &[Vec2]) -> ([f32; 2], [f32; 2]) {
    let mut min = [f32::MAX; 2];
    let mut max = [f32::MIN; 2];
    for p in points {
        min = [min[0].min(p.x), min[1].min(p.y)];
        max = [max[0].max(p.x), max[1].max(p.y)];
    }
    (min, max)
}

/// Floor two opposite corners and express the result as `[x, y, w, h]`.
pub(crate) fn floor_rect(top_left: Vec2, bottom_right: Vec2) -> [f32; 4] {
    let (x0, y0) = (top_left.x.floor(), top_left.y.floor());
    let (x1, y1) = (bottom_right.x.floor(), bottom_right.y.floor());
    [x0, y0, x1 - x0, y1 - y0]
}
