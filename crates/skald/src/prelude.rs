//! Convenience re-exports: `use skald::prelude::*` for the common items.

pub use crate::animation::{AnimationClip, AnimationError};
pub use crate::config::{ConfigError, RendererConfig};
pub use crate::diag::init_logger;
pub use crate::math::{Mat4, Matrix2D, Vec2};
pub use crate::render::{
    BlendMode, Camera, Canvas2d, CanvasBlitter, FrameStats, GraphicsBackend, ImageCanvas,
    PassHook, RecordingBackend, RecordingCanvas, RenderEvent, RenderPass, RenderTarget, ShaderId,
};
#[cfg(feature = "gpu")]
pub use crate::render::WgpuBackend;
pub use crate::scene::{Color, Node, NodeId, Sprite, Stage};
pub use crate::texture::{
    FrameDescriptor, FrameKey, GridLayout, TextureError, TextureRegistry, TextureSource,
};
pub use crate::transform::TransformNode;
