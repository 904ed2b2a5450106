//! # Skald — 2D Display Hierarchy and Batched Sprite Rendering
//!
//! A scene of nested, transformable nodes drawn as textured quads, either
//! batched through a [`GraphicsBackend`](render::GraphicsBackend) or blitted
//! one sprite at a time through a [`Canvas2d`](render::Canvas2d).
//!
//! ```text
//! TextureRegistry ── frames, UVs ──┐
//!                                  ▼
//! Stage (nodes, depth, transforms) ──► RenderPass ──► GraphicsBackend
//!                                  └─► CanvasBlitter ──► Canvas2d
//! ```
//!
//! Start with `use skald::prelude::*`, register textures, add nodes to a
//! [`Stage`](scene::Stage), and call `render_frame` once per tick.

pub mod animation;
pub mod config;
pub mod diag;
pub mod math;
pub mod prelude;
pub mod render;
pub mod scene;
pub mod texture;
pub mod transform;
