//! # Graphics Backend — What the Batched Pass Talks To
//!
//! [`RenderPass`](super::RenderPass) never touches a graphics API directly.
//! It drives a [`GraphicsBackend`], a small trait covering exactly the calls
//! a sprite batcher needs: bind state, upload and bind textures, and draw a
//! run of quads.
//!
//! Two implementations ship with the crate:
//!
//! - [`RecordingBackend`]: keeps every call as a [`GpuCommand`]. Headless
//!   tests and tools inspect the command list instead of pixels.
//! - `WgpuBackend` (cargo feature `gpu`): the real thing, on wgpu.
//!
//! ## Context Loss
//!
//! A backend reports a lost context through
//! [`is_context_lost`](GraphicsBackend::is_context_lost). While lost, the
//! pass draws nothing; once the backend recovers, the pass forgets every
//! cached binding and marks every texture for re-upload.

use std::fmt;

use crate::math::Mat4;
use crate::texture::{Texture, TextureId};

use super::state::{BlendMode, RenderTarget, ShaderId, VertexBufferId, Viewport};
use super::vertex::SpriteVertex;

/// A texture upload the backend could not perform.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The texture has no CPU-side pixels to upload.
    NoPixels(String),
    TooLarge { key: String, width: u32, height: u32, max: u32 },
    ContextLost,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NoPixels(key) => write!(f, "texture '{key}' has no pixel data to upload"),
            BackendError::TooLarge { key, width, height, max } => {
                write!(f, "texture '{key}' ({width}x{height}) exceeds the maximum size {max}")
            }
            BackendError::ContextLost => write!(f, "graphics context is lost"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The graphics API surface used by the batched renderer.
pub trait GraphicsBackend {
    fn bind_blend_mode(&mut self, mode: BlendMode);
    fn bind_shader(&mut self, shader: ShaderId);
    fn bind_render_target(&mut self, target: RenderTarget);
    fn set_viewport(&mut self, viewport: Viewport);

    /// Bind the vertex buffer that subsequent draws read from.
    fn bind_vertex_buffer(&mut self, buffer: VertexBufferId);

    /// Drop any element-array binding so it can't leak into the next draw.
    fn unbind_index_buffer(&mut self);

    /// Copy a texture's pixels to the GPU (first use or after it changed).
    fn upload_texture(&mut self, texture: &Texture) -> Result<(), BackendError>;

    /// Free the GPU copy of a texture that was removed from the registry.
    /// Unknown ids are ignored.
    fn release_texture(&mut self, texture: TextureId);

    /// Make `texture` available to the shader as `unit`.
    fn bind_texture(&mut self, unit: u32, texture: TextureId);

    fn set_view_projection(&mut self, view_proj: Mat4);

    /// Draw `quads` quads from the start of `vertices`.
    fn draw_quads(&mut self, vertices: &[SpriteVertex], quads: usize);

    fn is_context_lost(&self) -> bool;

    /// How many textures one draw can sample from.
    fn max_texture_units(&self) -> u32;
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BindBlendMode(BlendMode),
    BindShader(ShaderId),
    BindRenderTarget(RenderTarget),
    SetViewport(Viewport),
    BindVertexBuffer(VertexBufferId),
    UnbindIndexBuffer,
    UploadTexture(TextureId),
    ReleaseTexture(TextureId),
    BindTexture { unit: u32, texture: TextureId },
    SetViewProjection(Mat4),
    DrawQuads { quads: usize, vertices: Vec<SpriteVertex> },
}

/// A backend that records calls instead of drawing.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    pub commands: Vec<GpuCommand>,
    pub texture_units: u32,
    pub context_lost: bool,
    /// Uploads of these keys fail, for exercising the error path.
    pub failing_uploads: Vec<String>,
}

impl RecordingBackend {
    pub fn new(texture_units: u32) -> Self {
        Self {
            commands: Vec::new(),
            texture_units,
            context_lost: false,
            failing_uploads: Vec::new(),
        }
    }

    /// Every `DrawQuads` command, in order.
    pub fn draws(&self) -> impl Iterator<Item = (usize, &[SpriteVertex])> {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::DrawQuads { quads, vertices } => Some((*quads, vertices.as_slice())),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    pub fn uploads(&self) -> Vec<TextureId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::UploadTexture(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(16)
    }
}

impl GraphicsBackend for RecordingBackend {
    fn bind_blend_mode(&mut self, mode: BlendMode) {
        self.commands.push(GpuCommand::BindBlendMode(mode));
    }

    fn bind_shader(&mut self, shader: ShaderId) {
        self.commands.push(GpuCommand::BindShader(shader));
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.commands.push(GpuCommand::BindRenderTarget(target));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(GpuCommand::SetViewport(viewport));
    }

    fn bind_vertex_buffer(&mut self, buffer: VertexBufferId) {
        self.commands.push(GpuCommand::BindVertexBuffer(buffer));
    }

    fn unbind_index_buffer(&mut self) {
        self.commands.push(GpuCommand::UnbindIndexBuffer);
    }

    fn upload_texture(&mut self, texture: &Texture) -> Result<(), BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if self.failing_uploads.iter().any(|k| k == texture.key()) {
            return Err(BackendError::NoPixels(texture.key().to_string()));
        }
        self.commands.push(GpuCommand::UploadTexture(texture.id()));
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.commands.push(GpuCommand::ReleaseTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.commands.push(GpuCommand::BindTexture { unit, texture });
    }

    fn set_view_projection(&mut self, view_proj: Mat4) {
        self.commands.push(GpuCommand::SetViewProjection(view_proj));
    }

    fn draw_quads(&mut self, vertices: &[SpriteVertex], quads: usize) {
        self.commands.push(GpuCommand::DrawQuads {
            quads,
            vertices: vertices.to_vec(),
        });
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn max_texture_units(&self) -> u32 {
        self.texture_units
    }
}
