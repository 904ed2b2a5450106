//! Per-frame counters from either render path.

use serde::Serialize;

use crate::texture::{FrameKey, MissingResource};

/// Why a batch was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushReason {
    BufferFull,
    TextureUnits,
    BlendMode,
    Shader,
    /// The render target changed mid-frame.
    RenderTarget,
    EndOfFrame,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushCounts {
    pub buffer_full: u32,
    pub texture_units: u32,
    pub blend_mode: u32,
    pub shader: u32,
    pub render_target: u32,
    pub end_of_frame: u32,
}

impl FlushCounts {
    pub fn record(&mut self, reason: FlushReason) {
        match reason {
            FlushReason::BufferFull => self.buffer_full += 1,
            FlushReason::TextureUnits => self.texture_units += 1,
            FlushReason::BlendMode => self.blend_mode += 1,
            FlushReason::Shader => self.shader += 1,
            FlushReason::RenderTarget => self.render_target += 1,
            FlushReason::EndOfFrame => self.end_of_frame += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.buffer_full
            + self.texture_units
            + self.blend_mode
            + self.shader
            + self.render_target
            + self.end_of_frame
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Non-empty flushes (one draw call each). Canvas: `draw_image` calls.
    pub draw_calls: u32,
    pub quads: u32,
    /// Skipped because they fell outside the viewport.
    pub culled: u32,
    /// Drawn with the placeholder because the texture or frame was missing.
    pub placeholders: u32,
    pub texture_uploads: u32,
    pub upload_failures: u32,
    /// State binds actually issued (redundant ones are not counted).
    pub state_binds: u32,
    /// Sprites drawn through `save/set_transform/restore` on the canvas path.
    pub transformed_draws: u32,
    /// World matrices recomputed by the transform update.
    pub transforms_updated: u32,
    pub flushes: FlushCounts,
    /// The context was lost and the frame was left blank.
    pub context_lost: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<RenderEvent>,
}

/// Something a host or tool may want to know about beyond the counters.
/// Each is reported once, on the frame it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
    ContextLost,
    ContextRestored,
    /// First failure for this texture; later retries are only counted.
    UploadFailed { texture: String, error: String },
    MissingTexture { key: String },
    MissingFrame { key: String, frame: FrameKey },
    /// The GPU copy of a removed texture was freed.
    TextureReleased { texture: u32 },
}

impl RenderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderEvent::ContextLost => "context_lost",
            RenderEvent::ContextRestored => "context_restored",
            RenderEvent::UploadFailed { .. } => "upload_failed",
            RenderEvent::MissingTexture { .. } => "missing_texture",
            RenderEvent::MissingFrame { .. } => "missing_frame",
            RenderEvent::TextureReleased { .. } => "texture_released",
        }
    }
}

impl From<MissingResource> for RenderEvent {
    fn from(missing: MissingResource) -> Self {
        match missing {
            MissingResource::Texture(key) => RenderEvent::MissingTexture { key },
            MissingResource::Frame { key, frame } => RenderEvent::MissingFrame { key, frame },
        }
    }
}
