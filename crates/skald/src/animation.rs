//! # Animation Clips — Validated Frame Sequences
//!
//! An [`AnimationClip`] is a list of frames on one texture plus a frame rate.
//! Playback itself (timers, events, chaining clips) belongs to whoever
//! drives the game loop; this module only guarantees that a clip, once
//! built, refers to frames that exist.
//!
//! Validation happens when the clip is constructed. A clip that names a
//! frame the atlas doesn't have is rejected right there with an
//! [`AnimationError`], and nothing else in the renderer is affected.
//!
//! ```text
//! AnimationClip::new(&registry, "hero", ["walk_01", "walk_02", 7], 12.0, true)
//!                                          │          │        │
//!                      looked up by name ──┴──────────┘        └── by index
//! ```

use std::fmt;

use crate::texture::{FrameKey, TextureRegistry};

/// Why a clip could not be built.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationError {
    UnknownTexture(String),
    /// Index past the texture's frame list.
    FrameOutOfRange { index: usize, frame_count: usize },
    UnknownFrame(String),
    EmptyFrames,
    /// Frame rate must be finite and positive.
    InvalidFrameRate(f32),
}

impl fmt::Display for AnimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimationError::UnknownTexture(key) => write!(f, "animation texture '{key}' is not registered"),
            AnimationError::FrameOutOfRange { index, frame_count } => {
                write!(f, "animation frame #{index} is out of range (texture has {frame_count} frames)")
            }
            AnimationError::UnknownFrame(name) => write!(f, "animation frame '{name}' does not exist"),
            AnimationError::EmptyFrames => write!(f, "animation has no frames"),
            AnimationError::InvalidFrameRate(rate) => write!(f, "animation frame rate {rate} must be positive"),
        }
    }
}

impl std::error::Error for AnimationError {}

/// A checked sequence of frames on a single texture.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    texture: String,
    frames: Vec<FrameKey>,
    frame_rate: f32,
    looping: bool,
}

impl AnimationClip {
    /// Build a clip, checking every frame against the registry.
    pub fn new<F>(
        registry: &TextureRegistry,
        texture: &str,
        frames: impl IntoIterator<Item = F>,
        frame_rate: f32,
        looping: bool,
    ) -> Result<Self, AnimationError>
    where
        F: Into<FrameKey>,
    {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(AnimationError::InvalidFrameRate(frame_rate));
        }
        let atlas = registry
            .texture(texture)
            .ok_or_else(|| AnimationError::UnknownTexture(texture.to_string()))?;

        let frames: Vec<FrameKey> = frames.into_iter().map(Into::into).collect();
        if frames.is_empty() {
            return Err(AnimationError::EmptyFrames);
        }
        for key in &frames {
            if atlas.frame(key).is_some() {
                continue;
            }
            return Err(match key {
                FrameKey::Index(index) => AnimationError::FrameOutOfRange {
                    index: *index,
                    frame_count: atlas.frames().len(),
                },
                other => AnimationError::UnknownFrame(other.to_string()),
            });
        }

        Ok(Self {
            texture: texture.to_string(),
            frames,
            frame_rate,
            looping,
        })
    }

    /// Every cut frame of a texture in order, as a sprite sheet would play.
    pub fn all_frames(
        registry: &TextureRegistry,
        texture: &str,
        frame_rate: f32,
        looping: bool,
    ) -> Result<Self, AnimationError> {
        let count = registry
            .frame_count(texture)
            .ok_or_else(|| AnimationError::UnknownTexture(texture.to_string()))?;
        Self::new(registry, texture, 0..count, frame_rate, looping)
    }

    pub fn texture(&self) -> &str {
        &self.texture
    }

    pub fn frames(&self) -> &[FrameKey] {
        &self.frames
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Total duration of one pass through the clip, in seconds.
    pub fn duration(&self) -> f32 {
        self.frames.len() as f32 / self.frame_rate
    }

    /// The frame showing `elapsed` seconds after the clip started. A
    /// non-looping clip holds its last frame.
    pub fn frame_at(&self, elapsed: f32) -> &FrameKey {
        let step = (elapsed.max(0.0) * self.frame_rate) as usize;
        let last = self.frames.len() - 1;
        let index = if self.looping {
            step % self.frames.len()
        } else {
            step.min(last)
        };
        &self.frames[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{FrameDescriptor, TextureSource};

    fn registry() -> TextureRegistry {
        let mut registry = TextureRegistry::new();
        registry
            .add_atlas(
                "hero",
                TextureSource::sized(64, 16),
                &[
                    FrameDescriptor::new("walk_01", 0, 0, 16, 16),
                    FrameDescriptor::new("walk_02", 16, 0, 16, 16),
                    FrameDescriptor::new("walk_03", 32, 0, 16, 16),
                ],
            )
            .unwrap();
        registry
    }

    #[test]
    fn builds_from_names_and_indices() {
        let registry = registry();
        let clip = AnimationClip::new(&registry, "hero", ["walk_01", "walk_03"], 10.0, true).unwrap();
        assert_eq!(clip.frames().len(), 2);
        let by_index = AnimationClip::new(&registry, "hero", [0usize, 2], 10.0, true).unwrap();
        assert_eq!(by_index.frames()[1], FrameKey::Index(2));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let registry = registry();
        let err = AnimationClip::new(&registry, "hero", [0usize, 3], 10.0, false).unwrap_err();
        assert_eq!(
            err,
            AnimationError::FrameOutOfRange {
                index: 3,
                frame_count: 3
            }
        );
        // Nothing about the registry changed.
        assert_eq!(registry.missing_reports(), 0);
    }

    #[test]
    fn rejects_bad_input() {
        let registry = registry();
        assert_eq!(
            AnimationClip::new(&registry, "hero", ["run"], 10.0, false).unwrap_err(),
            AnimationError::UnknownFrame("run".into())
        );
        assert_eq!(
            AnimationClip::new(&registry, "ghost", ["walk_01"], 10.0, false).unwrap_err(),
            AnimationError::UnknownTexture("ghost".into())
        );
        assert_eq!(
            AnimationClip::new(&registry, "hero", Vec::<usize>::new(), 10.0, false).unwrap_err(),
            AnimationError::EmptyFrames
        );
        assert!(matches!(
            AnimationClip::new(&registry, "hero", [0usize], 0.0, false),
            Err(AnimationError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn frame_at_loops_or_holds() {
        let registry = registry();
        let looping = AnimationClip::all_frames(&registry, "hero", 10.0, true).unwrap();
        assert_eq!(looping.frame_at(0.05), &FrameKey::Index(0));
        assert_eq!(looping.frame_at(0.25), &FrameKey::Index(2));
        assert_eq!(looping.frame_at(0.35), &FrameKey::Index(0));

        let once = AnimationClip::all_frames(&registry, "hero", 10.0, false).unwrap();
        assert_eq!(once.frame_at(5.0), &FrameKey::Index(2));
        assert!((once.duration() - 0.3).abs() < 1e-6);
    }
}
