//! # Frames — Sub-Rectangles of a Texture
//!
//! A [`Frame`] is a rectangle in a texture's pixel space plus the UVs that
//! the batched renderer writes into vertices. Atlas packers add two twists:
//!
//! ```text
//!   source size (sprite_source_w × sprite_source_h)
//!   ┌───────────────────────┐
//!   │   trim offset (x, y)  │
//!   │   ┌────────────┐      │     transparent padding was cut away;
//!   │   │ cut rect   │      │     the cut rect is what lives in the atlas
//!   │   │ (w × h)    │      │
//!   │   └────────────┘      │
//!   └───────────────────────┘
//! ```
//!
//! - **Trim**: the packer stripped transparent padding. The sprite still
//!   *occupies* the full source size; the cut rect is drawn at the trim
//!   offset inside it.
//! - **Rotation in atlas**: the packer stored the cut rect rotated 90°
//!   clockwise to pack tighter. The atlas region is then `h × w`, and the
//!   UV corners are rotated so the quad still comes out upright.
//!
//! UVs depend on the rect and on the texture's pixel size. They are cached
//! and rebuilt only when one of those actually changes.

use std::fmt;

use serde::Serialize;

use super::atlas::AtlasError;
use super::registry::TextureId;

/// How a sprite names the frame it wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FrameKey {
    /// The whole texture.
    Base,
    Name(String),
    Index(usize),
}

impl From<&str> for FrameKey {
    fn from(name: &str) -> Self {
        FrameKey::Name(name.to_string())
    }
}

impl From<String> for FrameKey {
    fn from(name: String) -> Self {
        FrameKey::Name(name)
    }
}

impl From<usize> for FrameKey {
    fn from(index: usize) -> Self {
        FrameKey::Index(index)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKey::Base => write!(f, "__BASE"),
            FrameKey::Name(name) => write!(f, "{name}"),
            FrameKey::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Transparent padding stripped by an atlas packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trim {
    /// Offset of the cut rect inside the original sprite.
    pub x: u32,
    pub y: u32,
    /// Size of the original, untrimmed sprite.
    pub source_width: u32,
    pub source_height: u32,
}

/// Texture coordinates of a frame's four corners, in quad order
/// top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUvs {
    pub corners: [[f32; 2]; 4],
}

impl FrameUvs {
    /// Smallest and largest `(u, v)` over all four corners.
    pub fn bounds(&self) -> ([f32; 2], [f32; 2]) {
        let mut min = [f32::MAX; 2];
        let mut max = [f32::MIN; 2];
        for [u, v] in self.corners {
            min = [min[0].min(u), min[1].min(v)];
            max = [max[0].max(u), max[1].max(v)];
        }
        (min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UvInputs {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    rotated: bool,
    texture_width: u32,
    texture_height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    name: String,
    texture: TextureId,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    trim: Option<Trim>,
    rotated: bool,
    texture_width: u32,
    texture_height: u32,
    uvs: FrameUvs,
    uv_inputs: UvInputs,
    uv_generation: u32,
}

impl Frame {
    /// A frame cutting `width × height` pixels at `(x, y)` out of a texture
    /// that is `texture_width × texture_height` pixels.
    pub fn new(
        name: impl Into<String>,
        texture: TextureId,
        (x, y, width, height): (u32, u32, u32, u32),
        (texture_width, texture_height): (u32, u32),
    ) -> Self {
        let uv_inputs = UvInputs {
            x,
            y,
            width,
            height,
            rotated: false,
            texture_width,
            texture_height,
        };
        Self {
            name: name.into(),
            texture,
            x,
            y,
            width,
            height,
            trim: None,
            rotated: false,
            texture_width,
            texture_height,
            uvs: compute_uvs(&uv_inputs),
            uv_inputs,
            uv_generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Width of the cut rect as the sprite sees it (unrotated).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn trim(&self) -> Option<Trim> {
        self.trim
    }

    pub fn is_rotated(&self) -> bool {
        self.rotated
    }

    /// The size the sprite occupies on screen: the untrimmed source size if
    /// the frame was trimmed, otherwise the cut rect.
    pub fn source_size(&self) -> (u32, u32) {
        match self.trim {
            Some(trim) => (trim.source_width, trim.source_height),
            None => (self.width, self.height),
        }
    }

    /// Where the cut rect is drawn inside the source-size box.
    pub fn draw_offset(&self) -> (f32, f32) {
        match self.trim {
            Some(trim) => (trim.x as f32, trim.y as f32),
            None => (0.0, 0.0),
        }
    }

    /// The rectangle this frame occupies in the atlas image, in pixels. For
    /// rotated frames the width and height are swapped.
    pub fn region(&self) -> (u32, u32, u32, u32) {
        if self.rotated {
            (self.x, self.y, self.height, self.width)
        } else {
            (self.x, self.y, self.width, self.height)
        }
    }

    pub fn uvs(&self) -> &FrameUvs {
        &self.uvs
    }

    /// Bumped every time the UVs are actually recomputed.
    pub fn uv_generation(&self) -> u32 {
        self.uv_generation
    }

    /// Move or resize the cut rect.
    pub fn set_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self.refresh_uvs();
    }

    /// The owning texture's pixel size changed (its source was replaced).
    pub fn set_texture_size(&mut self, width: u32, height: u32) {
        self.texture_width = width;
        self.texture_height = height;
        self.refresh_uvs();
    }

    pub fn set_rotated(&mut self, rotated: bool) {
        self.rotated = rotated;
        self.refresh_uvs();
    }

    /// Declare the frame trimmed. The source size must be at least the cut
    /// size in both dimensions, and the cut rect must fit inside it at the
    /// given offset.
    pub fn set_trim(&mut self, trim: Trim) -> Result<(), AtlasError> {
        let fits = trim.source_width >= self.width
            && trim.source_height >= self.height
            && trim.x.saturating_add(self.width) <= trim.source_width
            && trim.y.saturating_add(self.height) <= trim.source_height;
        if !fits {
            return Err(AtlasError::InvalidTrim {
                frame: self.name.clone(),
                source: (trim.source_width, trim.source_height),
                cut: (self.width, self.height),
            });
        }
        self.trim = Some(trim);
        Ok(())
    }

    pub fn clear_trim(&mut self) {
        self.trim = None;
    }

    pub(crate) fn attach(&mut self, texture: TextureId) {
        self.texture = texture;
    }

    fn refresh_uvs(&mut self) {
        let inputs = UvInputs {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotated: self.rotated,
            texture_width: self.texture_width,
            texture_height: self.texture_height,
        };
        if inputs == self.uv_inputs {
            return;
        }
        self.uvs = compute_uvs(&inputs);
        self.uv_inputs = inputs;
        self.uv_generation += 1;
    }
}

fn compute_uvs(inputs: &UvInputs) -> FrameUvs {
    let tw = inputs.texture_width.max(1) as f32;
    let th = inputs.texture_height.max(1) as f32;
    let (region_w, region_h) = if inputs.rotated {
        (inputs.height, inputs.width)
    } else {
        (inputs.width, inputs.height)
    };

    let u0 = inputs.x as f32 / tw;
    let v0 = inputs.y as f32 / th;
    let u1 = (u64::from(inputs.x) + u64::from(region_w)) as f32 / tw;
    let v1 = (u64::from(inputs.y) + u64::from(region_h)) as f32 / th;

    let corners = if inputs.rotated {
        // Stored 90° clockwise: the sprite's top edge runs down the
        // region's right edge.
        [[u1, v0], [u1, v1], [u0, v1], [u0, v0]]
    } else {
        [[u0, v0], [u1, v0], [u1, v1], [u0, v1]]
    };
    FrameUvs { corners }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rect: (u32, u32, u32, u32)) -> Frame {
        Frame::new("f", TextureId(1), rect, (256, 128))
    }

    #[test]
    fn uvs_divide_by_texture_size() {
        let f = frame((64, 32, 32, 32));
        assert_eq!(
            f.uvs().corners,
            [[0.25, 0.25], [0.375, 0.25], [0.375, 0.5], [0.25, 0.5]]
        );
    }

    #[test]
    fn uvs_recomputed_only_on_change() {
        let mut f = frame((0, 0, 16, 16));
        assert_eq!(f.uv_generation(), 0);

        f.set_rect(0, 0, 16, 16);
        f.set_texture_size(256, 128);
        assert_eq!(f.uv_generation(), 0);

        f.set_texture_size(512, 128);
        assert_eq!(f.uv_generation(), 1);
        assert_eq!(f.uvs().corners[1], [16.0 / 512.0, 0.0]);

        f.set_rect(16, 0, 16, 16);
        assert_eq!(f.uv_generation(), 2);
    }

    #[test]
    fn rotated_frame_swaps_region_and_turns_corners() {
        let mut f = frame((0, 0, 32, 64));
        f.set_rotated(true);
        assert_eq!(f.region(), (0, 0, 64, 32));
        // Region spans u in [0, 0.25], v in [0, 0.25].
        assert_eq!(
            f.uvs().corners,
            [[0.25, 0.0], [0.25, 0.25], [0.0, 0.25], [0.0, 0.0]]
        );
        assert_eq!(f.width(), 32);
    }

    #[test]
    fn trim_source_must_cover_cut() {
        let mut f = frame((0, 0, 20, 20));
        let ok = Trim {
            x: 2,
            y: 4,
            source_width: 24,
            source_height: 30,
        };
        assert!(f.set_trim(ok).is_ok());
        assert_eq!(f.source_size(), (24, 30));
        assert_eq!(f.draw_offset(), (2.0, 4.0));

        let too_small = Trim {
            x: 0,
            y: 0,
            source_width: 10,
            source_height: 30,
        };
        assert!(matches!(
            f.set_trim(too_small),
            Err(AtlasError::InvalidTrim { .. })
        ));
        // Rejected trim leaves the previous one in place.
        assert_eq!(f.trim(), Some(ok));
    }

    #[test]
    fn uvs_of_a_rect_at_the_coordinate_limit() {
        let f = Frame::new("edge", TextureId(1), (u32::MAX - 1, 0, 10, 4), (256, 128));
        let [_, [u1, _], _, _] = f.uvs().corners;
        assert!(u1.is_finite());
        assert!(u1 > 1.0);
    }

    #[test]
    fn frame_key_conversions() {
        assert_eq!(FrameKey::from("idle"), FrameKey::Name("idle".into()));
        assert_eq!(FrameKey::from(2usize), FrameKey::Index(2));
        assert_eq!(FrameKey::Index(2).to_string(), "#2");
    }
}
