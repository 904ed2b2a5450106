//! Nodes and the sprite component they can carry.
//!
//! A [`Node`] is composition, not inheritance: it owns a
//! [`TransformNode`], an ordered child list, a little display state (depth,
//! alpha, visibility), and optionally a [`Sprite`]. A node without a sprite
//! is a plain container.

use crate::render::state::{BlendMode, ShaderId};
use crate::texture::FrameKey;
use crate::transform::TransformNode;

use super::display_list::DisplayList;
use super::handle::NodeId;

/// An RGBA color with floating-point components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const RED: Self = Self { r: 1.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const GREEN: Self = Self { r: 0.0, g: 1.0, b: 0.0, a: 1.0 };
    pub const BLUE: Self = Self { r: 0.0, g: 0.0, b: 1.0, a: 1.0 };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// From a `0xRRGGBB` integer, alpha 1.
    pub fn from_hex(rgb: u32) -> Self {
        Self::rgb(
            ((rgb >> 16) & 0xff) as f32 / 255.0,
            ((rgb >> 8) & 0xff) as f32 / 255.0,
            (rgb & 0xff) as f32 / 255.0,
        )
    }

    /// Pack into `0xAABBGGRR`, which is `[r, g, b, a]` bytes in memory on a
    /// little-endian machine (the layout an `unorm8x4` vertex attribute reads).
    /// `alpha` multiplies the color's own alpha.
    pub fn pack(self, alpha: f32) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
        let a = channel(self.a * alpha);
        (a << 24) | (channel(self.b) << 16) | (channel(self.g) << 8) | channel(self.r)
    }

    pub(crate) fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A textured quad: which frame of which texture to draw, and how.
///
/// The quad's local size is the frame's source size; position it with the
/// owning node's transform (pivot `(0, 0)` is the top-left corner).
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub texture: String,
    pub frame: FrameKey,
    /// Tint multiplied with the texture sample.
    pub tint: Color,
    pub blend_mode: BlendMode,
    /// Custom shader; `None` draws with the default sprite shader.
    pub shader: Option<ShaderId>,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Sprite {
    /// A sprite drawing the whole of `texture`.
    pub fn new(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            frame: FrameKey::Base,
            tint: Color::WHITE,
            blend_mode: BlendMode::Normal,
            shader: None,
            flip_x: false,
            flip_y: false,
        }
    }

    /// Set the frame (builder pattern).
    pub fn frame(mut self, frame: impl Into<FrameKey>) -> Self {
        self.frame = frame.into();
        self
    }

    pub fn tint(mut self, tint: Color) -> Self {
        self.tint = tint;
        self
    }

    pub fn blend(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn shader(mut self, shader: ShaderId) -> Self {
        self.shader = Some(shader);
        self
    }

    /// Switch texture. The frame resets to the whole texture.
    pub fn set_texture(&mut self, key: impl Into<String>) -> &mut Self {
        self.texture = key.into();
        self.frame = FrameKey::Base;
        self
    }

    pub fn set_frame(&mut self, frame: impl Into<FrameKey>) -> &mut Self {
        self.frame = frame.into();
        self
    }

    pub fn set_flip(&mut self, flip_x: bool, flip_y: bool) -> &mut Self {
        self.flip_x = flip_x;
        self.flip_y = flip_y;
        self
    }
}

/// One entry in the [`Stage`](super::Stage).
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) transform: TransformNode,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: DisplayList,
    pub(crate) depth: f32,
    pub visible: bool,
    /// Multiplied down the tree.
    pub alpha: f32,
    pub sprite: Option<Sprite>,
    pub(crate) world_alpha: f32,
    pub(crate) world_visible: bool,
}

impl Node {
    /// A container node with no sprite.
    pub fn new() -> Self {
        Self {
            transform: TransformNode::new(),
            parent: None,
            children: DisplayList::new(),
            depth: 0.0,
            visible: true,
            alpha: 1.0,
            sprite: None,
            world_alpha: 1.0,
            world_visible: true,
        }
    }

    pub fn with_sprite(sprite: Sprite) -> Self {
        Self {
            sprite: Some(sprite),
            ..Self::new()
        }
    }

    /// Set the initial position (builder pattern).
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.transform.set_position(x, y);
        self
    }

    /// Set the initial depth (builder pattern). Later depth changes go through
    /// [`Stage::set_depth`](super::Stage::set_depth) so the sort gets queued.
    pub fn depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn transform(&self) -> &TransformNode {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut TransformNode {
        &mut self.transform
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &DisplayList {
        &self.children
    }

    pub fn get_depth(&self) -> f32 {
        self.depth
    }

    /// Alpha after multiplying every ancestor's, as of the last
    /// [`Stage::update_transforms`](super::Stage::update_transforms).
    pub fn world_alpha(&self) -> f32 {
        self.world_alpha
    }

    pub fn world_visible(&self) -> bool {
        self.world_visible
    }

    pub fn set_position(&mut self, x: f32, y: f32) -> &mut Self {
        self.transform.set_position(x, y);
        self
    }

    pub fn set_scale(&mut self, x: f32, y: f32) -> &mut Self {
        self.transform.set_scale(x, y);
        self
    }

    pub fn set_rotation(&mut self, radians: f32) -> &mut Self {
        self.transform.set_rotation(radians);
        self
    }

    pub fn set_pivot(&mut self, x: f32, y: f32) -> &mut Self {
        self.transform.set_pivot(x, y);
        self
    }

    pub fn set_skew(&mut self, x: f32, y: f32) -> &mut Self {
        self.transform.set_skew(x, y);
        self
    }

    pub fn set_alpha(&mut self, alpha: f32) -> &mut Self {
        self.alpha = alpha;
        self
    }

    pub fn set_visible(&mut self, visible: bool) -> &mut Self {
        self.visible = visible;
        self
    }

    /// Switch the sprite's texture. No-op on containers.
    pub fn set_texture(&mut self, key: impl Into<String>) -> &mut Self {
        if let Some(sprite) = &mut self.sprite {
            sprite.set_texture(key);
        }
        self
    }

    /// Switch the sprite's frame. No-op on containers.
    pub fn set_frame(&mut self, frame: impl Into<FrameKey>) -> &mut Self {
        if let Some(sprite) = &mut self.sprite {
            sprite.set_frame(frame);
        }
        self
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
