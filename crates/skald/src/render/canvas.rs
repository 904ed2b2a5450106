//! # Canvas Fallback — One `draw_image` per Sprite
//!
//! When no GPU is available, [`CanvasBlitter`] draws the stage through a
//! [`Canvas2d`], the small slice of a 2D-canvas API a sprite blitter needs.
//! There is no batching: every visible sprite is one `draw_image` call.
//!
//! ```text
//! per sprite
//!   alpha changed?      → set_global_alpha
//!   blend changed?      → set_composite_operation
//!   axis-aligned and not rotated in the atlas?
//!     yes → draw_image(frame rect, floored dst rect)       fast path
//!     no  → save, set_transform(full), draw_image(frame rect, local rect), restore
//! ```
//!
//! The fast path floors the destination corner by corner, exactly like the
//! batched path floors axis-aligned quads, so a sprite lands on the same
//! pixels whichever path draws it.
//!
//! Two canvases ship with the crate: [`RecordingCanvas`] records calls for
//! tests, and [`ImageCanvas`] rasterizes into an [`RgbaImage`] so headless
//! tools can write real pictures.

use image::{Rgba, RgbaImage};

use crate::config::{ConfigError, RendererConfig};
use crate::math::{Matrix2D, Vec2};
use crate::scene::Stage;
use crate::texture::{Frame, Texture, TextureId, TextureRegistry};

use super::camera::Camera;
use super::hooks::{HookSet, PassHook};
use super::state::BlendMode;
use super::stats::{FrameStats, RenderEvent};
use super::{SpriteGeometry, bounds, flip_matrix, floor_rect};

/// The 2D drawing calls the blitter issues.
pub trait Canvas2d {
    /// Push transform, global alpha and composite operation.
    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, matrix: &Matrix2D);
    fn set_global_alpha(&mut self, alpha: f32);
    fn set_composite_operation(&mut self, mode: BlendMode);
    /// Draw the `src` rect (`[x, y, w, h]`, texture pixels) of `texture`
    /// into `dst` (`[x, y, w, h]`, under the current transform).
    fn draw_image(&mut self, texture: &Texture, src: [f32; 4], dst: [f32; 4]);
    /// Fill the whole canvas, ignoring transform, alpha and composite.
    fn clear(&mut self, color: [f32; 4]);
}

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    Save,
    Restore,
    SetTransform(Matrix2D),
    SetGlobalAlpha(f32),
    SetCompositeOperation(BlendMode),
    DrawImage {
        texture: TextureId,
        src: [f32; 4],
        dst: [f32; 4],
    },
    Clear([f32; 4]),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    pub commands: Vec<CanvasCommand>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(src, dst)` of every `DrawImage`, in order.
    pub fn draws(&self) -> impl Iterator<Item = ([f32; 4], [f32; 4])> + '_ {
        self.commands.iter().filter_map(|c| match c {
            CanvasCommand::DrawImage { src, dst, .. } => Some((*src, *dst)),
            _ => None,
        })
    }
}

impl Canvas2d for RecordingCanvas {
    fn save(&mut self) {
        self.commands.push(CanvasCommand::Save);
    }

    fn restore(&mut self) {
        self.commands.push(CanvasCommand::Restore);
    }

    fn set_transform(&mut self, matrix: &Matrix2D) {
        self.commands.push(CanvasCommand::SetTransform(*matrix));
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.commands.push(CanvasCommand::SetGlobalAlpha(alpha));
    }

    fn set_composite_operation(&mut self, mode: BlendMode) {
        self.commands.push(CanvasCommand::SetCompositeOperation(mode));
    }

    fn draw_image(&mut self, texture: &Texture, src: [f32; 4], dst: [f32; 4]) {
        self.commands.push(CanvasCommand::DrawImage {
            texture: texture.id(),
            src,
            dst,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(CanvasCommand::Clear(color));
    }
}

#[derive(Debug, Clone, Copy)]
struct CanvasState {
    transform: Matrix2D,
    alpha: f32,
    blend: BlendMode,
}

/// A software canvas over an RGBA image. Sampling is nearest-neighbour;
/// textures without CPU-side pixels are skipped.
#[derive(Debug, Clone)]
pub struct ImageCanvas {
    image: RgbaImage,
    state: CanvasState,
    saved: Vec<CanvasState>,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            state: CanvasState {
                transform: Matrix2D::IDENTITY,
                alpha: 1.0,
                blend: BlendMode::Normal,
            },
            saved: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }
}

fn to_unit(p: Rgba<u8>) -> [f32; 4] {
    p.0.map(|c| c as f32 / 255.0)
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Composite a straight-alpha source over a straight-alpha destination.
fn composite(mode: BlendMode, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let (sa, da) = (src[3], dst[3]);
    // Premultiplied colors.
    let s = [src[0] * sa, src[1] * sa, src[2] * sa];
    let d = [dst[0] * da, dst[1] * da, dst[2] * da];
    let over_alpha = sa + da * (1.0 - sa);

    let (rgb, alpha) = match mode {
        BlendMode::Normal => (
            [0, 1, 2].map(|i| s[i] + d[i] * (1.0 - sa)),
            over_alpha,
        ),
        BlendMode::Add => ([0, 1, 2].map(|i| (s[i] + d[i]).min(1.0)), (sa + da).min(1.0)),
        BlendMode::Multiply => (
            [0, 1, 2].map(|i| s[i] * d[i] + s[i] * (1.0 - da) + d[i] * (1.0 - sa)),
            over_alpha,
        ),
        BlendMode::Screen => ([0, 1, 2].map(|i| s[i] + d[i] - s[i] * d[i]), over_alpha),
        BlendMode::Erase => ([0, 1, 2].map(|i| d[i] * (1.0 - sa)), da * (1.0 - sa)),
    };

    if alpha <= 0.0 {
        return [0.0; 4];
    }
    [rgb[0] / alpha, rgb[1] / alpha, rgb[2] / alpha, alpha]
}

impl Canvas2d for ImageCanvas {
    fn save(&mut self) {
        self.saved.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn set_transform(&mut self, matrix: &Matrix2D) {
        self.state.transform = *matrix;
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn set_composite_operation(&mut self, mode: BlendMode) {
        self.state.blend = mode;
    }

    fn draw_image(&mut self, texture: &Texture, src: [f32; 4], dst: [f32; 4]) {
        let Some(pixels) = texture.source().pixels.as_deref() else {
            return;
        };
        let [dx, dy, dw, dh] = dst;
        if dw <= 0.0 || dh <= 0.0 || src[2] <= 0.0 || src[3] <= 0.0 {
            return;
        }
        let transform = self.state.transform;
        let Some(inverse) = transform.invert() else {
            return;
        };

        let corners = [
            transform.transform_point(dx, dy),
            transform.transform_point(dx + dw, dy),
            transform.transform_point(dx + dw, dy + dh),
            transform.transform_point(dx, dy + dh),
        ];
        let (min, max) = bounds(&corners);
        let x0 = min[0].floor().max(0.0) as u32;
        let y0 = min[1].floor().max(0.0) as u32;
        let x1 = (max[0].ceil().max(0.0) as u32).min(self.image.width());
        let y1 = (max[1].ceil().max(0.0) as u32).min(self.image.height());

        for y in y0..y1 {
            for x in x0..x1 {
                let local = inverse.transform_point(x as f32 + 0.5, y as f32 + 0.5);
                let fx = (local.x - dx) / dw;
                let fy = (local.y - dy) / dh;
                if !(0.0..1.0).contains(&fx) || !(0.0..1.0).contains(&fy) {
                    continue;
                }
                let sx = (src[0] + fx * src[2]).floor() as u32;
                let sy = (src[1] + fy * src[3]).floor() as u32;
                if sx >= pixels.width() || sy >= pixels.height() {
                    continue;
                }
                let mut sample = to_unit(*pixels.get_pixel(sx, sy));
                sample[3] *= self.state.alpha;
                let under = to_unit(*self.image.get_pixel(x, y));
                let out = composite(self.state.blend, sample, under);
                self.image.put_pixel(x, y, Rgba(out.map(to_byte)));
            }
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        let fill = Rgba(color.map(to_byte));
        for pixel in self.image.pixels_mut() {
            *pixel = fill;
        }
    }
}

/// Draws a [`Stage`] through a [`Canvas2d`].
pub struct CanvasBlitter {
    config: RendererConfig,
    hooks: HookSet,
    alpha: Option<f32>,
    blend: Option<BlendMode>,
}

impl CanvasBlitter {
    pub fn new(config: RendererConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            hooks: HookSet::new(),
            alpha: None,
            blend: None,
        })
    }

    pub fn register_hook(&mut self, hook: Box<dyn PassHook>) {
        self.hooks.register(hook);
    }

    pub fn render_frame(
        &mut self,
        canvas: &mut dyn Canvas2d,
        stage: &mut Stage,
        registry: &TextureRegistry,
        camera: &Camera,
    ) -> FrameStats {
        let mut stats = FrameStats::default();
        self.hooks.run_pre(stage);
        stage.depth_sort();
        stats.transforms_updated = stage.update_transforms() as u32;

        // The canvas keeps state between frames only if nobody else touched
        // it, so start from a known one.
        canvas.set_transform(&Matrix2D::IDENTITY);
        canvas.clear(self.config.clear_color);
        self.alpha = None;
        self.blend = None;

        let camera_matrix = camera.matrix();
        for id in stage.iter_visible() {
            let Some(node) = stage.get(id) else {
                continue;
            };
            let Some(sprite) = &node.sprite else {
                continue;
            };
            if !node.world_visible() || node.world_alpha() <= 0.0 {
                continue;
            }
            let Some(world) = node.transform().cached_world_matrix() else {
                continue;
            };

            let resolved = registry.resolve(&sprite.texture, &sprite.frame);
            if resolved.is_missing() {
                stats.placeholders += 1;
            }
            let frame = resolved.frame();
            let geometry = SpriteGeometry::of(frame);
            let full = flip_matrix(sprite, geometry.source)
                .multiply(&world)
                .multiply(&camera_matrix);

            if self.config.cull {
                let corners = geometry.corners().map(|c| full.transform_point(c.x, c.y));
                let (min, max) = bounds(&corners);
                if !camera.viewport.intersects(min, max) {
                    stats.culled += 1;
                    continue;
                }
            }

            let alpha = node.world_alpha();
            if self.alpha != Some(alpha) {
                canvas.set_global_alpha(alpha);
                self.alpha = Some(alpha);
            }
            if self.blend != Some(sprite.blend_mode) {
                canvas.set_composite_operation(sprite.blend_mode);
                self.blend = Some(sprite.blend_mode);
            }

            if !frame.is_rotated() && full.is_axis_aligned() {
                let min = geometry.offset;
                let max = geometry.offset + geometry.size;
                let dst = floor_rect(
                    full.transform_point(min.x, min.y),
                    full.transform_point(max.x, max.y),
                );
                canvas.draw_image(resolved.texture(), source_rect(frame), dst);
            } else {
                self.draw_transformed(canvas, resolved.texture(), frame, &geometry, &full);
                stats.transformed_draws += 1;
            }
            stats.draw_calls += 1;
            stats.quads += 1;
        }

        stats
            .events
            .extend(registry.take_missing().into_iter().map(RenderEvent::from));
        self.hooks.run_post(&stats);
        stats
    }

    fn draw_transformed(
        &self,
        canvas: &mut dyn Canvas2d,
        texture: &Texture,
        frame: &Frame,
        geometry: &SpriteGeometry,
        full: &Matrix2D,
    ) {
        let Vec2 { x: ox, y: oy } = geometry.offset;
        // Atlas packers rotate frames 90° clockwise; turn them back.
        let local = if frame.is_rotated() {
            Matrix2D::new(0.0, -1.0, 1.0, 0.0, ox, oy + geometry.size.y)
        } else {
            Matrix2D::translation(ox, oy)
        };
        let mut matrix = local.multiply(full);
        if self.config.round_pixels {
            matrix.tx = matrix.tx.floor();
            matrix.ty = matrix.ty.floor();
        }

        let (_, _, rw, rh) = frame.region();
        canvas.save();
        canvas.set_transform(&matrix);
        canvas.draw_image(texture, source_rect(frame), [0.0, 0.0, rw as f32, rh as f32]);
        canvas.restore();
    }
}

/// The frame's rectangle in the texture, in pixels.
fn source_rect(frame: &Frame) -> [f32; 4] {
    let (x, y, w, h) = frame.region();
    [x as f32, y as f32, w as f32, h as f32]
}
