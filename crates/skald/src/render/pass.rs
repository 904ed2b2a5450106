//! # Render Pass — Filling and Flushing the Vertex Batch
//!
//! [`RenderPass::render_frame`] is the batched path's single entry point,
//! called once per tick:
//!
//! ```text
//! context lost?      → warn once, blank frame
//! context restored?  → forget bindings, re-upload every texture
//! release GPU copies of textures removed from the registry
//! pre-render hooks
//! stage.depth_sort(), stage.update_transforms()
//! bind target, viewport, shader, blend, vertex buffer (skipping redundant)
//!     blend and shader start each frame back at their defaults
//! for each visible sprite in paint order:
//!     resolve frame (placeholder if missing), upload texture if dirty
//!     flush if: buffer full > texture units full > blend change > shader change
//!     apply blend/shader, bind texture unit, write 4 vertices, add(1)
//! flush remaining quads, pop the camera viewport
//! collect missing-resource reports into FrameStats::events
//! post-render hooks
//! ```
//!
//! ## Flush Discipline
//!
//! A flush submits the quads written so far as one draw call, resets the
//! batch, and frees every texture unit. When several reasons apply to the
//! same sprite, only the highest-priority one is recorded and only one flush
//! happens. Flushing an empty batch is free and is not counted as a draw.
//!
//! ## Comparison
//!
//! - **Immediate-mode renderers**: one draw per sprite. Simple, but draw
//!   overhead dominates past a few hundred sprites.
//! - **Sort-then-batch renderers**: reorder sprites by texture to maximize
//!   batch length. Faster, but breaks paint order for overlapping sprites;
//!   here paint order always wins and batches end where state changes.

use std::collections::HashSet;

use crate::config::{ConfigError, RendererConfig};
use crate::math::{Matrix2D, Vec2};
use crate::scene::Stage;
use crate::texture::{FrameKey, FrameRef, MISSING_KEY, TextureId, TextureRegistry};

use super::backend::GraphicsBackend;
use super::batch::VertexBatch;
use super::camera::Camera;
use super::hooks::{HookSet, PassHook};
use super::state::{BlendMode, RenderTarget, ShaderId, StateStack, VertexBufferId, Viewport};
use super::stats::{FlushReason, FrameStats, RenderEvent};
use super::vertex::SpriteVertex;
use super::{SpriteGeometry, bounds, flip_matrix};

/// One quad ready to be written, before any flush decision.
struct PendingQuad {
    positions: [Vec2; 4],
    uvs: [[f32; 2]; 4],
    color: u32,
    texture: TextureId,
    blend: BlendMode,
    shader: ShaderId,
}

pub struct RenderPass {
    config: RendererConfig,
    batch: VertexBatch,
    blend: StateStack<BlendMode>,
    shader: StateStack<ShaderId>,
    target: StateStack<RenderTarget>,
    viewport: StateStack<Viewport>,
    vertex_buffer: StateStack<VertexBufferId>,
    /// Textures bound for the current batch; the index is the unit.
    units: Vec<TextureId>,
    hooks: HookSet,
    stats: FrameStats,
    context_lost: bool,
    failed_uploads: HashSet<String>,
}

impl RenderPass {
    pub fn new(config: RendererConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = VertexBufferId(0);
        Ok(Self {
            batch: VertexBatch::new(buffer, config.batch_size),
            blend: StateStack::new(BlendMode::Normal),
            shader: StateStack::new(ShaderId::SPRITE),
            target: StateStack::new(RenderTarget::Screen),
            viewport: StateStack::new(Viewport::default()),
            vertex_buffer: StateStack::new(buffer),
            units: Vec::new(),
            hooks: HookSet::new(),
            stats: FrameStats::default(),
            context_lost: false,
            failed_uploads: HashSet::new(),
            config,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn register_hook(&mut self, hook: Box<dyn PassHook>) {
        self.hooks.register(hook);
    }

    /// Direct render target control for nested passes (render-to-texture).
    pub fn push_render_target(&mut self, backend: &mut dyn GraphicsBackend, target: RenderTarget) {
        self.flush(backend, FlushReason::RenderTarget);
        self.target.set(target, |t| backend.bind_render_target(*t));
    }

    pub fn pop_render_target(&mut self, backend: &mut dyn GraphicsBackend) {
        self.flush(backend, FlushReason::RenderTarget);
        self.target.pop(|t| backend.bind_render_target(*t));
    }

    fn bind_total(&self) -> u32 {
        self.blend.bind_count()
            + self.shader.bind_count()
            + self.target.bind_count()
            + self.viewport.bind_count()
            + self.vertex_buffer.bind_count()
    }

    fn invalidate_bindings(&mut self) {
        self.blend.invalidate();
        self.shader.invalidate();
        self.target.invalidate();
        self.viewport.invalidate();
        self.vertex_buffer.invalidate();
        self.units.clear();
        self.batch.reset();
    }

    /// Draw one frame of `stage` as seen by `camera`.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        stage: &mut Stage,
        registry: &mut TextureRegistry,
        camera: &Camera,
    ) -> FrameStats {
        self.stats = FrameStats::default();

        if backend.is_context_lost() {
            if !self.context_lost {
                log::warn!("graphics context lost, rendering blank frames until it is restored");
                self.context_lost = true;
                self.invalidate_bindings();
                self.stats.events.push(RenderEvent::ContextLost);
            }
            self.stats.context_lost = true;
            return std::mem::take(&mut self.stats);
        }
        if self.context_lost {
            log::warn!("graphics context restored, re-uploading textures");
            self.context_lost = false;
            self.invalidate_bindings();
            registry.invalidate_slot(self.config.context_slot);
            self.stats.events.push(RenderEvent::ContextRestored);
        }
        for id in registry.take_released(self.config.context_slot) {
            backend.release_texture(id);
            self.stats.events.push(RenderEvent::TextureReleased { texture: id.raw() });
        }

        self.hooks.run_pre(stage);
        stage.depth_sort();
        self.stats.transforms_updated = stage.update_transforms() as u32;

        let binds_before = self.bind_total();
        self.begin(backend, camera);

        let camera_matrix = camera.matrix();
        let max_units = self
            .config
            .max_texture_units
            .min(backend.max_texture_units())
            .max(1) as usize;

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
                self.stats.placeholders += 1;
            }
            let geometry = SpriteGeometry::of(resolved.frame());
            let full = flip_matrix(sprite, geometry.source)
                .multiply(&world)
                .multiply(&camera_matrix);
            let positions = self.project(&full, &geometry);

            if self.config.cull {
                let (min, max) = bounds(&positions);
                if !camera.viewport.intersects(min, max) {
                    self.stats.culled += 1;
                    continue;
                }
            }

            let (texture, uvs) = self.prepare_texture(backend, registry, &resolved);
            let quad = PendingQuad {
                positions,
                uvs,
                color: sprite.tint.pack(node.world_alpha()),
                texture,
                blend: sprite.blend_mode,
                shader: sprite.shader.unwrap_or(ShaderId::SPRITE),
            };
            self.push_quad(backend, quad, max_units);
        }

        self.flush(backend, FlushReason::EndOfFrame);
        self.viewport.pop(|v| backend.set_viewport(*v));
        self.stats
            .events
            .extend(registry.take_missing().into_iter().map(RenderEvent::from));
        self.stats.state_binds = self.bind_total() - binds_before;

        log::trace!(
            "frame: {} quads, {} draw calls, {} culled",
            self.stats.quads,
            self.stats.draw_calls,
            self.stats.culled
        );
        let stats = std::mem::take(&mut self.stats);
        self.hooks.run_post(&stats);
        stats
    }

    fn begin(&mut self, backend: &mut dyn GraphicsBackend, camera: &Camera) {
        self.batch.reset();
        self.units.clear();
        self.target.ensure_bound(|t| backend.bind_render_target(*t));
        self.viewport.set(camera.viewport, |v| backend.set_viewport(*v));
        self.shader.reset(|s| backend.bind_shader(*s));
        self.blend.reset(|m| backend.bind_blend_mode(*m));
        let batch = &self.batch;
        self.vertex_buffer.ensure_bound(|_| batch.bind(backend));
        backend.set_view_projection(camera.projection());
    }

    /// Corners in render-target pixels. Axis-aligned quads are floored
    /// corner by corner to match the canvas path; `round_pixels` floors all.
    fn project(&self, full: &Matrix2D, geometry: &SpriteGeometry) -> [Vec2; 4] {
        let floor = self.config.round_pixels || full.is_axis_aligned();
        geometry.corners().map(|c| {
            let p = full.transform_point(c.x, c.y);
            if floor { p.floor() } else { p }
        })
    }

    /// Upload the texture if this context hasn't seen its current pixels.
    /// Falls back to the placeholder when the upload fails.
    fn prepare_texture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        registry: &mut TextureRegistry,
        resolved: &FrameRef,
    ) -> (TextureId, [[f32; 2]; 4]) {
        let slot = self.config.context_slot;
        let texture = resolved.texture();
        let uvs = resolved.frame().uvs().corners;

        if !registry.take_dirty(texture.key(), slot) {
            return (texture.id(), uvs);
        }
        match backend.upload_texture(texture) {
            Ok(()) => {
                self.stats.texture_uploads += 1;
                self.failed_uploads.remove(texture.key());
                (texture.id(), uvs)
            }
            Err(e) => {
                if self.failed_uploads.insert(texture.key().to_string()) {
                    log::warn!("{e}; drawing the missing-texture placeholder instead");
                    self.stats.events.push(RenderEvent::UploadFailed {
                        texture: texture.key().to_string(),
                        error: e.to_string(),
                    });
                }
                self.stats.upload_failures += 1;
                // Retry next frame, in this context only.
                registry.mark_dirty_slot(texture.key(), slot);

                let placeholder = registry.resolve(MISSING_KEY, &FrameKey::Base);
                if registry.take_dirty(MISSING_KEY, slot) && backend.upload_texture(placeholder.texture()).is_ok() {
                    self.stats.texture_uploads += 1;
                }
                (placeholder.texture().id(), placeholder.frame().uvs().corners)
            }
        }
    }

    fn push_quad(&mut self, backend: &mut dyn GraphicsBackend, quad: PendingQuad, max_units: usize) {
        let needs_unit = !self.units.contains(&quad.texture) && self.units.len() >= max_units;
        let reason = if !self.batch.can_contain(1) {
            Some(FlushReason::BufferFull)
        } else if needs_unit {
            Some(FlushReason::TextureUnits)
        } else if quad.blend != *self.blend.current() {
            Some(FlushReason::BlendMode)
        } else if quad.shader != *self.shader.current() {
            Some(FlushReason::Shader)
        } else {
            None
        };
        if let Some(reason) = reason {
            self.flush(backend, reason);
        }

        self.blend.replace(quad.blend, |m| backend.bind_blend_mode(*m));
        self.shader.replace(quad.shader, |s| backend.bind_shader(*s));

        let unit = match self.units.iter().position(|&t| t == quad.texture) {
            Some(unit) => unit,
            None => {
                self.units.push(quad.texture);
                let unit = self.units.len() - 1;
                backend.bind_texture(unit as u32, quad.texture);
                unit
            }
        };

        let staging = self.batch.staging(1);
        for (i, vertex) in staging.iter_mut().enumerate() {
            *vertex = SpriteVertex {
                position: quad.positions[i].to_array(),
                uv: quad.uvs[i],
                color: quad.color,
                texture_unit: unit as f32,
            };
        }
        self.batch.add(1);
        self.stats.quads += 1;
    }

    /// Submit the batch as one draw call. Empty batches are skipped.
    fn flush(&mut self, backend: &mut dyn GraphicsBackend, reason: FlushReason) {
        if self.batch.is_empty() {
            self.units.clear();
            return;
        }
        backend.draw_quads(self.batch.used(), self.batch.count());
        log::trace!("flush {:?}: {} quads", reason, self.batch.count());
        self.stats.draw_calls += 1;
        self.stats.flushes.record(reason);
        self.batch.reset();
        self.units.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{GpuCommand, RecordingBackend};
    use crate::render::hooks::HookCapabilities;
    use crate::scene::{Color, Node, Sprite};
    use crate::texture::{FrameDescriptor, TextureSource};

    fn registry() -> TextureRegistry {
        let mut registry = TextureRegistry::new();
        registry.add_image("a", TextureSource::sized(16, 8)).unwrap();
        registry.add_image("b", TextureSource::sized(16, 16)).unwrap();
        registry.add_image("c", TextureSource::sized(16, 16)).unwrap();
        registry
    }

    fn pass(configure: impl FnOnce(&mut RendererConfig)) -> RenderPass {
        let mut config = RendererConfig::default();
        configure(&mut config);
        RenderPass::new(config).unwrap()
    }

    fn sprite_at(stage: &mut Stage, texture: &str, x: f32, y: f32) -> crate::scene::NodeId {
        stage.add(Node::with_sprite(Sprite::new(texture)).at(x, y))
    }

    fn rect_of(vertices: &[SpriteVertex]) -> [f32; 4] {
        let [x0, y0] = vertices[0].position;
        let [x1, y1] = vertices[2].position;
        [x0, y0, x1 - x0, y1 - y0]
    }

    #[test]
    fn one_draw_call_for_shared_state() {
        let mut registry = registry();
        let mut stage = Stage::new();
        for i in 0..10 {
            sprite_at(&mut stage, "a", i as f32 * 20.0, 0.0);
        }
        let mut backend = RecordingBackend::default();
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.quads, 10);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(backend.draw_count(), 1);
        assert_eq!(stats.flushes.end_of_frame, 1);
    }

    #[test]
    fn axis_aligned_destination_rect() {
        let mut registry = registry();
        let mut stage = Stage::new();
        let id = sprite_at(&mut stage, "a", 100.0, 50.0);
        stage.get_mut(id).unwrap().set_scale(2.0, 1.0);

        let mut backend = RecordingBackend::default();
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        assert_eq!(rect_of(vertices), [100.0, 50.0, 32.0, 8.0]);
    }

    #[test]
    fn buffer_full_flushes() {
        let mut registry = registry();
        let mut stage = Stage::new();
        for i in 0..10 {
            sprite_at(&mut stage, "a", i as f32, 0.0);
        }
        let mut backend = RecordingBackend::default();
        let stats = pass(|c| c.batch_size = 4).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.flushes.buffer_full, 2);
        let sizes: Vec<usize> = backend.draws().map(|(n, _)| n).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn texture_unit_exhaustion_flushes() {
        let mut registry = registry();
        let mut stage = Stage::new();
        for key in ["a", "b", "a", "c", "b"] {
            sprite_at(&mut stage, key, 0.0, 0.0);
        }
        let mut backend = RecordingBackend::new(2);
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        // a, b, a fit two units; c needs a third → flush; then c, b.
        assert_eq!(stats.flushes.texture_units, 1);
        assert_eq!(stats.draw_calls, 2);
        let units: Vec<f32> = backend
            .draws()
            .flat_map(|(_, v)| v.iter().step_by(4).map(|v| v.texture_unit))
            .collect();
        assert_eq!(units, vec![0.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn blend_change_flushes_once() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        stage.add(Node::with_sprite(Sprite::new("a").blend(BlendMode::Add)));
        stage.add(Node::with_sprite(
            Sprite::new("a").blend(BlendMode::Normal).shader(ShaderId(3)),
        ));
        let mut backend = RecordingBackend::default();
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        // Third sprite changes both blend and shader: one flush, blamed on blend.
        assert_eq!(stats.flushes.blend_mode, 2);
        assert_eq!(stats.flushes.shader, 0);
        assert_eq!(stats.draw_calls, 3);
    }

    #[test]
    fn buffer_full_outranks_state_change() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        stage.add(Node::with_sprite(Sprite::new("b").blend(BlendMode::Add)));
        let mut backend = RecordingBackend::new(1);
        let stats = pass(|c| c.batch_size = 1).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.flushes.buffer_full, 1);
        assert_eq!(stats.flushes.total(), 2);
    }

    #[test]
    fn redundant_state_is_not_rebound() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        sprite_at(&mut stage, "a", 20.0, 0.0);
        let mut backend = RecordingBackend::default();
        let mut pass = pass(|_| {});
        pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let blend_binds = backend
            .commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::BindBlendMode(_)))
            .count();
        assert_eq!(blend_binds, 1);

        backend.clear();
        let stats = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert!(!backend.commands.iter().any(|c| matches!(c, GpuCommand::BindBlendMode(_))));
        assert_eq!(stats.texture_uploads, 0);
    }

    #[test]
    fn vertex_buffer_bind_order() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        let mut backend = RecordingBackend::default();
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let unbind = backend
            .commands
            .iter()
            .position(|c| *c == GpuCommand::UnbindIndexBuffer)
            .unwrap();
        assert_eq!(
            backend.commands[unbind + 1],
            GpuCommand::BindVertexBuffer(VertexBufferId(0))
        );
    }

    #[test]
    fn uploads_once_per_context_until_dirty() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        let mut backend = RecordingBackend::default();
        let mut pass = pass(|_| {});
        let first = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let second = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        registry.mark_dirty("a");
        let third = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(
            (first.texture_uploads, second.texture_uploads, third.texture_uploads),
            (1, 0, 1)
        );
    }

    #[test]
    fn missing_texture_draws_placeholder() {
        let mut registry = registry();
        let mut stage = Stage::new();
        stage.add(Node::with_sprite(Sprite::new("nope").frame("frame")));
        let mut backend = RecordingBackend::default();
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.placeholders, 1);
        assert_eq!(stats.quads, 1);
        let placeholder = registry.texture(MISSING_KEY).unwrap().id();
        assert_eq!(backend.uploads(), vec![placeholder]);
        let (_, vertices) = backend.draws().next().unwrap();
        assert_eq!(rect_of(vertices), [0.0, 0.0, 32.0, 32.0]);
    }

    #[test]
    fn failed_upload_falls_back_to_placeholder() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        let mut backend = RecordingBackend::default();
        backend.failing_uploads.push("a".into());
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.upload_failures, 1);
        assert_eq!(stats.quads, 1);
        let placeholder = registry.texture(MISSING_KEY).unwrap().id();
        assert!(backend.commands.contains(&GpuCommand::BindTexture {
            unit: 0,
            texture: placeholder
        }));
    }

    #[test]
    fn culls_offscreen_sprites() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 10.0, 10.0);
        sprite_at(&mut stage, "a", 5000.0, 10.0);
        let mut backend = RecordingBackend::default();
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!((stats.quads, stats.culled), (1, 1));

        let mut backend = RecordingBackend::default();
        let stats = pass(|c| c.cull = false).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!((stats.quads, stats.culled), (2, 0));
    }

    #[test]
    fn hidden_and_transparent_nodes_are_skipped() {
        let mut registry = registry();
        let mut stage = Stage::new();
        let parent = stage.add(Node::new());
        stage.add_child(parent, Node::with_sprite(Sprite::new("a")), None);
        let faded = sprite_at(&mut stage, "a", 0.0, 0.0);
        stage.get_mut(faded).unwrap().set_alpha(0.0);
        stage.get_mut(parent).unwrap().set_visible(false);

        let mut backend = RecordingBackend::default();
        let stats = pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.quads, 0);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn color_carries_world_alpha() {
        let mut registry = registry();
        let mut stage = Stage::new();
        let parent = stage.add(Node::new());
        stage.get_mut(parent).unwrap().set_alpha(0.5);
        stage.add_child(
            parent,
            Node::with_sprite(Sprite::new("a").tint(Color::RED)),
            None,
        );
        let mut backend = RecordingBackend::default();
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        assert_eq!(vertices[0].color, Color::RED.pack(0.5));
    }

    #[test]
    fn paint_order_follows_depth() {
        let mut registry = registry();
        let mut stage = Stage::new();
        stage.add(Node::with_sprite(Sprite::new("a")).at(1.0, 0.0).depth(1.0));
        stage.add(Node::with_sprite(Sprite::new("a")).at(2.0, 0.0).depth(1.0));
        stage.add(Node::with_sprite(Sprite::new("a")).at(3.0, 0.0).depth(0.0));
        let mut backend = RecordingBackend::default();
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        let xs: Vec<f32> = vertices.iter().step_by(4).map(|v| v.position[0]).collect();
        assert_eq!(xs, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn trimmed_frame_is_offset() {
        let mut registry = TextureRegistry::new();
        registry
            .add_atlas(
                "atlas",
                TextureSource::sized(64, 64),
                &[FrameDescriptor::new("t", 0, 0, 10, 12).trimmed(3, 2, 16, 16)],
            )
            .unwrap();
        let mut stage = Stage::new();
        stage.add(Node::with_sprite(Sprite::new("atlas").frame("t")).at(20.0, 20.0));
        let mut backend = RecordingBackend::default();
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        assert_eq!(rect_of(vertices), [23.0, 22.0, 10.0, 12.0]);
    }

    #[test]
    fn context_loss_blanks_then_recovers() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        let mut backend = RecordingBackend::default();
        let mut pass = pass(|_| {});
        pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());

        backend.context_lost = true;
        backend.clear();
        let lost = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert!(lost.context_lost);
        assert!(backend.commands.is_empty());

        backend.context_lost = false;
        let restored = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(restored.texture_uploads, 1);
        assert_eq!(restored.draw_calls, 1);
        assert!(backend.commands.contains(&GpuCommand::BindBlendMode(BlendMode::Normal)));
    }

    #[test]
    fn round_pixels_floors_rotated_quads() {
        let mut registry = registry();
        let mut stage = Stage::new();
        let id = sprite_at(&mut stage, "b", 100.3, 100.3);
        stage.get_mut(id).unwrap().set_rotation(0.3);
        let mut backend = RecordingBackend::default();
        pass(|c| c.round_pixels = true).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        for v in vertices {
            assert_eq!(v.position[0], v.position[0].floor());
            assert_eq!(v.position[1], v.position[1].floor());
        }
    }

    #[test]
    fn hooks_run_around_the_frame() {
        struct Nudge;
        impl PassHook for Nudge {
            fn capabilities(&self) -> HookCapabilities {
                HookCapabilities {
                    pre_render: true,
                    post_render: false,
                }
            }
            fn pre_render(&mut self, stage: &mut Stage) {
                let ids: Vec<_> = stage.iter().collect();
                for id in ids {
                    if let Some(node) = stage.get_mut(id) {
                        let p = node.transform().position();
                        node.set_position(p.x + 5.0, p.y);
                    }
                }
            }
        }

        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        let mut pass = pass(|_| {});
        pass.register_hook(Box::new(Nudge));
        let mut backend = RecordingBackend::default();
        pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let (_, vertices) = backend.draws().next().unwrap();
        assert_eq!(vertices[0].position, [5.0, 0.0]);
    }

    #[test]
    fn node_removed_before_render_is_not_drawn() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 1.0, 0.0);
        let parent = sprite_at(&mut stage, "a", 2.0, 0.0);
        stage.add_child(parent, Node::with_sprite(Sprite::new("a")).at(10.0, 0.0), None);
        sprite_at(&mut stage, "a", 3.0, 0.0);
        let mut backend = RecordingBackend::default();
        let mut pass = pass(|_| {});
        pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());

        assert!(stage.remove(parent));
        backend.clear();
        let stats = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(stats.quads, 2);
        let (_, vertices) = backend.draws().next().unwrap();
        let xs: Vec<f32> = vertices.iter().step_by(4).map(|v| v.position[0]).collect();
        assert_eq!(xs, vec![1.0, 3.0]);
    }

    #[test]
    fn paint_order_is_stable_across_frames_with_nan_depths() {
        let mut registry = registry();
        let mut stage = Stage::new();
        let depths = [2.0, f32::NAN, 1.0, 1.0, f32::NAN, 0.0];
        let ids: Vec<_> = depths
            .iter()
            .enumerate()
            .map(|(i, &d)| stage.add(Node::with_sprite(Sprite::new("a")).at(i as f32, 0.0).depth(d)))
            .collect();
        let mut pass = pass(|c| c.cull = false);

        let mut orders = Vec::new();
        for _ in 0..3 {
            for (&id, &depth) in ids.iter().zip(&depths) {
                stage.set_depth(id, depth);
            }
            let mut backend = RecordingBackend::default();
            pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
            let (_, vertices) = backend.draws().next().unwrap();
            let xs: Vec<f32> = vertices.iter().step_by(4).map(|v| v.position[0]).collect();
            orders.push(xs);
        }
        assert_eq!(orders[0], vec![5.0, 2.0, 3.0, 0.0, 1.0, 4.0]);
        assert_eq!(orders[1], orders[0]);
        assert_eq!(orders[2], orders[0]);
    }

    #[test]
    fn render_target_change_flushes_pending_quads() {
        let mut pass = pass(|_| {});
        let mut backend = RecordingBackend::default();
        let quad = PendingQuad {
            positions: [Vec2::ZERO; 4],
            uvs: [[0.0; 2]; 4],
            color: 0xffff_ffff,
            texture: TextureId(7),
            blend: BlendMode::Normal,
            shader: ShaderId::SPRITE,
        };
        pass.push_quad(&mut backend, quad, 4);
        pass.push_render_target(&mut backend, RenderTarget::Framebuffer(1));
        assert_eq!(pass.stats.flushes.render_target, 1);
        assert_eq!(pass.stats.flushes.end_of_frame, 0);
        assert_eq!(backend.draw_count(), 1);

        // Nothing pending: popping the target does not draw.
        pass.pop_render_target(&mut backend);
        assert_eq!(pass.stats.flushes.render_target, 1);
        assert_eq!(backend.draw_count(), 1);
    }

    #[test]
    fn failed_upload_retries_only_in_its_own_context() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        assert!(registry.take_dirty("a", 1));

        let mut backend = RecordingBackend::default();
        backend.failing_uploads.push("a".into());
        pass(|_| {}).render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert!(!registry.take_dirty("a", 1));
        assert!(registry.take_dirty("a", 0));
    }

    #[test]
    fn removed_texture_is_released_from_the_backend() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "b", 0.0, 0.0);
        let mut backend = RecordingBackend::default();
        let mut pass = pass(|_| {});
        pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let id = registry.texture("b").unwrap().id();
        assert!(backend.uploads().contains(&id));

        assert!(registry.remove("b"));
        backend.clear();
        let stats = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(backend.commands[0], GpuCommand::ReleaseTexture(id));
        assert!(stats.events.contains(&RenderEvent::TextureReleased { texture: id.raw() }));

        backend.clear();
        let stats = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert!(!backend.commands.contains(&GpuCommand::ReleaseTexture(id)));
        assert!(stats.events.is_empty());
    }

    #[test]
    fn frame_events_are_reported_once() {
        let mut registry = registry();
        let mut stage = Stage::new();
        sprite_at(&mut stage, "a", 0.0, 0.0);
        stage.add(Node::with_sprite(Sprite::new("nope")));
        stage.add(Node::with_sprite(Sprite::new("b").frame("walk")));
        let mut backend = RecordingBackend::default();
        backend.failing_uploads.push("a".into());
        let mut pass = pass(|_| {});

        let first = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(first.events.len(), 3);
        assert!(matches!(&first.events[0], RenderEvent::UploadFailed { texture, .. } if texture == "a"));
        assert_eq!(
            first.events[1..],
            [
                RenderEvent::MissingTexture { key: "nope".into() },
                RenderEvent::MissingFrame {
                    key: "b".into(),
                    frame: FrameKey::from("walk"),
                },
            ]
        );

        let second = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(second.upload_failures, 1);
        assert!(second.events.is_empty());

        backend.context_lost = true;
        let lost = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        let still_lost = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        backend.context_lost = false;
        let restored = pass.render_frame(&mut backend, &mut stage, &mut registry, &Camera::default());
        assert_eq!(lost.events, vec![RenderEvent::ContextLost]);
        assert!(still_lost.events.is_empty());
        assert_eq!(restored.events, vec![RenderEvent::ContextRestored]);
    }
}
