//! # WgpuBackend — The Batched Pass on a Real GPU
//!
//! wgpu records draws inside a render pass that borrows every buffer it
//! touches, while [`RenderPass`](super::RenderPass) issues binds and draws
//! one call at a time. The backend bridges the two by deferring: each
//! [`draw_quads`](GraphicsBackend::draw_quads) copies its vertices into one
//! frame-wide list and records which state it was drawn with. [`finish`]
//! then builds the vertex and index buffers once and encodes everything.
//!
//! ```text
//! during the frame                       finish(view)
//! ────────────────                       ────────────
//! bind_blend_mode(Add)   ─┐              vertex buffer  ← all vertices
//! bind_texture(0, hero)   ├─ state       index buffer   ← quad_indices(total)
//! draw_quads(v, 12)      ─┘─► DrawOp     per DrawOp: pipeline(shader, blend),
//! draw_quads(v, 3)         ─► DrawOp                 bind groups, viewport,
//!                                                    draw_indexed
//! ```
//!
//! ## Pipelines
//!
//! wgpu freezes blend state into the pipeline, so pipelines are cached per
//! `(ShaderId, BlendMode)` and built the first time a pair is drawn.
//!
//! ## One Texture Unit
//!
//! Each draw samples a single texture through bind group 1, so
//! [`max_texture_units`](GraphicsBackend::max_texture_units) is 1 and the
//! pass flushes on every texture switch. Atlases keep that cheap.
//!
//! ## Context Loss
//!
//! [`lose_context`](WgpuBackend::lose_context) drops every GPU object the
//! backend owns. Until [`restore`](WgpuBackend::restore) hands it a new
//! device, the backend reports itself lost and the pass draws nothing.
//! Custom shader sources are kept so they can be recompiled on restore.
//!
//! [`finish`]: WgpuBackend::finish

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::math::Mat4;
use crate::texture::{Texture, TextureId};

use super::backend::{BackendError, GraphicsBackend};
use super::state::{BlendMode, RenderTarget, ShaderId, VertexBufferId, Viewport};
use super::vertex::{QUAD_INDICES, QUAD_VERTICES, SpriteVertex, ViewUniform, quad_indices};

const SPRITE_SHADER: &str = include_str!("sprite.wgsl");

/// One recorded `draw_quads`.
struct DrawOp {
    target: RenderTarget,
    viewport: Viewport,
    view_proj: Mat4,
    pipeline: (ShaderId, BlendMode),
    texture: Option<TextureId>,
    first_quad: u32,
    quads: u32,
}

/// Everything tied to the device. Dropped wholesale on context loss.
struct GpuObjects {
    view_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    shaders: HashMap<ShaderId, wgpu::ShaderModule>,
    pipelines: HashMap<(ShaderId, BlendMode), wgpu::RenderPipeline>,
    textures: HashMap<TextureId, wgpu::BindGroup>,
    targets: HashMap<u32, wgpu::TextureView>,
}

impl GpuObjects {
    fn new(device: &wgpu::Device, shader_sources: &HashMap<ShaderId, String>) -> Self {
        // Bind group layout 0: view-projection uniform
        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite view bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // Bind group layout 1: texture + sampler
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite texture bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite pipeline layout"),
            bind_group_layouts: &[&view_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut shaders = HashMap::new();
        shaders.insert(ShaderId::SPRITE, compile(device, "sprite shader", SPRITE_SHADER));
        for (id, source) in shader_sources {
            shaders.insert(*id, compile(device, "custom sprite shader", source));
        }

        Self {
            view_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            shaders,
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
        }
    }
}

fn compile(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// The fixed-function blend equivalent of each mode.
fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::BlendFactor as F;
    let component = |src_factor: F, dst_factor: F| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        BlendMode::Normal => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Add => wgpu::BlendState {
            color: component(F::SrcAlpha, F::One),
            alpha: component(F::One, F::One),
        },
        BlendMode::Multiply => wgpu::BlendState {
            color: component(F::Dst, F::OneMinusSrcAlpha),
            alpha: component(F::One, F::OneMinusSrcAlpha),
        },
        BlendMode::Screen => wgpu::BlendState {
            color: component(F::One, F::OneMinusSrc),
            alpha: component(F::One, F::OneMinusSrcAlpha),
        },
        BlendMode::Erase => wgpu::BlendState {
            color: component(F::Zero, F::OneMinusSrcAlpha),
            alpha: component(F::Zero, F::OneMinusSrcAlpha),
        },
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    mode: BlendMode,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sprite pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[SpriteVertex::LAYOUT],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend_state(mode)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // flipped sprites wind the other way
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// A [`GraphicsBackend`] drawing with wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    gpu: Option<GpuObjects>,
    shader_sources: HashMap<ShaderId, String>,

    blend: BlendMode,
    shader: ShaderId,
    target: RenderTarget,
    viewport: Viewport,
    view_proj: Mat4,
    texture: Option<TextureId>,

    ops: Vec<DrawOp>,
    vertices: Vec<SpriteVertex>,
}

impl WgpuBackend {
    /// `format` is the format of the surface (and of every render target).
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let shader_sources = HashMap::new();
        let gpu = GpuObjects::new(&device, &shader_sources);
        Self {
            device,
            queue,
            format,
            gpu: Some(gpu),
            shader_sources,
            blend: BlendMode::Normal,
            shader: ShaderId::SPRITE,
            target: RenderTarget::Screen,
            viewport: Viewport::default(),
            view_proj: Mat4::IDENTITY,
            texture: None,
            ops: Vec::new(),
            vertices: Vec::new(),
        }
    }

    /// Register a custom WGSL shader. It must use the sprite vertex layout
    /// and bind groups (`vs_main`/`fs_main` entry points).
    pub fn register_shader(&mut self, id: ShaderId, wgsl: impl Into<String>) {
        let source = wgsl.into();
        if let Some(gpu) = &mut self.gpu {
            gpu.shaders
                .insert(id, compile(&self.device, "custom sprite shader", &source));
            gpu.pipelines.retain(|(shader, _), _| *shader != id);
        }
        self.shader_sources.insert(id, source);
    }

    /// Create an offscreen target that `RenderTarget::Framebuffer(id)` draws
    /// into. Returns `None` while the context is lost.
    pub fn create_render_target(&mut self, id: u32, width: u32, height: u32) -> Option<RenderTarget> {
        let gpu = self.gpu.as_mut()?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite render target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        gpu.targets.insert(id, view);
        Some(RenderTarget::Framebuffer(id))
    }

    pub fn render_target_view(&self, id: u32) -> Option<&wgpu::TextureView> {
        self.gpu.as_ref()?.targets.get(&id)
    }

    /// Drop every GPU object; the backend reports a lost context until
    /// [`restore`](Self::restore).
    pub fn lose_context(&mut self) {
        if self.gpu.take().is_some() {
            log::warn!("wgpu device lost, dropping GPU objects");
        }
        self.ops.clear();
        self.vertices.clear();
    }

    /// Rebuild on a new device. Textures are re-uploaded by the pass;
    /// render targets must be recreated by the caller.
    pub fn restore(&mut self, device: wgpu::Device, queue: wgpu::Queue) {
        self.gpu = Some(GpuObjects::new(&device, &self.shader_sources));
        self.device = device;
        self.queue = queue;
        self.texture = None;
    }

    /// Encode and submit everything drawn since the last call. The screen
    /// is cleared to `clear_color` first; offscreen targets keep their
    /// contents.
    pub fn finish(&mut self, screen: &wgpu::TextureView, clear_color: [f32; 4]) {
        let ops = std::mem::take(&mut self.ops);
        let vertices = std::mem::take(&mut self.vertices);
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        for op in &ops {
            if !gpu.pipelines.contains_key(&op.pipeline) {
                let (shader_id, mode) = op.pipeline;
                let Some(shader) = gpu.shaders.get(&shader_id).or_else(|| {
                    log::warn!("shader {shader_id:?} is not registered, drawing with the sprite shader");
                    gpu.shaders.get(&ShaderId::SPRITE)
                }) else {
                    continue;
                };
                let pipeline = build_pipeline(&self.device, &gpu.pipeline_layout, shader, self.format, mode);
                gpu.pipelines.insert(op.pipeline, pipeline);
            }
        }

        // One uniform per distinct view-projection.
        let mut views: Vec<(Mat4, wgpu::BindGroup)> = Vec::new();
        for op in &ops {
            if views.iter().any(|(m, _)| *m == op.view_proj) {
                continue;
            }
            let uniform = ViewUniform {
                view_proj: op.view_proj.to_cols_array_2d(),
            };
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sprite view uniform"),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sprite view bind group"),
                layout: &gpu.view_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            views.push((op.view_proj, bind_group));
        }

        let total_quads = vertices.len() / QUAD_VERTICES;
        let buffers = (total_quads > 0).then(|| {
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sprite vertex buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sprite index buffer"),
                contents: bytemuck::cast_slice(&quad_indices(total_quads)),
                usage: wgpu::BufferUsages::INDEX,
            });
            (vertex_buffer, index_buffer)
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sprite encoder"),
            });

        // Consecutive ops on the same target share a render pass. The screen
        // gets a clearing pass even when nothing is drawn to it.
        let mut runs: Vec<(RenderTarget, &[DrawOp])> = Vec::new();
        let mut start = 0;
        for i in 1..=ops.len() {
            if i == ops.len() || ops[i].target != ops[start].target {
                if start < ops.len() {
                    runs.push((ops[start].target, &ops[start..i]));
                }
                start = i;
            }
        }
        if !runs.iter().any(|(target, _)| *target == RenderTarget::Screen) {
            runs.insert(0, (RenderTarget::Screen, &[]));
        }

        let mut screen_cleared = false;
        for (target, run) in runs {
            let view = match target {
                RenderTarget::Screen => screen,
                RenderTarget::Framebuffer(id) => match gpu.targets.get(&id) {
                    Some(view) => view,
                    None => {
                        log::warn!("render target {id} does not exist, skipping {} draws", run.len());
                        continue;
                    }
                },
            };
            let load = if target == RenderTarget::Screen && !screen_cleared {
                screen_cleared = true;
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: clear_color[0] as f64,
                    g: clear_color[1] as f64,
                    b: clear_color[2] as f64,
                    a: clear_color[3] as f64,
                })
            } else {
                wgpu::LoadOp::Load
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let Some((vertex_buffer, index_buffer)) = &buffers else {
                continue;
            };
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            for op in run {
                let Some(pipeline) = gpu.pipelines.get(&op.pipeline) else {
                    continue;
                };
                let Some(texture) = op.texture.and_then(|id| gpu.textures.get(&id)) else {
                    continue;
                };
                let Some((_, view_group)) = views.iter().find(|(m, _)| *m == op.view_proj) else {
                    continue;
                };
                let vp = op.viewport;
                if vp.width > 0.0 && vp.height > 0.0 {
                    render_pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
                }
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, view_group, &[]);
                render_pass.set_bind_group(1, texture, &[]);
                let first = op.first_quad * QUAD_INDICES as u32;
                let last = (op.first_quad + op.quads) * QUAD_INDICES as u32;
                render_pass.draw_indexed(first..last, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GraphicsBackend for WgpuBackend {
    fn bind_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn bind_shader(&mut self, shader: ShaderId) {
        self.shader = shader;
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.target = target;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    // Vertex and index buffers are built once per frame in `finish`.
    fn bind_vertex_buffer(&mut self, _buffer: VertexBufferId) {}

    fn unbind_index_buffer(&mut self) {}

    fn upload_texture(&mut self, texture: &Texture) -> Result<(), BackendError> {
        let Some(gpu) = &mut self.gpu else {
            return Err(BackendError::ContextLost);
        };
        let Some(pixels) = texture.source().pixels.as_deref() else {
            return Err(BackendError::NoPixels(texture.key().to_string()));
        };
        let max = self.device.limits().max_texture_dimension_2d;
        if pixels.width() > max || pixels.height() > max {
            return Err(BackendError::TooLarge {
                key: texture.key().to_string(),
                width: pixels.width(),
                height: pixels.height(),
                max,
            });
        }

        let gpu_texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(texture.key()),
                size: wgpu::Extent3d {
                    width: pixels.width(),
                    height: pixels.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            pixels.as_raw(),
        );
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite texture bind group"),
            layout: &gpu.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                },
            ],
        });
        gpu.textures.insert(texture.id(), bind_group);
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.texture == Some(texture) {
            self.texture = None;
        }
        // The bind group holds the last reference to the wgpu texture.
        if let Some(gpu) = &mut self.gpu {
            if gpu.textures.remove(&texture).is_some() {
                log::debug!("released GPU texture {}", texture.raw());
            }
        }
    }

    fn bind_texture(&mut self, _unit: u32, texture: TextureId) {
        self.texture = Some(texture);
    }

    fn set_view_projection(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj;
    }

    fn draw_quads(&mut self, vertices: &[SpriteVertex], quads: usize) {
        let count = (quads * QUAD_VERTICES).min(vertices.len()) / QUAD_VERTICES;
        if self.gpu.is_none() || count == 0 {
            return;
        }
        let first_quad = (self.vertices.len() / QUAD_VERTICES) as u32;
        self.vertices
            .extend_from_slice(&vertices[..count * QUAD_VERTICES]);
        self.ops.push(DrawOp {
            target: self.target,
            viewport: self.viewport,
            view_proj: self.view_proj,
            pipeline: (self.shader, self.blend),
            texture: self.texture,
            first_quad,
            quads: count as u32,
        });
    }

    fn is_context_lost(&self) -> bool {
        self.gpu.is_none()
    }

    fn max_texture_units(&self) -> u32 {
        1
    }
}
