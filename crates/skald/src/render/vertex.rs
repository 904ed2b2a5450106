//! # Vertex — One Corner of a Batched Quad
//!
//! Every visible sprite becomes four [`SpriteVertex`] values written straight
//! into the batch's staging slice. Positions are already in view space: the
//! node's world matrix and the camera were applied on the CPU, so sprites
//! with different transforms still share one buffer and one draw call.
//!
//! ```text
//! SpriteVertex (24 bytes per vertex)
//! ┌──────────────┬──────────────┬──────────┬──────────────┐
//! │ position     │ uv           │ color    │ texture_unit │
//! │ [f32; 2]     │ [f32; 2]     │ u32      │ f32          │
//! │ offset 0     │ offset 8     │ offset 16│ offset 20    │
//! │ location(0)  │ location(1)  │ loc(2)   │ location(3)  │
//! └──────────────┴──────────────┴──────────┴──────────────┘
//! ```
//!
//! `color` is tint and alpha packed as `0xAABBGGRR`, which the GPU reads as
//! four normalized bytes. `texture_unit` selects one of the textures bound
//! for the current batch, so sprites from different atlases can still share
//! a draw as long as the batch has a free unit.
//!
//! Quads are drawn as two triangles through a shared index pattern
//! `0, 1, 2, 0, 2, 3` per quad, corners ordered top-left, top-right,
//! bottom-right, bottom-left.

use bytemuck::{Pod, Zeroable};

/// Vertices per quad.
pub const QUAD_VERTICES: usize = 4;

/// Indices per quad.
pub const QUAD_INDICES: usize = 6;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: u32,
    pub texture_unit: f32,
}

impl SpriteVertex {
    #[cfg(feature = "gpu")]
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            // color
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Unorm8x4,
            },
            // texture unit
            wgpu::VertexAttribute {
                offset: 20,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32,
            },
        ],
    };
}

/// Index buffer contents for `quads` quads.
pub fn quad_indices(quads: usize) -> Vec<u32> {
    (0..quads as u32)
        .flat_map(|q| {
            let base = q * QUAD_VERTICES as u32;
            [base, base + 1, base + 2, base, base + 2, base + 3]
        })
        .collect()
}

/// Camera view-projection matrix uploaded as a uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
}
