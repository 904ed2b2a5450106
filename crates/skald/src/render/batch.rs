//! # Vertex Batch — Fixed-Capacity Quad Staging
//!
//! A [`VertexBatch`] is a CPU-side array of `batch_size × 4` vertices that the
//! render pass fills with quads and then submits in one draw call. It does
//! bookkeeping only:
//!
//! ```text
//! vertices: [q0 q0 q0 q0 | q1 q1 q1 q1 | ... | free ... ]
//!                                             ▲
//!                                     count = quads written
//!
//! reset()          count = 0, once per pass and after every flush
//! can_contain(n)   count + n <= batch_size
//! staging(n)       mutable slice for the next n quads
//! add(n)           count += n, after the caller wrote them
//! ```
//!
//! Checking capacity is the caller's job. Calling `add` past capacity is a
//! programming error and asserts in debug builds; the pass always asks
//! `can_contain` first and flushes when the answer is no.

use super::backend::GraphicsBackend;
use super::state::VertexBufferId;
use super::vertex::{QUAD_VERTICES, SpriteVertex};

pub struct VertexBatch {
    id: VertexBufferId,
    vertices: Vec<SpriteVertex>,
    batch_size: usize,
    count: usize,
}

impl VertexBatch {
    /// A batch holding up to `batch_size` quads.
    pub fn new(id: VertexBufferId, batch_size: usize) -> Self {
        Self {
            id,
            vertices: vec![SpriteVertex::default(); batch_size * QUAD_VERTICES],
            batch_size,
            count: 0,
        }
    }

    pub fn id(&self) -> VertexBufferId {
        self.id
    }

    /// Quads written since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn can_contain(&self, quads: usize) -> bool {
        self.count + quads <= self.batch_size
    }

    /// Where the next `quads` quads go. The caller must have checked
    /// [`can_contain`](Self::can_contain).
    pub fn staging(&mut self, quads: usize) -> &mut [SpriteVertex] {
        let start = self.count * QUAD_VERTICES;
        let end = ((self.count + quads) * QUAD_VERTICES).min(self.vertices.len());
        &mut self.vertices[start.min(end)..end]
    }

    /// Commit `quads` quads that were written through [`staging`](Self::staging).
    pub fn add(&mut self, quads: usize) {
        debug_assert!(
            self.count + quads <= self.batch_size,
            "vertex batch overrun: {} + {} > {}",
            self.count,
            quads,
            self.batch_size
        );
        self.count = (self.count + quads).min(self.batch_size);
    }

    /// The vertices written so far.
    pub fn used(&self) -> &[SpriteVertex] {
        &self.vertices[..self.count * QUAD_VERTICES]
    }

    /// Bind this batch's buffer, clearing any stale index binding first.
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        backend.unbind_index_buffer();
        backend.bind_vertex_buffer(self.id);
    }
}
