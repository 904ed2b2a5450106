//! # Transform — Per-Node Local and World Matrices
//!
//! A [`TransformNode`] holds the position, scale, rotation, pivot, and skew of
//! one display object and derives two matrices from them:
//!
//! - the **local** matrix, built from the node's own components, and
//! - the **world** matrix, `local.multiply(&parent_world)`.
//!
//! Both are cached. Gameplay code mutates transforms every frame, but most
//! nodes in a scene are static most of the time, so recomputing every matrix
//! on every traversal would waste most of the work.
//!
//! ## Generation Counters
//!
//! Instead of scattering `dirty` booleans around, every cache follows one
//! rule: *a derived value records the generation of its inputs at the time it
//! was computed, and is stale exactly when those generations moved on.*
//!
//! ```text
//! set_rotation()          local_generation 7 → 8
//!                         local cache computed at 7      → stale
//! world_matrix(parent)    parent world generation 3 → 4
//!                         world cache saw (local 7, parent 3) → stale
//!                         recompute, world_generation 12 → 13
//! children                saw parent 12, now 13         → stale in turn
//! ```
//!
//! A node's `world_generation` only moves when its world matrix was actually
//! recomputed, so an untouched subtree under an untouched parent costs one
//! integer comparison per node.

use crate::math::{Components, Matrix2D, Vec2};

/// A parent's world matrix together with the generation it was computed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentWorld {
    pub matrix: Matrix2D,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct LocalCache {
    matrix: Matrix2D,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct WorldCache {
    matrix: Matrix2D,
    local_generation: u64,
    parent_generation: Option<u64>,
}

/// Position, scale, rotation, pivot, and skew of one node, with lazily
/// recomputed local and world matrices.
#[derive(Debug, Clone)]
pub struct TransformNode {
    components: Components,
    local_generation: u64,
    world_generation: u64,
    local_cache: Option<LocalCache>,
    world_cache: Option<WorldCache>,
}

impl TransformNode {
    pub fn new() -> Self {
        Self {
            components: Components::default(),
            local_generation: 0,
            world_generation: 0,
            local_cache: None,
            world_cache: None,
        }
    }

    /// Create a transform at the given position.
    pub fn from_xy(x: f32, y: f32) -> Self {
        let mut node = Self::new();
        node.set_position(x, y);
        node
    }

    fn touch(&mut self) -> &mut Self {
        self.local_generation += 1;
        self
    }

    pub fn set_position(&mut self, x: f32, y: f32) -> &mut Self {
        self.components.position = Vec2::new(x, y);
        self.touch()
    }

    pub fn set_scale(&mut self, x: f32, y: f32) -> &mut Self {
        self.components.scale = Vec2::new(x, y);
        self.touch()
    }

    /// Rotation in radians, clockwise in Y-down screen space.
    pub fn set_rotation(&mut self, radians: f32) -> &mut Self {
        self.components.rotation = radians;
        self.touch()
    }

    /// Local-space point that is placed at `position`.
    pub fn set_pivot(&mut self, x: f32, y: f32) -> &mut Self {
        self.components.pivot = Vec2::new(x, y);
        self.touch()
    }

    pub fn set_skew(&mut self, x: f32, y: f32) -> &mut Self {
        self.components.skew = Vec2::new(x, y);
        self.touch()
    }

    pub fn position(&self) -> Vec2 {
        self.components.position
    }

    pub fn scale(&self) -> Vec2 {
        self.components.scale
    }

    pub fn rotation(&self) -> f32 {
        self.components.rotation
    }

    pub fn pivot(&self) -> Vec2 {
        self.components.pivot
    }

    pub fn skew(&self) -> Vec2 {
        self.components.skew
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// True when a component changed since the local matrix was last built.
    pub fn is_dirty(&self) -> bool {
        self.local_cache
            .is_none_or(|cache| cache.generation != self.local_generation)
    }

    /// Bumped on every component mutation.
    pub fn local_generation(&self) -> u64 {
        self.local_generation
    }

    /// Bumped every time the world matrix is recomputed.
    pub fn world_generation(&self) -> u64 {
        self.world_generation
    }

    /// The local matrix, rebuilt only if a component changed since the last
    /// call. Calling twice without a mutation in between returns the same bits.
    pub fn local_matrix(&mut self) -> Matrix2D {
        if let Some(cache) = self.local_cache {
            if cache.generation == self.local_generation {
                return cache.matrix;
            }
        }
        let matrix = Matrix2D::from_components(&self.components);
        self.local_cache = Some(LocalCache {
            matrix,
            generation: self.local_generation,
        });
        matrix
    }

    /// The world matrix for this node under `parent` (`None` for a root).
    ///
    /// Recomputed as `local.multiply(&parent.matrix)` when the local matrix is
    /// dirty or the parent's world generation differs from the one seen last
    /// time; otherwise the cached matrix is returned.
    pub fn world_matrix(&mut self, parent: Option<ParentWorld>) -> Matrix2D {
        let parent_generation = parent.map(|p| p.generation);
        if let Some(cache) = self.world_cache {
            if cache.local_generation == self.local_generation
                && cache.parent_generation == parent_generation
            {
                return cache.matrix;
            }
        }

        let local = self.local_matrix();
        let matrix = match parent {
            Some(parent) => local.multiply(&parent.matrix),
            None => local,
        };
        self.world_cache = Some(WorldCache {
            matrix,
            local_generation: self.local_generation,
            parent_generation,
        });
        self.world_generation += 1;
        matrix
    }

    /// The world matrix and its generation, for handing down to children.
    pub fn world(&mut self, parent: Option<ParentWorld>) -> ParentWorld {
        let matrix = self.world_matrix(parent);
        ParentWorld {
            matrix,
            generation: self.world_generation,
        }
    }

    /// The last computed world matrix without revalidating it.
    pub fn cached_world_matrix(&self) -> Option<Matrix2D> {
        self.world_cache.map(|cache| cache.matrix)
    }

    /// Drop the world cache, forcing the next [`world_matrix`](Self::world_matrix)
    /// to recompute. Needed when the node moves to a different parent, since
    /// two parents can coincidentally share a generation number.
    pub fn invalidate_world(&mut self) {
        self.world_cache = None;
    }
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new()
    }
}
