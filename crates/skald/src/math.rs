//! # Math — 2D Affine Matrices
//!
//! We re-export the [glam](https://docs.rs/glam) vector types so users don't
//! need to depend on it directly. The workhorse of this crate is
//! [`Matrix2D`], a six-float affine transform that every node, camera, and
//! quad in the renderer passes through.
//!
//! ## Layout
//!
//! ```text
//! | a  c  tx |      x' = a·x + c·y + tx
//! | b  d  ty |      y' = b·x + d·y + ty
//! | 0  0  1  |
//! ```
//!
//! `(a, b)` is the transformed X axis, `(c, d)` the transformed Y axis, and
//! `(tx, ty)` the translation. This is the same six-value layout Canvas2D's
//! `setTransform(a, b, c, d, e, f)` takes, so the canvas path can hand a
//! matrix straight to the context.
//!
//! ## Composition Order
//!
//! Matrix multiplication is not commutative, and mixing up the order is the
//! single most common bug in transform code. This module has exactly two
//! composition functions and both name the order explicitly:
//!
//! - [`Matrix2D::multiply`]: `a.multiply(&b)` applies `a` **first**, then `b`.
//! - [`Matrix2D::premultiply`]: `a.premultiply(&b)` applies `b` **first**,
//!   then `a`.
//!
//! World matrices are always built child-then-parent:
//! `world = local.multiply(&parent_world)`.
//!
//! ## Comparison
//!
//! - **glam** (`Affine2`): Same math, column-major `Mat2` + translation. We
//!   keep our own struct so the field names match Canvas2D and the vertex
//!   writer can read six scalars without going through SIMD lanes.
//! - **kurbo** (`Affine`): `[f64; 6]` in the same a..f order, `Mul` operator
//!   means "right-hand side first". We avoid the operator entirely.

use serde::{Deserialize, Serialize};

pub use glam::{Mat4, Vec2, Vec4};

/// Determinants smaller than this are treated as singular by
/// [`Matrix2D::invert`].
pub const SINGULAR_EPSILON: f32 = 1e-10;

/// A 2D affine transform: `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

/// Components used to build a local matrix in one step.
///
/// Mirrors the state a [`TransformNode`](crate::transform::TransformNode)
/// carries. `pivot` is the local-space point that lands on `position`, and
/// skew is applied as an extra rotation of each axis (`skew.x` tilts the Y
/// axis, `skew.y` tilts the X axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    pub position: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
    pub pivot: Vec2,
    pub skew: Vec2,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            pivot: Vec2::ZERO,
            skew: Vec2::ZERO,
        }
    }
}

impl Matrix2D {
    /// `(1, 0, 0, 1, 0, 0)`.
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// A pure translation.
    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// A pure scale about the origin.
    pub const fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// A pure rotation about the origin (radians, clockwise in Y-down space).
    pub fn rotation(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Build the matrix for translate · rotate · scale in one pass, without
    /// allocating intermediate rotation or scale matrices.
    pub fn from_transform(tx: f32, ty: f32, rotation: f32, scale_x: f32, scale_y: f32) -> Self {
        Self::from_components(&Components {
            position: Vec2::new(tx, ty),
            scale: Vec2::new(scale_x, scale_y),
            rotation,
            ..Components::default()
        })
    }

    /// Build a local matrix from position, scale, rotation, pivot, and skew.
    ///
    /// With zero rotation and skew the sin/cos calls are skipped. The fast
    /// path feeds the same angle sums through as sines (`sin(±0) == ±0`) and
    /// `1.0` as cosines, so it is bit-identical to the general path,
    /// including the sign of zero terms for `-0.0` inputs.
    pub fn from_components(components: &Components) -> Self {
        let Components {
            position,
            scale,
            rotation,
            pivot,
            skew,
        } = *components;

        let unrotated = rotation == 0.0 && skew == Vec2::ZERO;
        let (sin_x, cos_x, sin_y, cos_y) = if unrotated {
            (rotation + skew.y, 1.0, rotation - skew.x, 1.0)
        } else {
            let (sin_x, cos_x) = (rotation + skew.y).sin_cos();
            let (sin_y, cos_y) = (rotation - skew.x).sin_cos();
            (sin_x, cos_x, sin_y, cos_y)
        };

        let a = cos_x * scale.x;
        let b = sin_x * scale.x;
        let c = -sin_y * scale.y;
        let d = cos_y * scale.y;

        Self {
            a,
            b,
            c,
            d,
            tx: position.x - (pivot.x * a + pivot.y * c),
            ty: position.y - (pivot.x * b + pivot.y * d),
        }
    }

    /// Compose so that the result applies `self` first and `other` second.
    ///
    /// `child_local.multiply(&parent_world)` is the world matrix of the child.
    pub fn multiply(&self, other: &Matrix2D) -> Matrix2D {
        let s = self;
        let o = other;
        Matrix2D {
            a: o.a * s.a + o.c * s.b,
            b: o.b * s.a + o.d * s.b,
            c: o.a * s.c + o.c * s.d,
            d: o.b * s.c + o.d * s.d,
            tx: o.a * s.tx + o.c * s.ty + o.tx,
            ty: o.b * s.tx + o.d * s.ty + o.ty,
        }
    }

    /// Compose so that the result applies `other` first and `self` second.
    pub fn premultiply(&self, other: &Matrix2D) -> Matrix2D {
        other.multiply(self)
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// The inverse transform, or `None` when the matrix is singular (for
    /// example a node scaled to zero on one axis).
    pub fn invert(&self) -> Option<Matrix2D> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPSILON || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Matrix2D {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            tx: (self.c * self.ty - self.d * self.tx) * inv,
            ty: (self.b * self.tx - self.a * self.ty) * inv,
        })
    }

    pub fn transform_point(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// True when the matrix maps axis-aligned rectangles to axis-aligned
    /// rectangles without mirroring (no rotation, no skew, positive scale).
    pub fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0 && self.a > 0.0 && self.d > 0.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Expand to a column-major 4x4 for shader uniforms.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            Vec4::new(self.a, self.b, 0.0, 0.0),
            Vec4::new(self.c, self.d, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(self.tx, self.ty, 0.0, 1.0),
        )
    }

    /// The six values in Canvas2D `setTransform` order.
    pub fn to_array(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.tx, self.ty]
    }
}

impl Default for Matrix2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI, TAU};

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn identity_maps_points_to_themselves() {
        let m = Matrix2D::identity();
        assert_eq!(m.transform_point(3.0, -7.5), Vec2::new(3.0, -7.5));
        assert!(m.is_identity());
    }

    #[test]
    fn multiply_applies_self_first() {
        // Scale by 2 then translate by (10, 0): (1, 1) -> (2, 2) -> (12, 2).
        let scale = Matrix2D::scaling(2.0, 2.0);
        let translate = Matrix2D::translation(10.0, 0.0);

        let scale_then_translate = scale.multiply(&translate);
        assert_eq!(scale_then_translate.transform_point(1.0, 1.0), Vec2::new(12.0, 2.0));

        // The other order: (1, 1) -> (11, 1) -> (22, 2).
        let translate_then_scale = translate.multiply(&scale);
        assert_eq!(translate_then_scale.transform_point(1.0, 1.0), Vec2::new(22.0, 2.0));
    }

    #[test]
    fn premultiply_applies_other_first() {
        let scale = Matrix2D::scaling(2.0, 2.0);
        let translate = Matrix2D::translation(10.0, 0.0);
        // other (scale) first, then self (translate).
        let m = translate.premultiply(&scale);
        assert_eq!(m, scale.multiply(&translate));
        assert_eq!(m.transform_point(1.0, 1.0), Vec2::new(12.0, 2.0));
    }

    #[test]
    fn multiply_matches_sequential_application() {
        let first = Matrix2D::from_transform(5.0, -3.0, 0.7, 1.5, 0.5);
        let second = Matrix2D::from_transform(-2.0, 8.0, -1.2, 2.0, 3.0);
        let composed = first.multiply(&second);

        let p = first.transform_point(4.0, 9.0);
        let expected = second.transform_point(p.x, p.y);
        assert!(approx(composed.transform_point(4.0, 9.0), expected));
    }

    #[test]
    fn rotation_quarter_turn() {
        let m = Matrix2D::rotation(FRAC_PI_2);
        assert!(approx(m.transform_point(1.0, 0.0), Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn from_components_pivot_lands_on_position() {
        let m = Matrix2D::from_components(&Components {
            position: Vec2::new(100.0, 50.0),
            scale: Vec2::new(2.0, 3.0),
            rotation: 0.4,
            pivot: Vec2::new(8.0, 4.0),
            skew: Vec2::ZERO,
        });
        assert!(approx(m.transform_point(8.0, 4.0), Vec2::new(100.0, 50.0)));
    }

    /// The general branch of `from_components`, spelled out.
    fn general_path(c: &Components) -> Matrix2D {
        let (sin_x, cos_x) = (c.rotation + c.skew.y).sin_cos();
        let (sin_y, cos_y) = (c.rotation - c.skew.x).sin_cos();
        let (a, b) = (cos_x * c.scale.x, sin_x * c.scale.x);
        let (cc, d) = (-sin_y * c.scale.y, cos_y * c.scale.y);
        Matrix2D::new(
            a,
            b,
            cc,
            d,
            c.position.x - (c.pivot.x * a + c.pivot.y * cc),
            c.position.y - (c.pivot.x * b + c.pivot.y * d),
        )
    }

    #[test]
    fn unrotated_fast_path_matches_general_bits_for_signed_zeros() {
        for rotation in [0.0f32, -0.0] {
            for skew in [Vec2::ZERO, Vec2::new(-0.0, 0.0), Vec2::new(0.0, -0.0), Vec2::new(-0.0, -0.0)] {
                let components = Components {
                    position: Vec2::new(7.0, 9.0),
                    scale: Vec2::new(-2.0, 3.0),
                    rotation,
                    pivot: Vec2::new(1.5, -4.0),
                    skew,
                };
                let fast = Matrix2D::from_components(&components);
                let general = general_path(&components);
                assert_eq!(
                    fast.to_array().map(f32::to_bits),
                    general.to_array().map(f32::to_bits),
                    "rotation {rotation:?} skew {skew:?}"
                );
            }
        }
    }

    #[test]
    fn whole_turn_is_close_to_unrotated() {
        let m = Matrix2D::from_transform(1.0, 2.0, TAU, 2.0, 2.0);
        assert!(approx(m.transform_point(1.0, 0.0), Vec2::new(3.0, 2.0)));
        let half = Matrix2D::from_transform(0.0, 0.0, PI, 1.0, 1.0);
        assert!(approx(half.transform_point(1.0, 0.0), Vec2::new(-1.0, 0.0)));
    }

    #[test]
    fn skew_tilts_axes() {
        let m = Matrix2D::from_components(&Components {
            skew: Vec2::new(0.5, 0.0),
            ..Components::default()
        });
        // skew.x tilts the Y axis: (0, 1) moves along +X.
        let p = m.transform_point(0.0, 1.0);
        assert!(p.x > 0.0);
        assert!(approx(m.transform_point(1.0, 0.0), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn invert_round_trips() {
        let m = Matrix2D::from_transform(12.0, -4.0, 0.9, 3.0, 0.25);
        let inv = m.invert().unwrap();
        let p = m.transform_point(5.0, 6.0);
        assert!(approx(inv.transform_point(p.x, p.y), Vec2::new(5.0, 6.0)));
        assert!(m.multiply(&inv).to_array().iter().zip(Matrix2D::IDENTITY.to_array()).all(|(a, b)| (a - b).abs() < 1e-4));
    }

    #[test]
    fn invert_singular_is_none() {
        assert!(Matrix2D::scaling(0.0, 1.0).invert().is_none());
        assert!(Matrix2D::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0).invert().is_none());
    }

    #[test]
    fn axis_aligned_detection() {
        assert!(Matrix2D::from_transform(3.0, 4.0, 0.0, 2.0, 1.0).is_axis_aligned());
        assert!(!Matrix2D::from_transform(3.0, 4.0, 0.1, 2.0, 1.0).is_axis_aligned());
        assert!(!Matrix2D::scaling(-1.0, 1.0).is_axis_aligned());
    }

    #[test]
    fn to_mat4_matches_transform_point() {
        let m = Matrix2D::from_transform(3.0, 4.0, 0.3, 2.0, 1.0);
        let v = m.to_mat4().transform_point3(glam::Vec3::new(1.0, 2.0, 0.0));
        assert!(approx(Vec2::new(v.x, v.y), m.transform_point(1.0, 2.0)));
    }
}
