//! The view into the stage: scroll, zoom, and rotation about the viewport
//! centre.

use serde::{Deserialize, Serialize};

use crate::math::{Mat4, Matrix2D, Vec2};

use super::state::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// World point shown at the viewport's top-left corner (before zoom and
    /// rotation).
    pub scroll: Vec2,
    pub zoom: f32,
    /// Radians, about the viewport centre.
    pub rotation: f32,
    /// Rectangle of the render target this camera draws into.
    pub viewport: Viewport,
}

impl Camera {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            scroll: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            viewport: Viewport::new(0.0, 0.0, width, height),
        }
    }

    pub fn with_scroll(mut self, x: f32, y: f32) -> Self {
        self.scroll = Vec2::new(x, y);
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_rotation(mut self, radians: f32) -> Self {
        self.rotation = radians;
        self
    }

    /// World space to render-target pixels.
    pub fn matrix(&self) -> Matrix2D {
        let origin = Vec2::new(self.viewport.x, self.viewport.y);
        if self.rotation == 0.0 && self.zoom == 1.0 {
            return Matrix2D::translation(origin.x - self.scroll.x, origin.y - self.scroll.y);
        }
        let half = Vec2::new(self.viewport.width * 0.5, self.viewport.height * 0.5);
        Matrix2D::translation(-self.scroll.x - half.x, -self.scroll.y - half.y)
            .multiply(&Matrix2D::rotation(self.rotation))
            .multiply(&Matrix2D::scaling(self.zoom, self.zoom))
            .multiply(&Matrix2D::translation(origin.x + half.x, origin.y + half.y))
    }

    /// Orthographic projection from render-target pixels (Y down) inside the
    /// viewport to clip space.
    pub fn projection(&self) -> Mat4 {
        let vp = self.viewport;
        Mat4::orthographic_rh(vp.x, vp.x + vp.width, vp.y + vp.height, vp.y, -1.0, 1.0)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_is_a_pure_offset() {
        let camera = Camera::new(320.0, 240.0).with_scroll(10.0, 20.0);
        let m = camera.matrix();
        assert!(m.is_axis_aligned());
        assert_eq!(m.transform_point(10.0, 20.0), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn zoom_keeps_centre_fixed() {
        let camera = Camera::new(200.0, 100.0).with_zoom(2.0);
        let m = camera.matrix();
        assert_eq!(m.transform_point(100.0, 50.0), Vec2::new(100.0, 50.0));
        assert_eq!(m.transform_point(110.0, 50.0), Vec2::new(120.0, 50.0));
    }

    #[test]
    fn rotation_about_centre() {
        let camera = Camera::new(200.0, 200.0).with_rotation(std::f32::consts::FRAC_PI_2);
        let m = camera.matrix();
        let centre = m.transform_point(100.0, 100.0);
        assert!((centre - Vec2::new(100.0, 100.0)).length() < 1e-4);
        // A point to the right of centre swings below it (Y down).
        let p = m.transform_point(110.0, 100.0);
        assert!((p - Vec2::new(100.0, 110.0)).length() < 1e-4);
        assert!(!m.is_axis_aligned());
    }

    #[test]
    fn projection_maps_viewport_to_clip() {
        let camera = Camera::new(200.0, 100.0);
        let p = camera.projection();
        let top_left = p.project_point3(glam::Vec3::new(0.0, 0.0, 0.0));
        let bottom_right = p.project_point3(glam::Vec3::new(200.0, 100.0, 0.0));
        assert!((top_left.x + 1.0).abs() < 1e-6 && (top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6 && (bottom_right.y + 1.0).abs() < 1e-6);
    }
}
