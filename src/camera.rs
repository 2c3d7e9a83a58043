use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Perspective camera looking down its local -Z axis.
///
/// `fov` is the vertical field of view in degrees. The projection matrix is
/// cached; call [`PerspectiveCamera::update_projection_matrix`] after changing
/// `fov`, `aspect`, `near` or `far`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh_gl(
            self.fov.to_radians(),
            self.aspect.max(0.01),
            self.near,
            self.far,
        );
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.target - self.position;
        let target = if forward.length_squared() > f32::EPSILON {
            self.target
        } else {
            self.position + Vec3::NEG_Z
        };
        Mat4::look_at_rh(self.position, target, self.up)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_tracks_aspect_after_update() {
        let mut camera = PerspectiveCamera::new(70.0, 1.0, 0.1, 5000.0);
        let square = camera.projection_matrix();
        camera.aspect = 2.0;
        assert_eq!(camera.projection_matrix(), square);
        camera.update_projection_matrix();
        let wide = camera.projection_matrix();
        assert!((wide.x_axis.x * 2.0 - square.x_axis.x).abs() < 1e-5);
        assert_eq!(wide.y_axis.y, square.y_axis.y);
    }

    #[test]
    fn default_view_looks_down_negative_z() {
        let camera = PerspectiveCamera::new(70.0, 1.0, 0.1, 5000.0);
        let ahead = camera.view_projection().project_point3(Vec3::new(0.0, 0.0, -10.0));
        assert!(ahead.x.abs() < 1e-5 && ahead.y.abs() < 1e-5);
        assert!(ahead.z > -1.0 && ahead.z < 1.0);
    }

    #[test]
    fn degenerate_target_falls_back_to_forward() {
        let mut camera = PerspectiveCamera::new(70.0, 1.0, 0.1, 5000.0);
        camera.look_at(camera.position);
        assert!(camera.view_matrix().is_finite());
    }
}
