use std::{cell::RefCell, f32::consts::PI, rc::Rc};

use glam::{Vec2, Vec3};

use crate::{camera::PerspectiveCamera, input::PointerInput};

const POLAR_EPSILON: f32 = 1e-3;

/// Orbits the camera around a target point using spherical coordinates
/// (radius, azimuth around +Y, polar angle from +Y).
pub struct OrbitControls {
    pub target: Vec3,
    input: Rc<RefCell<PointerInput>>,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    /// World units per pixel of drag, scaled by the camera distance.
    pub pan_speed: f32,
    /// Distance scale applied per scroll line.
    pub zoom_scale: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl OrbitControls {
    pub fn new(camera: &PerspectiveCamera, input: Rc<RefCell<PointerInput>>) -> Self {
        Self {
            target: camera.target,
            input,
            rotate_speed: 0.005,
            pan_speed: 0.001,
            zoom_scale: 0.95,
            min_distance: 0.5,
            max_distance: 500.0,
        }
    }

    /// Applies the pointer input gathered since the previous frame.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) {
        let frame = self.input.borrow_mut().take_frame();

        let offset = camera.position - self.target;
        let mut radius = offset.length().max(f32::EPSILON);
        let mut azimuth = offset.x.atan2(offset.z);
        let mut polar = (offset.y / radius).clamp(-1.0, 1.0).acos();

        azimuth -= frame.rotate.x * self.rotate_speed;
        polar = (polar - frame.rotate.y * self.rotate_speed).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);

        if frame.zoom != 0.0 {
            radius *= self.zoom_scale.powf(frame.zoom);
        }
        radius = radius.clamp(self.min_distance, self.max_distance);

        if frame.pan != Vec2::ZERO {
            let forward = -offset.normalize_or_zero();
            let right = forward.cross(camera.up).normalize_or_zero();
            let up = right.cross(forward);
            let scale = self.pan_speed * radius;
            self.target += (-frame.pan.x * right + frame.pan.y * up) * scale;
        }

        let direction = Vec3::new(
            polar.sin() * azimuth.sin(),
            polar.cos(),
            polar.sin() * azimuth.cos(),
        );

        camera.position = self.target + direction * radius;
        camera.look_at(self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraParams;
    use winit::event::MouseButton;

    fn setup() -> (PerspectiveCamera, Rc<RefCell<PointerInput>>, OrbitControls) {
        let camera = PerspectiveCamera::from_params(&CameraParams::default(), 1.0);
        let input = Rc::new(RefCell::new(PointerInput::new()));
        let controls = OrbitControls::new(&camera, input.clone());
        (camera, input, controls)
    }

    #[test]
    fn idle_update_keeps_camera_in_place() {
        let (mut camera, _input, mut controls) = setup();
        let before = camera.position;

        controls.update(&mut camera);

        assert!(camera.position.abs_diff_eq(before, 1e-4));
        assert_eq!(camera.target, Vec3::ZERO);
    }

    #[test]
    fn rotating_keeps_distance_to_target() {
        let (mut camera, input, mut controls) = setup();
        let distance = camera.position.length();

        {
            let mut input = input.borrow_mut();
            input.move_cursor(Vec2::ZERO);
            input.set_button(MouseButton::Left, true);
            input.move_cursor(Vec2::new(120.0, -40.0));
        }
        controls.update(&mut camera);

        assert!((camera.position.length() - distance).abs() < 1e-3);
        assert!(camera.forward().abs_diff_eq(-camera.position.normalize(), 1e-4));
    }

    #[test]
    fn zoom_is_clamped() {
        let (mut camera, input, mut controls) = setup();

        input.borrow_mut().scroll(1000.0);
        controls.update(&mut camera);
        assert!((camera.position.length() - controls.min_distance).abs() < 1e-4);

        input.borrow_mut().scroll(-10000.0);
        controls.update(&mut camera);
        assert!((camera.position.length() - controls.max_distance).abs() < 1e-2);
    }

    #[test]
    fn panning_moves_target_and_camera_together() {
        let (mut camera, input, mut controls) = setup();
        let offset = camera.position - controls.target;

        {
            let mut input = input.borrow_mut();
            input.move_cursor(Vec2::ZERO);
            input.set_button(MouseButton::Right, true);
            input.move_cursor(Vec2::new(30.0, 0.0));
        }
        controls.update(&mut camera);

        assert_ne!(controls.target, Vec3::ZERO);
        assert!((camera.position - controls.target).abs_diff_eq(offset, 1e-3));
    }
}
