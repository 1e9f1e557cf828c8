//! Perspective camera under a yaw-only rig.
//!
//! The rig (the camera's parent) carries the scene's default yaw and the
//! autopan animation. The camera's local transform belongs to whoever drives
//! the view: the VR pose while presenting, mouse/touch orbit otherwise.

use glam::{EulerRot, Quat, Vec2, Vec3};

use crate::ports::Pose;
use crate::tween::{Easing, Tween};

pub const FOV_Y_DEGREES: f32 = 75.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

const AUTOPAN_ANGLE: f32 = 0.4;
const AUTOPAN_DURATION_MS: f64 = 3000.0;
const ORBIT_RADIANS_PER_PIXEL: f32 = 0.004;
const MAX_ORBIT_PITCH: f32 = 85.0 * std::f32::consts::PI / 180.0;

#[derive(Debug, Clone)]
pub struct CameraRig {
    rig_yaw: f32,
    autopan: Option<Tween<f32>>,
    orbit_yaw: f32,
    orbit_pitch: f32,
    yaw_only: bool,
    tracked: Option<Pose>,
    width: u32,
    height: u32,
}

impl CameraRig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            rig_yaw: 0.0,
            autopan: None,
            orbit_yaw: 0.0,
            orbit_pitch: 0.0,
            yaw_only: false,
            tracked: None,
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn rig_yaw(&self) -> f32 {
        self.rig_yaw
    }

    /// Reset the rig to a scene's default yaw, cancelling any autopan.
    pub fn set_default_yaw(&mut self, radians: f32) {
        self.autopan = None;
        self.rig_yaw = radians;
    }

    pub fn set_yaw_only(&mut self, yaw_only: bool) {
        self.yaw_only = yaw_only;
        if yaw_only {
            self.orbit_pitch = 0.0;
        }
    }

    pub fn autopan(&mut self) {
        let from = self.rig_yaw;
        self.autopan = Some(Tween::new(
            from,
            from - AUTOPAN_ANGLE,
            AUTOPAN_DURATION_MS,
            Easing::QuadraticOut,
        ));
    }

    pub fn is_autopanning(&self) -> bool {
        self.autopan.is_some()
    }

    pub fn advance(&mut self, now_ms: f64) {
        if let Some(tween) = self.autopan.as_mut() {
            self.rig_yaw = tween.sample(now_ms);
            if tween.is_finished() {
                self.autopan = None;
            }
        }
    }

    /// Drag the view by a pointer delta in pixels.
    pub fn orbit_by(&mut self, dx: f32, dy: f32) {
        self.orbit_yaw += dx * ORBIT_RADIANS_PER_PIXEL;
        if !self.yaw_only {
            self.orbit_pitch =
                (self.orbit_pitch + dy * ORBIT_RADIANS_PER_PIXEL).clamp(-MAX_ORBIT_PITCH, MAX_ORBIT_PITCH);
        }
    }

    pub fn set_tracking(&mut self, pose: Option<Pose>) {
        self.tracked = pose;
    }

    pub fn local_orientation(&self) -> Quat {
        match self.tracked {
            Some(pose) => pose.orientation,
            None => Quat::from_euler(EulerRot::YXZ, self.orbit_yaw, self.orbit_pitch, 0.0),
        }
    }

    pub fn local_position(&self) -> Vec3 {
        self.tracked.map(|pose| pose.position).unwrap_or(Vec3::ZERO)
    }

    pub fn world_orientation(&self) -> Quat {
        Quat::from_rotation_y(self.rig_yaw) * self.local_orientation()
    }

    pub fn world_position(&self) -> Vec3 {
        Quat::from_rotation_y(self.rig_yaw) * self.local_position()
    }

    pub fn forward(&self) -> Vec3 {
        self.world_orientation() * Vec3::NEG_Z
    }

    /// World-space direction through a point in normalized device
    /// coordinates.
    pub fn ray(&self, ndc: Vec2) -> Vec3 {
        let half_height = (FOV_Y_DEGREES.to_radians() * 0.5).tan();
        let half_width = half_height * self.aspect();
        let local = Vec3::new(ndc.x * half_width, ndc.y * half_height, -1.0).normalize();
        self.world_orientation() * local
    }

    /// Viewing direction as (yaw, pitch) in degrees.
    pub fn yaw_pitch_degrees(&self) -> (f32, f32) {
        let forward = self.forward();
        let yaw = (-forward.x).atan2(-forward.z).to_degrees();
        let pitch = forward.y.clamp(-1.0, 1.0).asin().to_degrees();
        (yaw, pitch)
    }

    /// Client pixel position to normalized device coordinates.
    pub fn to_ndc(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(
            (x / self.width as f32) * 2.0 - 1.0,
            -(y / self.height as f32) * 2.0 + 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn default_yaw_turns_the_rig() {
        let mut camera = CameraRig::new(800, 600);
        camera.set_default_yaw(90f32.to_radians());
        let (yaw, pitch) = camera.yaw_pitch_degrees();
        assert!((yaw - 90.0).abs() < EPSILON);
        assert!(pitch.abs() < EPSILON);
        let forward = camera.forward();
        assert!((forward.x + 1.0).abs() < EPSILON);
    }

    #[test]
    fn autopan_eases_out_over_three_seconds() {
        let mut camera = CameraRig::new(800, 600);
        camera.autopan();
        camera.advance(0.0);
        assert!(camera.rig_yaw().abs() < EPSILON);
        camera.advance(1500.0);
        let midway = camera.rig_yaw();
        assert!(midway < -0.2 && midway > -0.4);
        camera.advance(3000.0);
        assert!((camera.rig_yaw() + 0.4).abs() < EPSILON);
        assert!(!camera.is_autopanning());
    }

    #[test]
    fn center_ray_matches_forward() {
        let mut camera = CameraRig::new(1280, 720);
        camera.orbit_by(100.0, -40.0);
        let ray = camera.ray(Vec2::ZERO);
        assert!(ray.distance(camera.forward()) < EPSILON);
    }

    #[test]
    fn tracking_overrides_orbit() {
        let mut camera = CameraRig::new(800, 600);
        camera.orbit_by(300.0, 0.0);
        camera.set_tracking(Some(Pose {
            orientation: Quat::IDENTITY,
            position: Vec3::new(0.0, 1.6, 0.0),
        }));
        assert!(camera.forward().distance(Vec3::NEG_Z) < EPSILON);
        assert!(camera.world_position().distance(Vec3::new(0.0, 1.6, 0.0)) < EPSILON);
    }

    #[test]
    fn yaw_only_pins_pitch() {
        let mut camera = CameraRig::new(800, 600);
        camera.set_yaw_only(true);
        camera.orbit_by(0.0, 200.0);
        assert!(camera.yaw_pitch_degrees().1.abs() < EPSILON);
    }

    #[test]
    fn ndc_maps_corners() {
        let camera = CameraRig::new(200, 100);
        assert_eq!(camera.to_ndc(0.0, 0.0), Vec2::new(-1.0, 1.0));
        assert_eq!(camera.to_ndc(200.0, 100.0), Vec2::new(1.0, -1.0));
        assert_eq!(camera.to_ndc(100.0, 50.0), Vec2::ZERO);
    }
}
