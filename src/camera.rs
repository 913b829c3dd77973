//! Camera, projection and the orbit controller driving them.
//!
//! The controller works in spherical coordinates around a target point:
//! `radius` is the distance, `phi` the polar angle from +Y and `theta` the
//! azimuth around Y. Drag and auto-rotate change the angles through a damped
//! delta that is applied in [`OrbitController::update`] once per frame; the
//! modifier+wheel vertical orbit applies immediately.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};
use instant::Duration;

use crate::{data_structures::bounds::BoundingMetrics, input::InputEvent, input::PointerButton};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Keeps the polar angle away from the poles where `look_at` flips.
const POLAR_EPSILON: f32 = 1e-3;
/// Radians of polar change per wheel unit in the vertical orbit gesture.
const VERTICAL_ORBIT_PER_DELTA: f32 = 0.002;
/// Camera offset for a freshly loaded asset, in multiples of the target size.
const FRAMING_OFFSET: [f32; 3] = [0.9, 0.6, 1.2];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(position: P, target: P) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
        }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, Vector3::unit_y())
    }

    pub fn offset(&self) -> Vector3<f32> {
        self.position - self.target
    }

    pub fn distance(&self) -> f32 {
        self.offset().magnitude()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    width: u32,
    height: u32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn set_depth_range(&mut self, znear: f32, zfar: f32) {
        self.znear = znear;
        self.zfar = zfar;
    }

    pub fn height(&self) -> f32 {
        self.height as f32
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        let aspect = self.width as f32 / self.height as f32;
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

/// The camera with its controller and the GPU side of its uniform.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn write(&mut self, queue: &wgpu::Queue, projection: &Projection) {
        self.uniform.update_view_proj(&self.camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

/// Polar/azimuth/radius triple, three.js conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    /// Polar angle from +Y.
    pub phi: f32,
    /// Azimuth around +Y, measured from +Z towards +X.
    pub theta: f32,
}

impl Spherical {
    pub fn from_offset(v: Vector3<f32>) -> Self {
        let radius = v.magnitude();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            phi: (v.y / radius).clamp(-1.0, 1.0).acos(),
            theta: v.x.atan2(v.z),
        }
    }

    pub fn to_offset(&self) -> Vector3<f32> {
        let sin_phi = self.phi.sin();
        Vector3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSettings {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    /// Both bounds lie strictly inside `(0, π)`.
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    /// 1.0 is one full turn per minute.
    pub auto_rotate_speed: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            enable_damping: true,
            damping_factor: 0.08,
            min_polar_angle: POLAR_EPSILON,
            max_polar_angle: PI - POLAR_EPSILON,
            auto_rotate_speed: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DragMode {
    #[default]
    None,
    Rotate,
    Pan,
}

#[derive(Debug, Clone)]
pub struct OrbitController {
    pub settings: OrbitSettings,
    target: Point3<f32>,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vector3<f32>,
    min_distance: f32,
    max_distance: f32,
    sensitivity: f32,
    auto_rotate: bool,
    drag: DragMode,
}

impl OrbitController {
    pub fn new(settings: OrbitSettings) -> Self {
        Self {
            settings,
            target: Point3::origin(),
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vector3::new(0.0, 0.0, 0.0),
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            sensitivity: 1.0,
            auto_rotate: false,
            drag: DragMode::None,
        }
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    pub fn distance_limits(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }

    pub fn set_distance_limits(&mut self, min: f32, max: f32) {
        self.min_distance = min.max(0.0);
        self.max_distance = max.max(self.min_distance);
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Swaps the speed multiplier for rotate, zoom and pan.
    pub fn set_sensitivity(&mut self, multiplier: f32) {
        self.sensitivity = multiplier.max(0.0);
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.auto_rotate = enabled;
    }

    pub fn is_interacting(&self) -> bool {
        self.drag != DragMode::None
    }

    /**
     * Puts the camera at a fixed offset from an asset normalized to `target_size` and aims
     * at half its height. The minimum distance is the radius of the sphere enclosing the
     * asset so the camera can't be zoomed into it.
     */
    pub fn frame(&mut self, camera: &mut Camera, metrics: &BoundingMetrics, target_size: f32) {
        let height = if metrics.bounds.is_empty() {
            0.0
        } else {
            metrics.bounds.max.y - metrics.bounds.min.y
        };
        self.target = Point3::new(0.0, height * 0.5, 0.0);
        self.set_distance_limits(metrics.radius(), target_size * 10.0);
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;
        self.pan_offset = Vector3::new(0.0, 0.0, 0.0);

        let offset = Vector3::from(FRAMING_OFFSET) * target_size;
        let distance = offset.magnitude().clamp(self.min_distance, self.max_distance);
        camera.target = self.target;
        camera.position = self.target + offset.normalize_to(distance);
    }

    /// Drag rotation by a pointer movement in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let factor = 2.0 * PI * self.settings.rotate_speed * self.sensitivity / viewport_height.max(1.0);
        self.delta_theta -= dx * factor;
        self.delta_phi -= dy * factor;
    }

    /// Wheel zoom; positive `delta_y` (scrolling towards the user) moves the camera away.
    pub fn dolly(&mut self, delta_y: f32) {
        if delta_y == 0.0 {
            return;
        }
        let step = 0.95f32.powf(self.settings.zoom_speed * self.sensitivity);
        if delta_y < 0.0 {
            self.scale *= step;
        } else {
            self.scale /= step;
        }
    }

    /// Screen-space panning by a pointer movement in pixels.
    pub fn pan(&mut self, dx: f32, dy: f32, camera: &Camera, projection: &Projection) {
        let forward = (camera.target - camera.position).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward);
        if !(right.x.is_finite() && up.x.is_finite()) {
            return;
        }
        // Distance covered by half the viewport height at the target
        let half_height = camera.distance() * (projection.fovy().0 * 0.5).tan();
        let factor = 2.0 * half_height * self.settings.pan_speed * self.sensitivity / projection.height();
        self.pan_offset += -right * (dx * factor) + up * (dy * factor);
    }

    /**
     * Wheel with the modifier held: move the camera along its meridian by
     * `delta_y` and re-aim it at the target right away.
     */
    pub fn vertical_orbit(&mut self, delta_y: f32, camera: &mut Camera) {
        let mut spherical = Spherical::from_offset(camera.position - self.target);
        spherical.phi += delta_y * VERTICAL_ORBIT_PER_DELTA * self.settings.rotate_speed * self.sensitivity;
        spherical.phi = self.clamp_polar(spherical.phi);
        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;
    }

    fn clamp_polar(&self, phi: f32) -> f32 {
        let min = self.settings.min_polar_angle.max(POLAR_EPSILON);
        let max = self.settings.max_polar_angle.min(PI - POLAR_EPSILON).max(min);
        phi.clamp(min, max)
    }

    /// Routes one bound input event.
    pub fn handle(&mut self, event: InputEvent, camera: &mut Camera, projection: &Projection) {
        match event {
            InputEvent::PointerDown(PointerButton::Primary) => self.drag = DragMode::Rotate,
            InputEvent::PointerDown(PointerButton::Secondary | PointerButton::Middle) => {
                self.drag = DragMode::Pan
            }
            InputEvent::PointerUp(_) => self.drag = DragMode::None,
            InputEvent::PointerMoved { dx, dy } => match self.drag {
                DragMode::Rotate => self.rotate(dx, dy, projection.height()),
                DragMode::Pan => self.pan(dx, dy, camera, projection),
                DragMode::None => {}
            },
            InputEvent::Wheel {
                delta_y,
                modifier_held: true,
            } => self.vertical_orbit(delta_y, camera),
            InputEvent::Wheel {
                delta_y,
                modifier_held: false,
            } => self.dolly(delta_y),
        }
    }

    /// Applies pending deltas, damping and auto-rotation to `camera`.
    pub fn update(&mut self, camera: &mut Camera, dt: Duration) {
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        if self.auto_rotate && self.drag == DragMode::None {
            self.delta_theta -= 2.0 * PI / 60.0 * self.settings.auto_rotate_speed * dt.as_secs_f32();
        }

        let damping = if self.settings.enable_damping {
            self.settings.damping_factor.clamp(0.0, 1.0)
        } else {
            1.0
        };
        spherical.theta += self.delta_theta * damping;
        spherical.phi = self.clamp_polar(spherical.phi + self.delta_phi * damping);
        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * damping;

        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;

        let keep = 1.0 - damping;
        self.delta_theta *= keep;
        self.delta_phi *= keep;
        self.pan_offset *= keep;
        self.scale = 1.0;
    }
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::new(OrbitSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Deg;

    use super::*;
    use crate::data_structures::bounds::BoundingBox;

    const EPS: f32 = 1e-4;

    fn metrics(height: f32) -> BoundingMetrics {
        let bounds = BoundingBox {
            min: Point3::new(-1.0, 0.0, -1.0),
            max: Point3::new(1.0, height, 1.0),
        };
        BoundingMetrics {
            bounds,
            raw_bounds: bounds,
            scale: 1.0,
        }
    }

    fn framed() -> (OrbitController, Camera, Projection) {
        let mut controller = OrbitController::new(OrbitSettings {
            enable_damping: false,
            ..Default::default()
        });
        let mut camera = Camera::new((0.0, 0.0, 10.0), (0.0, 0.0, 0.0));
        controller.frame(&mut camera, &metrics(5.0), 5.0);
        (controller, camera, Projection::new(800, 600, Deg(45.0), 0.1, 100.0))
    }

    fn polar(camera: &Camera, controller: &OrbitController) -> f32 {
        Spherical::from_offset(camera.position - controller.target()).phi
    }

    #[test]
    fn spherical_round_trips_an_offset() {
        let v = Vector3::new(1.0, 2.0, -3.0);
        let back = Spherical::from_offset(v).to_offset();
        assert!((back - v).magnitude() < EPS);
    }

    #[test]
    fn framing_aims_at_half_height() {
        let (controller, camera, _) = framed();
        assert_eq!(controller.target(), Point3::new(0.0, 2.5, 0.0));
        assert_eq!(camera.target, controller.target());
        let (min, max) = controller.distance_limits();
        assert!((min - metrics(5.0).radius()).abs() < EPS);
        assert_eq!(max, 50.0);
        assert!(camera.distance() >= min);
    }

    #[test]
    fn vertical_orbit_moves_the_polar_angle_and_keeps_distance() {
        let (mut controller, mut camera, projection) = framed();
        let before = polar(&camera, &controller);
        let distance = camera.distance();
        controller.handle(
            InputEvent::Wheel {
                delta_y: 100.0,
                modifier_held: true,
            },
            &mut camera,
            &projection,
        );
        let after = polar(&camera, &controller);
        assert!((after - before - 0.2).abs() < EPS);
        assert!((camera.distance() - distance).abs() < EPS);
        assert_eq!(camera.target, controller.target());
    }

    #[test]
    fn vertical_orbit_never_reaches_the_poles() {
        let (mut controller, mut camera, _) = framed();
        for _ in 0..100 {
            controller.vertical_orbit(1000.0, &mut camera);
        }
        let phi = polar(&camera, &controller);
        assert!(phi < PI && phi >= PI - 2.0 * POLAR_EPSILON);

        for _ in 0..100 {
            controller.vertical_orbit(-1000.0, &mut camera);
        }
        let phi = polar(&camera, &controller);
        assert!(phi > 0.0 && phi <= 2.0 * POLAR_EPSILON);
    }

    #[test]
    fn wheel_without_modifier_zooms_within_limits() {
        let (mut controller, mut camera, projection) = framed();
        let start = camera.distance();
        let wheel = |delta_y| InputEvent::Wheel {
            delta_y,
            modifier_held: false,
        };
        controller.handle(wheel(-100.0), &mut camera, &projection);
        controller.update(&mut camera, Duration::from_millis(16));
        assert!(camera.distance() < start);

        for _ in 0..500 {
            controller.handle(wheel(-100.0), &mut camera, &projection);
            controller.update(&mut camera, Duration::from_millis(16));
        }
        let (min, max) = controller.distance_limits();
        assert!((camera.distance() - min).abs() < EPS);

        for _ in 0..500 {
            controller.handle(wheel(100.0), &mut camera, &projection);
            controller.update(&mut camera, Duration::from_millis(16));
        }
        assert!((camera.distance() - max).abs() < 1e-2);
    }

    #[test]
    fn sensitivity_scales_rotation() {
        let (mut slow, mut slow_camera, projection) = framed();
        let (mut fast, mut fast_camera, _) = framed();
        slow.set_sensitivity(0.5);
        fast.set_sensitivity(2.0);
        let start = Spherical::from_offset(slow_camera.offset()).theta;
        for (controller, camera) in [(&mut slow, &mut slow_camera), (&mut fast, &mut fast_camera)] {
            controller.handle(InputEvent::PointerDown(PointerButton::Primary), camera, &projection);
            controller.handle(InputEvent::PointerMoved { dx: 10.0, dy: 0.0 }, camera, &projection);
            controller.update(camera, Duration::from_millis(16));
        }
        let slow_turn = (Spherical::from_offset(slow_camera.offset()).theta - start).abs();
        let fast_turn = (Spherical::from_offset(fast_camera.offset()).theta - start).abs();
        assert!((fast_turn / slow_turn - 4.0).abs() < 1e-2);
    }

    #[test]
    fn auto_rotate_pauses_while_dragging() {
        let (mut controller, mut camera, projection) = framed();
        controller.set_auto_rotate(true);
        let start = camera.position;
        controller.update(&mut camera, Duration::from_secs(1));
        assert!((camera.position - start).magnitude() > EPS);

        controller.handle(InputEvent::PointerDown(PointerButton::Primary), &mut camera, &projection);
        let held = camera.position;
        controller.update(&mut camera, Duration::from_secs(1));
        assert!((camera.position - held).magnitude() < EPS);
    }

    #[test]
    fn right_drag_pans_target_sideways() {
        let (mut controller, mut camera, projection) = framed();
        let before = controller.target();
        controller.handle(InputEvent::PointerDown(PointerButton::Secondary), &mut camera, &projection);
        controller.handle(InputEvent::PointerMoved { dx: 50.0, dy: 0.0 }, &mut camera, &projection);
        controller.update(&mut camera, Duration::from_millis(16));
        let moved = controller.target() - before;
        assert!(moved.magnitude() > EPS);
        assert!(moved.y.abs() < EPS);
    }
}
