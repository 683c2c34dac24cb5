//! Model-view, projection and viewport matrices, bundled into a render context.
//!
//! Camera space follows the usual convention: the camera looks down -z, so a larger z is closer
//! to the viewer. Every depth buffer in the crate keeps this "larger is nearer" ordering.

use nalgebra as na;
use na::{matrix, Matrix4, Vector3};

use super::util::{embed_vector, invert_transpose, project_vector};

/// Depth resolution of the viewport transform, screen z lands in [0, DEPTH].
pub const DEPTH: f32 = 255.0;

/// Matrix mapping [-1, 1]^3 to the pixel rectangle [x, x + w] x [y, y + h] and depth [0, DEPTH].
pub fn viewport(x: f32, y: f32, w: f32, h: f32) -> Matrix4<f32> {
    return matrix![w / 2.0, 0.0,     0.0,           x + w / 2.0;
                   0.0,     h / 2.0, 0.0,           y + h / 2.0;
                   0.0,     0.0,     DEPTH / 2.0,   DEPTH / 2.0;
                   0.0,     0.0,     0.0,           1.0];
}

/// Perspective matrix, coeff is -1 / (distance from the eye to the center), 0 gives orthographic projection.
pub fn projection(coeff: f32) -> Matrix4<f32> {
    return matrix![1.0, 0.0, 0.0,   0.0;
                   0.0, 1.0, 0.0,   0.0;
                   0.0, 0.0, 1.0,   0.0;
                   0.0, 0.0, coeff, 1.0];
}

/// World to camera transform. The basis is built by Gram-Schmidt, `up` parallel to `eye - center`
/// gives a degenerate basis.
pub fn lookat(eye: Vector3<f32>, center: Vector3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    let z = (eye - center).normalize();
    let x = up.cross(&z).normalize();
    let y = z.cross(&x).normalize();
    let rotation = matrix![x.x, x.y, x.z, 0.0;
                           y.x, y.y, y.z, 0.0;
                           z.x, z.y, z.z, 0.0;
                           0.0, 0.0, 0.0, 1.0];
    // Center goes to the origin, the projection then places the eye at distance |eye - center| on +z.
    let translation = matrix![1.0, 0.0, 0.0, -center.x;
                              0.0, 1.0, 0.0, -center.y;
                              0.0, 0.0, 1.0, -center.z;
                              0.0, 0.0, 0.0, 1.0];
    return rotation * translation;
}

/// Camera placement used to build a render context.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Vector3<f32>,
    pub center: Vector3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    /// Perspective coefficient for this camera, -1 / |eye - center|.
    pub fn perspective_coeff(&self) -> f32 {
        let distance = (self.eye - self.center).norm();
        if distance < f32::EPSILON {
            return 0.0;
        }
        return -1.0 / distance;
    }
}

/// Transform state read by every shader invocation during a pass.
/// Setters recompute the cached products, so the context is always consistent.
#[derive(Debug, Clone)]
pub struct RenderContext {
    model_view: Matrix4<f32>,
    projection: Matrix4<f32>,
    viewport: Matrix4<f32>,
    // Cached derived values.
    transform: Matrix4<f32>,          // viewport * projection * model_view.
    mit: Matrix4<f32>,                // Inverse transpose of model_view, applied to normals.
    light_direction: Vector3<f32>,    // World space, normalized.
    t_light_direction: Vector3<f32>,  // Camera space, normalized.
}

impl Default for RenderContext {
    fn default() -> Self {
        return Self::new();
    }
}

impl RenderContext {
    /// Identity transforms and light pointing along +z.
    pub fn new() -> Self {
        let mut context = Self {
            model_view: Matrix4::identity(),
            projection: Matrix4::identity(),
            viewport: Matrix4::identity(),
            transform: Matrix4::identity(),
            mit: Matrix4::identity(),
            light_direction: Vector3::z(),
            t_light_direction: Vector3::z(),
        };
        context.update();
        return context;
    }

    /// Standard setup: camera at `camera`, image occupying the central 3/4 of a width x height frame.
    pub fn for_camera(camera: Camera, light_direction: Vector3<f32>, width: u32, height: u32) -> Self {
        let mut context = Self::new();
        let (w, h) = (width as f32, height as f32);
        context.set_lookat(camera.eye, camera.center, camera.up);
        context.set_viewport(w / 8.0, h / 8.0, w * 3.0 / 4.0, h * 3.0 / 4.0);
        context.set_projection(camera.perspective_coeff());
        context.set_light(light_direction);
        return context;
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.viewport = viewport(x, y, w, h);
        self.update();
    }

    pub fn set_projection(&mut self, coeff: f32) {
        self.projection = projection(coeff);
        self.update();
    }

    pub fn set_lookat(&mut self, eye: Vector3<f32>, center: Vector3<f32>, up: Vector3<f32>) {
        self.model_view = lookat(eye, center, up);
        self.update();
    }

    /// Direction towards the light, in world space. A zero vector keeps the previous direction.
    pub fn set_light(&mut self, light_direction: Vector3<f32>) {
        match light_direction.try_normalize(f32::EPSILON) {
            Some(direction) => self.light_direction = direction,
            None => log::warn!(
                "light direction {:?} has no length, keeping {:?}",
                light_direction, self.light_direction
            ),
        }
        self.update();
    }

    fn update(&mut self) {
        self.transform = self.viewport * self.projection * self.model_view;
        self.mit = match invert_transpose(&self.model_view) {
            Some(mit) => mit,
            None => {
                log::warn!("model-view matrix is singular, normals are left untransformed");
                Matrix4::identity()
            }
        };
        self.t_light_direction =
            project_vector(self.model_view * embed_vector(self.light_direction)).normalize();
    }

    pub fn model_view(&self) -> &Matrix4<f32> {
        return &self.model_view;
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        return &self.projection;
    }

    pub fn viewport(&self) -> &Matrix4<f32> {
        return &self.viewport;
    }

    /// Full world to screen transform, viewport * projection * model_view.
    pub fn transform(&self) -> &Matrix4<f32> {
        return &self.transform;
    }

    /// World to clip space transform, projection * model_view.
    pub fn clip_transform(&self) -> Matrix4<f32> {
        return self.projection * self.model_view;
    }

    /// Inverse transpose of the model-view matrix.
    pub fn mit(&self) -> &Matrix4<f32> {
        return &self.mit;
    }

    pub fn light_direction(&self) -> Vector3<f32> {
        return self.light_direction;
    }

    /// Light direction with the model-view rotation applied.
    pub fn t_light_direction(&self) -> Vector3<f32> {
        return self.t_light_direction;
    }
}
