//! Shadow mapping: depth rendered from the light, then looked up by the main pass.
//!
//! The comparison is a proxy. The buffer resolution and the fixed tolerance give both self
//! shadowing and detached shadows on some geometry.

use nalgebra::{Matrix4, Vector3};

use super::buffer::{DepthBuffer, FrameBuffer};
use super::model::Model;
use super::rasterizer;
use super::shader::DepthShader;
use super::transform::RenderContext;
use super::util::{embed_point, project_point};
use crate::error::{Error, Result};

/// Default tolerance of the depth comparison, in screen depth units.
pub const SHADOW_EPSILON: f32 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Lit,
    Occluded,
}

/// Depth of the scene as seen from the light, plus the transform that produced it.
#[derive(Debug, Clone)]
pub struct ShadowMap {
    depth: DepthBuffer,
    light_transform: Matrix4<f32>,
    epsilon: f32,
}

impl ShadowMap {
    /// Renders the depth-only pass. `light_ctx` is a context set up from the light's viewpoint,
    /// width x height is the shadow buffer size, independent of the main frame.
    pub fn render(model: &Model, light_ctx: &RenderContext, width: u32, height: u32) -> Self {
        let mut depth = DepthBuffer::new(width, height);
        let mut frame = FrameBuffer::new(width, height);
        let mut shader = DepthShader::new(model, light_ctx);
        let written = rasterizer::render(model, light_ctx, &mut shader, &mut frame, &mut depth);
        log::debug!("shadow buffer {}x{}: {} pixels written", width, height, written);
        return Self {
            depth,
            light_transform: *light_ctx.transform(),
            epsilon: SHADOW_EPSILON,
        };
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        return self;
    }

    pub fn epsilon(&self) -> f32 {
        return self.epsilon;
    }

    pub fn depth(&self) -> &DepthBuffer {
        return &self.depth;
    }

    /// Transform from the camera space of `main_ctx` to shadow buffer coordinates.
    pub fn uniform(&self, main_ctx: &RenderContext) -> Result<Matrix4<f32>> {
        let inverse = main_ctx
            .model_view()
            .try_inverse()
            .ok_or(Error::SingularMatrix("model-view"))?;
        return Ok(self.light_transform * inverse);
    }

    /// Shadow buffer coordinates of a main pass camera space position.
    pub fn project(&self, uniform: &Matrix4<f32>, view_position: Vector3<f32>) -> Option<Vector3<f32>> {
        return project_point(uniform * embed_point(view_position));
    }

    /// Whether the light reaches a camera space position of the main pass.
    /// Positions outside the shadow buffer, or over its background, count as lit.
    pub fn classify(&self, uniform: &Matrix4<f32>, view_position: Vector3<f32>) -> Visibility {
        let p = match self.project(uniform, view_position) {
            Some(p) => p,
            None => return Visibility::Lit,
        };
        let stored = match self.depth.sample(p.x.round() as i32, p.y.round() as i32) {
            Some(stored) => stored,
            None => return Visibility::Lit,
        };
        // Larger depth is nearer to the light: something sits in front if the stored value is bigger.
        if stored - p.z > self.epsilon {
            return Visibility::Occluded;
        }
        return Visibility::Lit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::Corner;
    use crate::scene::transform::Camera;
    use nalgebra::{point, vector};

    /// Ground square at y = 0 and a small roof hovering above its center.
    fn ground_with_roof() -> Model {
        let positions = vec![
            point![-1.0, 0.0, -1.0], point![1.0, 0.0, -1.0], point![1.0, 0.0, 1.0], point![-1.0, 0.0, 1.0],
            point![-0.3, 0.5, -0.3], point![0.3, 0.5, -0.3], point![0.3, 0.5, 0.3], point![-0.3, 0.5, 0.3],
        ];
        let quad = |a: usize, b: usize, c: usize, d: usize| {
            [
                [Corner::new(a, 0, 0), Corner::new(b, 0, 0), Corner::new(c, 0, 0)],
                [Corner::new(a, 0, 0), Corner::new(c, 0, 0), Corner::new(d, 0, 0)],
            ]
        };
        let mut faces = Vec::new();
        faces.extend(quad(0, 1, 2, 3));
        faces.extend(quad(4, 5, 6, 7));
        return Model::from_parts(positions, vec![vector![0.0, 1.0, 0.0]], vec![], faces);
    }

    fn light_from_above() -> RenderContext {
        let light = Camera { eye: vector![0.0, 3.0, 0.0], center: Vector3::zeros(), up: vector![0.0, 0.0, -1.0] };
        let mut ctx = RenderContext::for_camera(light, vector![0.0, 1.0, 0.0], 128, 128);
        ctx.set_projection(0.0);
        return ctx;
    }

    #[test]
    fn roof_shadows_ground_below_it() {
        let model = ground_with_roof();
        let light_ctx = light_from_above();
        let shadow = ShadowMap::render(&model, &light_ctx, 128, 128);

        // Main camera identical to the light: camera space positions are easy to write down.
        let uniform = shadow.uniform(&light_ctx).unwrap();
        let to_view = |p: Vector3<f32>| (light_ctx.model_view() * embed_point(p)).xyz();
        assert_eq!(shadow.classify(&uniform, to_view(vector![0.0, 0.0, 0.0])), Visibility::Occluded);
        assert_eq!(shadow.classify(&uniform, to_view(vector![0.8, 0.0, 0.8])), Visibility::Lit);
        assert_eq!(shadow.classify(&uniform, to_view(vector![0.0, 0.5, 0.0])), Visibility::Lit);

        // Roof is nearer to the light than the ground around it.
        assert!(shadow.depth().get(64, 64) > shadow.depth().get(100, 100));
        // A tolerance larger than the roof height hides the shadow.
        let loose = shadow.with_epsilon(100.0);
        assert_eq!(loose.epsilon(), 100.0);
        assert_eq!(loose.classify(&uniform, to_view(vector![0.0, 0.0, 0.0])), Visibility::Lit);
    }

    #[test]
    fn outside_shadow_buffer_is_lit() {
        let model = ground_with_roof();
        let light_ctx = light_from_above();
        let shadow = ShadowMap::render(&model, &light_ctx, 128, 128);
        let uniform = shadow.uniform(&light_ctx).unwrap();
        let far_away = (light_ctx.model_view() * embed_point(vector![50.0, 0.0, 0.0])).xyz();
        assert_eq!(shadow.classify(&uniform, far_away), Visibility::Lit);
    }
}
