//! Shader contract and the shading models implementing it.
//!
//! A shader runs in two stages. `vertex` is called once per corner of a triangle, it writes the
//! corner's varyings and returns its position. `fragment` is called by the rasterizer for every
//! covered pixel that passed the depth test, with weights for combining the varyings.
//!
//! Every shader declares a [`RasterMode`]:
//! - `Screen`: `vertex` returns viewport * projection * model_view * v already divided by w, the
//!   rasterizer interpolates with screen-space weights.
//! - `Clip`: `vertex` returns projection * model_view * v undivided, the rasterizer applies the
//!   viewport and the divide itself and hands perspective-correct weights to `fragment`.
//!
//! Varyings live inside the shader and are overwritten by the next triangle.

use nalgebra as na;
use na::{vector, Matrix2x3, Matrix3, Matrix4, Point3, Vector3, Vector4};

use super::buffer::GrayBuffer;
use super::model::Model;
use super::shadow::{ShadowMap, Visibility};
use super::transform::{RenderContext, DEPTH};
use super::util::{color_scale, embed_vector, project_point, project_vector, Color, WHITE};
use crate::error::Result;

/// Which rasterizer entry point a shader's vertex output is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterMode {
    Screen,
    Clip,
}

/// A pixel that passed the depth test.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    /// Weights of the three corners, non-negative and summing to 1. Perspective-correct in `Clip` mode.
    pub bar: Vector3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutput {
    Color(Color),
    /// Leaves both color and depth untouched.
    Discard,
}

pub trait Shader {
    fn mode(&self) -> RasterMode;
    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32>;
    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput;
}

// Lighting constants of the specular shading model.
const AMBIENT: f32 = 5.0;
const SHADOW_AMBIENT: f32 = 20.0;
const SPECULAR_WEIGHT: f32 = 0.6;

/// Vertex transformed all the way to the screen, divided by w. Points at infinity come out as NaN,
/// which the rasterizer rejects.
fn screen_position(ctx: &RenderContext, position: Point3<f32>) -> Vector4<f32> {
    return match project_point(ctx.transform() * position.to_homogeneous()) {
        Some(p) => vector![p.x, p.y, p.z, 1.0],
        None => Vector4::repeat(f32::NAN),
    };
}

/// Object space normal moved to camera space.
fn camera_normal(ctx: &RenderContext, normal: Vector3<f32>) -> Vector3<f32> {
    return project_vector(ctx.mit() * embed_vector(normal)).normalize();
}

/// Camera space position of a point.
fn camera_position(ctx: &RenderContext, position: Point3<f32>) -> Vector3<f32> {
    return (ctx.model_view() * position.to_homogeneous()).xyz();
}

/// Diffuse and specular coefficients for normal n, light direction l, both in camera space.
/// The camera looks down -z in that space, so the specular term only needs the z of the reflection.
fn phong(n: Vector3<f32>, l: Vector3<f32>, exponent: f32) -> (f32, f32) {
    let diffuse = n.dot(&l).max(0.0);
    let reflected = (n * (2.0 * n.dot(&l)) - l).normalize();
    let specular = reflected.z.max(0.0).powf(exponent);
    return (diffuse, specular);
}

/// Per channel ambient + color * intensity, saturated at 255.
fn shade_channels(color: Color, ambient: f32, intensity: f32) -> Color {
    return color.map(|c| (ambient + c as f32 * intensity).min(255.0) as u8);
}

/// Constant intensity over a face, from the face normal.
pub struct FlatShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    face_intensity: f32,
}

impl<'a> FlatShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self { model, ctx, face_intensity: 0.0 };
    }
}

impl Shader for FlatShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Screen;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        let a = self.model.vert(face, 0);
        let face_normal = (self.model.vert(face, 1) - a).cross(&(self.model.vert(face, 2) - a));
        self.face_intensity = match face_normal.try_normalize(f32::EPSILON) {
            Some(n) => n.dot(&self.ctx.light_direction()).max(0.0),
            None => 0.0,
        };
        return screen_position(self.ctx, self.model.vert(face, corner));
    }

    fn fragment(&mut self, _fragment: &Fragment) -> FragmentOutput {
        return FragmentOutput::Color(color_scale(WHITE, self.face_intensity));
    }
}

/// Light intensity computed per vertex and interpolated over the face.
pub struct GouraudShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    varying_intensity: Vector3<f32>,
}

impl<'a> GouraudShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self { model, ctx, varying_intensity: Vector3::zeros() };
    }
}

impl Shader for GouraudShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Screen;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_intensity[corner] =
            self.model.normal(face, corner).dot(&self.ctx.light_direction()).max(0.0);
        return screen_position(self.ctx, self.model.vert(face, corner));
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let intensity = self.varying_intensity.dot(&fragment.bar);
        return FragmentOutput::Color(color_scale(WHITE, intensity));
    }
}

/// Gouraud intensity snapped to a handful of levels.
pub struct ToonShader<'a> {
    gouraud: GouraudShader<'a>,
}

const TOON_COLOR: Color = Vector3::new(255, 155, 0);

impl<'a> ToonShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self { gouraud: GouraudShader::new(model, ctx) };
    }

    pub fn quantize(intensity: f32) -> f32 {
        return match intensity {
            i if i > 0.85 => 1.0,
            i if i > 0.60 => 0.80,
            i if i > 0.45 => 0.60,
            i if i > 0.30 => 0.45,
            i if i > 0.15 => 0.30,
            _ => 0.0,
        };
    }
}

impl Shader for ToonShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Screen;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        return self.gouraud.vertex(face, corner);
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let intensity = Self::quantize(self.gouraud.varying_intensity.dot(&fragment.bar));
        return FragmentOutput::Color(color_scale(TOON_COLOR, intensity));
    }
}

/// Diffuse texture modulated by the Gouraud intensity.
pub struct TexturedShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    uniform_clip: Matrix4<f32>,
    varying_intensity: Vector3<f32>,
    varying_uv: Matrix2x3<f32>,
}

impl<'a> TexturedShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self {
            model,
            ctx,
            uniform_clip: ctx.clip_transform(),
            varying_intensity: Vector3::zeros(),
            varying_uv: Matrix2x3::zeros(),
        };
    }
}

impl Shader for TexturedShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_intensity[corner] =
            self.model.normal(face, corner).dot(&self.ctx.light_direction()).max(0.0);
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        return self.uniform_clip * self.model.vert(face, corner).to_homogeneous();
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let uv = self.varying_uv * fragment.bar;
        let intensity = self.varying_intensity.dot(&fragment.bar);
        return FragmentOutput::Color(color_scale(self.model.diffuse(uv), intensity));
    }
}

/// Per fragment normal from an object space normal map.
pub struct NormalMappedShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    uniform_clip: Matrix4<f32>,
    varying_uv: Matrix2x3<f32>,
}

impl<'a> NormalMappedShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self {
            model,
            ctx,
            uniform_clip: ctx.clip_transform(),
            varying_uv: Matrix2x3::zeros(),
        };
    }
}

impl Shader for NormalMappedShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        return self.uniform_clip * self.model.vert(face, corner).to_homogeneous();
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let uv = self.varying_uv * fragment.bar;
        let n = camera_normal(self.ctx, self.model.normal_at_uv(uv));
        let intensity = n.dot(&self.ctx.t_light_direction()).max(0.0);
        return FragmentOutput::Color(color_scale(self.model.diffuse(uv), intensity));
    }
}

/// Tangent space normal mapping: the map's normal is expressed in the Darboux frame built from the
/// triangle's edges, its uv gradients and the interpolated vertex normal.
pub struct DarbouxShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    uniform_clip: Matrix4<f32>,
    varying_uv: Matrix2x3<f32>,
    varying_normal: Matrix3<f32>, // Camera space vertex normals as columns.
    varying_view: Matrix3<f32>,   // Camera space vertex positions as columns.
}

impl<'a> DarbouxShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self {
            model,
            ctx,
            uniform_clip: ctx.clip_transform(),
            varying_uv: Matrix2x3::zeros(),
            varying_normal: Matrix3::zeros(),
            varying_view: Matrix3::zeros(),
        };
    }

    /// Surface normal at the fragment, falls back to the interpolated normal when the frame is degenerate.
    fn perturbed_normal(&self, bar: Vector3<f32>, uv: na::Vector2<f32>) -> Vector3<f32> {
        let bn = (self.varying_normal * bar).normalize();
        let edge_1: Vector3<f32> = self.varying_view.column(1) - self.varying_view.column(0);
        let edge_2: Vector3<f32> = self.varying_view.column(2) - self.varying_view.column(0);
        let a = Matrix3::from_rows(&[edge_1.transpose(), edge_2.transpose(), bn.transpose()]);
        let ai = match a.try_inverse() {
            Some(ai) => ai,
            None => return bn,
        };
        let uvs = &self.varying_uv;
        let i = ai * vector![uvs[(0, 1)] - uvs[(0, 0)], uvs[(0, 2)] - uvs[(0, 0)], 0.0];
        let j = ai * vector![uvs[(1, 1)] - uvs[(1, 0)], uvs[(1, 2)] - uvs[(1, 0)], 0.0];
        let (i, j) = match (i.try_normalize(f32::EPSILON), j.try_normalize(f32::EPSILON)) {
            (Some(i), Some(j)) => (i, j),
            _ => return bn,
        };
        let b = Matrix3::from_columns(&[i, j, bn]);
        return (b * self.model.tangent_normal_at_uv(uv)).try_normalize(f32::EPSILON).unwrap_or(bn);
    }
}

impl Shader for DarbouxShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        let position = self.model.vert(face, corner);
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        self.varying_normal.set_column(corner, &camera_normal(self.ctx, self.model.normal(face, corner)));
        self.varying_view.set_column(corner, &camera_position(self.ctx, position));
        return self.uniform_clip * position.to_homogeneous();
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let uv = self.varying_uv * fragment.bar;
        let n = self.perturbed_normal(fragment.bar, uv);
        let intensity = n.dot(&self.ctx.t_light_direction()).max(0.0);
        return FragmentOutput::Color(color_scale(self.model.diffuse(uv), intensity));
    }
}

/// Ambient + diffuse + specular, with the exponent read from the specular map.
/// Uses the normal map when the model has one, interpolated vertex normals otherwise.
pub struct PhongShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    uniform_clip: Matrix4<f32>,
    varying_uv: Matrix2x3<f32>,
    varying_normal: Matrix3<f32>,
}

impl<'a> PhongShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self {
            model,
            ctx,
            uniform_clip: ctx.clip_transform(),
            varying_uv: Matrix2x3::zeros(),
            varying_normal: Matrix3::zeros(),
        };
    }

    fn normal(&self, bar: Vector3<f32>, uv: na::Vector2<f32>) -> Vector3<f32> {
        if self.model.has_normal_map() {
            return camera_normal(self.ctx, self.model.normal_at_uv(uv));
        }
        return (self.varying_normal * bar).normalize();
    }

    fn store_varyings(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        self.varying_normal.set_column(corner, &camera_normal(self.ctx, self.model.normal(face, corner)));
        return self.uniform_clip * self.model.vert(face, corner).to_homogeneous();
    }
}

impl Shader for PhongShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        return self.store_varyings(face, corner);
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let uv = self.varying_uv * fragment.bar;
        let n = self.normal(fragment.bar, uv);
        let (diffuse, specular) = phong(n, self.ctx.t_light_direction(), self.model.specular(uv));
        let color = self.model.diffuse(uv);
        return FragmentOutput::Color(shade_channels(color, AMBIENT, diffuse + SPECULAR_WEIGHT * specular));
    }
}

/// Screen depth as gray level. Renders the shadow buffer from the light's point of view.
pub struct DepthShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
}

impl<'a> DepthShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self { model, ctx };
    }
}

impl Shader for DepthShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Screen;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        return screen_position(self.ctx, self.model.vert(face, corner));
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        return FragmentOutput::Color(color_scale(WHITE, fragment.depth / DEPTH));
    }
}

/// Phong shading dimmed where the shadow map says the light is blocked.
pub struct ShadowShader<'a> {
    phong: PhongShader<'a>,
    shadow: &'a ShadowMap,
    uniform_shadow: Matrix4<f32>, // Camera space of the main pass to shadow buffer coordinates.
    varying_view: Matrix3<f32>,
    lit_fragments: usize,
    occluded_fragments: usize,
}

impl<'a> ShadowShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext, shadow: &'a ShadowMap) -> Result<Self> {
        return Ok(Self {
            phong: PhongShader::new(model, ctx),
            shadow,
            uniform_shadow: shadow.uniform(ctx)?,
            varying_view: Matrix3::zeros(),
            lit_fragments: 0,
            occluded_fragments: 0,
        });
    }

    /// Fragments shaded so far that the light reaches.
    pub fn lit_fragments(&self) -> usize {
        return self.lit_fragments;
    }

    /// Fragments shaded so far that are in shadow.
    pub fn occluded_fragments(&self) -> usize {
        return self.occluded_fragments;
    }
}

impl Shader for ShadowShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        let position = self.phong.model.vert(face, corner);
        self.varying_view.set_column(corner, &camera_position(self.phong.ctx, position));
        return self.phong.store_varyings(face, corner);
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let view = self.varying_view * fragment.bar;
        let lit = match self.shadow.classify(&self.uniform_shadow, view) {
            Visibility::Lit => {
                self.lit_fragments += 1;
                1.0
            }
            Visibility::Occluded => {
                self.occluded_fragments += 1;
                0.0
            }
        };
        let shadow = 0.3 + 0.7 * lit;

        let uv = self.phong.varying_uv * fragment.bar;
        let n = self.phong.normal(fragment.bar, uv);
        let model = self.phong.model;
        let (diffuse, specular) = phong(n, self.phong.ctx.t_light_direction(), model.specular(uv));
        let intensity = shadow * (1.2 * diffuse + SPECULAR_WEIGHT * specular);
        return FragmentOutput::Color(shade_channels(model.diffuse(uv), SHADOW_AMBIENT, intensity));
    }
}

/// Collects perspective-correct camera depth for screen space ambient occlusion.
/// Color output is camera z remapped from [-1, 1] to gray, saturating outside that range.
pub struct ZBufferShader<'a> {
    model: &'a Model,
    uniform_clip: Matrix4<f32>,
}

impl<'a> ZBufferShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext) -> Self {
        return Self { model, uniform_clip: ctx.clip_transform() };
    }
}

impl Shader for ZBufferShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        return self.uniform_clip * self.model.vert(face, corner).to_homogeneous();
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        return FragmentOutput::Color(color_scale(WHITE, (fragment.depth + 1.0) / 2.0));
    }
}

/// Diffuse color scaled by a baked occlusion texture.
pub struct AoLookupShader<'a> {
    model: &'a Model,
    occlusion: &'a GrayBuffer,
    uniform_clip: Matrix4<f32>,
    varying_uv: Matrix2x3<f32>,
}

impl<'a> AoLookupShader<'a> {
    pub fn new(model: &'a Model, ctx: &'a RenderContext, occlusion: &'a GrayBuffer) -> Self {
        return Self {
            model,
            occlusion,
            uniform_clip: ctx.clip_transform(),
            varying_uv: Matrix2x3::zeros(),
        };
    }
}

impl Shader for AoLookupShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Clip;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        return self.uniform_clip * self.model.vert(face, corner).to_homogeneous();
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        let uv = self.varying_uv * fragment.bar;
        let ambient = self.occlusion.sample_uv(uv);
        return FragmentOutput::Color(color_scale(self.model.diffuse(uv), ambient));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::Corner;
    use crate::scene::transform::Camera;
    use na::point;

    fn single_triangle() -> Model {
        return Model::from_parts(
            vec![point![-0.5, -0.5, 0.0], point![0.5, -0.5, 0.0], point![0.0, 0.5, 0.0]],
            vec![vector![0.0, 0.0, 1.0], vector![1.0, 0.0, 0.0], vector![0.0, 0.0, -1.0]],
            vec![vector![0.0, 0.0], vector![1.0, 0.0], vector![0.5, 1.0]],
            vec![[Corner::new(0, 0, 0), Corner::new(1, 1, 1), Corner::new(2, 2, 2)]],
        );
    }

    fn front_context() -> RenderContext {
        let camera = Camera { eye: vector![0.0, 0.0, 3.0], center: Vector3::zeros(), up: Vector3::y() };
        return RenderContext::for_camera(camera, vector![0.0, 0.0, 1.0], 64, 64);
    }

    #[test]
    fn toon_levels() {
        assert_eq!(ToonShader::quantize(0.9), 1.0);
        assert_eq!(ToonShader::quantize(0.5), 0.60);
        assert_eq!(ToonShader::quantize(0.1), 0.0);
    }

    #[test]
    fn screen_mode_vertex_is_divided() {
        let model = single_triangle();
        let ctx = front_context();
        let mut shader = GouraudShader::new(&model, &ctx);
        let v = shader.vertex(0, 2);
        assert_eq!(v.w, 1.0);
        // Light along +z: the first corner faces it, the other two do not.
        shader.vertex(0, 0);
        shader.vertex(0, 1);
        assert_eq!(shader.varying_intensity, vector![1.0, 0.0, 0.0]);
    }

    #[test]
    fn clip_mode_vertex_keeps_w() {
        let model = single_triangle();
        let ctx = front_context();
        let mut shader = TexturedShader::new(&model, &ctx);
        assert_eq!(shader.mode(), RasterMode::Clip);
        let v = shader.vertex(0, 0);
        // Point in the z = 0 plane through the center: w stays 1, x is not scaled to pixels.
        assert!((v.w - 1.0).abs() < 1e-6);
        assert!((v.x + 0.5).abs() < 1e-6);
    }

    #[test]
    fn gouraud_fragment_interpolates_intensity() {
        let model = single_triangle();
        let ctx = front_context();
        let mut shader = GouraudShader::new(&model, &ctx);
        for corner in 0..3 {
            shader.vertex(0, corner);
        }
        let fragment = Fragment { x: 0, y: 0, depth: 0.0, bar: vector![0.5, 0.25, 0.25] };
        assert_eq!(shader.fragment(&fragment), FragmentOutput::Color(vector![127, 127, 127]));
    }

    #[test]
    fn flat_shader_uses_face_normal() {
        let model = single_triangle();
        let ctx = front_context();
        let mut shader = FlatShader::new(&model, &ctx);
        for corner in 0..3 {
            shader.vertex(0, corner);
        }
        let fragment = Fragment { x: 0, y: 0, depth: 0.0, bar: vector![1.0, 0.0, 0.0] };
        assert_eq!(shader.fragment(&fragment), FragmentOutput::Color(WHITE));
    }

    #[test]
    fn phong_highlight_faces_camera() {
        let (diffuse, specular) = phong(Vector3::z(), Vector3::z(), 10.0);
        assert_eq!(diffuse, 1.0);
        assert!((specular - 1.0).abs() < 1e-6);
        let (diffuse, _) = phong(Vector3::z(), -Vector3::z(), 10.0);
        assert_eq!(diffuse, 0.0);
    }

    #[test]
    fn darboux_without_tangent_map_keeps_vertex_normal() {
        let model = single_triangle();
        let ctx = front_context();
        let mut shader = DarbouxShader::new(&model, &ctx);
        for corner in 0..3 {
            shader.vertex(0, corner);
        }
        let bar = vector![1.0, 0.0, 0.0];
        let n = shader.perturbed_normal(bar, shader.varying_uv * bar);
        assert!((n - Vector3::z()).norm() < 1e-4);
    }
}
