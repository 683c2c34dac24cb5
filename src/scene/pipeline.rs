//! Named shader pipelines: one or more passes over a model producing a final image.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::{imageops, DynamicImage};
use nalgebra::{vector, Vector3};

use super::buffer::{DepthBuffer, FrameBuffer, GrayBuffer};
use super::model::Model;
use super::occlusion::{bake_occlusion, BakeParams, HorizonAo};
use super::rasterizer;
use super::shader::{
    AoLookupShader, DarbouxShader, DepthShader, FlatShader, GouraudShader, NormalMappedShader,
    PhongShader, Shader, ShadowShader, TexturedShader, ToonShader, ZBufferShader,
};
use super::shadow::{ShadowMap, SHADOW_EPSILON};
use super::transform::{Camera, RenderContext};
use super::util::BLACK;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Flat,
    Gouraud,
    Toon,
    Textured,
    NormalMap,
    Darboux,
    Phong,
    Shadow,
    Depth,
    Occlusion,
    OcclusionTextured,
    BakedOcclusion,
}

impl Pipeline {
    pub const ALL: [Pipeline; 12] = [
        Pipeline::Flat,
        Pipeline::Gouraud,
        Pipeline::Toon,
        Pipeline::Textured,
        Pipeline::NormalMap,
        Pipeline::Darboux,
        Pipeline::Phong,
        Pipeline::Shadow,
        Pipeline::Depth,
        Pipeline::Occlusion,
        Pipeline::OcclusionTextured,
        Pipeline::BakedOcclusion,
    ];

    pub fn name(&self) -> &'static str {
        return match self {
            Pipeline::Flat => "flat",
            Pipeline::Gouraud => "gouraud",
            Pipeline::Toon => "toon",
            Pipeline::Textured => "textured",
            Pipeline::NormalMap => "normal_map",
            Pipeline::Darboux => "darboux",
            Pipeline::Phong => "phong",
            Pipeline::Shadow => "shadow",
            Pipeline::Depth => "depth",
            Pipeline::Occlusion => "occlusion",
            Pipeline::OcclusionTextured => "occlusion_textured",
            Pipeline::BakedOcclusion => "baked_occlusion",
        };
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(self.name());
    }
}

impl FromStr for Pipeline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        return match Pipeline::ALL.iter().find(|p| p.name() == s) {
            Some(pipeline) => Ok(*pipeline),
            None => Err(Error::UnknownPipeline(s.to_string())),
        };
    }
}

/// Everything a pipeline needs besides the model.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub camera: Camera,
    /// Direction towards the light, world space.
    pub light: Vector3<f32>,
    pub shadow_epsilon: f32,
    pub ao: HorizonAo,
    pub bake: BakeParams,
}

impl Default for RenderSettings {
    fn default() -> Self {
        return Self {
            width: 800,
            height: 800,
            camera: Camera { eye: vector![1.0, 1.0, 3.0], center: Vector3::zeros(), up: Vector3::y() },
            light: vector![1.0, 1.0, 1.0],
            shadow_epsilon: SHADOW_EPSILON,
            ao: HorizonAo::default(),
            bake: BakeParams::default(),
        };
    }
}

impl RenderSettings {
    pub fn context(&self) -> RenderContext {
        return RenderContext::for_camera(self.camera, self.light, self.width, self.height);
    }

    /// Orthographic context looking from the light towards the camera center.
    pub fn light_context(&self) -> RenderContext {
        // Zero light falls back to +z, the same default as a fresh context.
        let direction = self.light.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
        let up = if direction.cross(&self.camera.up).norm() < 1e-3 { Vector3::x() } else { self.camera.up };
        let light_camera = Camera { eye: self.camera.center + direction, center: self.camera.center, up };
        let mut ctx = RenderContext::for_camera(light_camera, self.light, self.width, self.height);
        ctx.set_projection(0.0);
        return ctx;
    }
}

/// Final image of a pipeline, bottom-left origin like every buffer.
#[derive(Debug, Clone)]
pub enum Output {
    Color(FrameBuffer),
    Gray(GrayBuffer),
}

impl Output {
    pub fn width(&self) -> u32 {
        return match self {
            Output::Color(frame) => frame.width(),
            Output::Gray(gray) => gray.width(),
        };
    }

    pub fn height(&self) -> u32 {
        return match self {
            Output::Color(frame) => frame.height(),
            Output::Gray(gray) => gray.height(),
        };
    }

    /// Top-left origin image, ready to be encoded or displayed.
    pub fn to_image(&self) -> DynamicImage {
        return match self {
            Output::Color(frame) => DynamicImage::ImageRgb8(imageops::flip_vertical(frame.as_image())),
            Output::Gray(gray) => DynamicImage::ImageLuma8(imageops::flip_vertical(&gray.to_image())),
        };
    }

    /// Encodes the image, format is picked from the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_image().save(path)?;
        return Ok(());
    }
}

/// Single pass of `shader` into a cleared frame and depth buffer of the configured size.
fn single_pass<S: Shader>(
    model: &Model,
    ctx: &RenderContext,
    settings: &RenderSettings,
    shader: &mut S,
) -> (FrameBuffer, DepthBuffer) {
    let mut frame = FrameBuffer::new(settings.width, settings.height);
    frame.clear(BLACK);
    let mut depth = DepthBuffer::new(settings.width, settings.height);
    rasterizer::render(model, ctx, shader, &mut frame, &mut depth);
    return (frame, depth);
}

fn color_pass<S: Shader>(model: &Model, ctx: &RenderContext, settings: &RenderSettings, mut shader: S) -> Output {
    return Output::Color(single_pass(model, ctx, settings, &mut shader).0);
}

/// Runs `pipeline` over the model.
pub fn run(pipeline: Pipeline, model: &Model, settings: &RenderSettings) -> Result<Output> {
    if settings.width == 0 || settings.height == 0 {
        return Err(Error::InvalidArgument(format!("frame size {}x{}", settings.width, settings.height)));
    }
    let ctx = settings.context();
    let output = match pipeline {
        Pipeline::Flat => color_pass(model, &ctx, settings, FlatShader::new(model, &ctx)),
        Pipeline::Gouraud => color_pass(model, &ctx, settings, GouraudShader::new(model, &ctx)),
        Pipeline::Toon => color_pass(model, &ctx, settings, ToonShader::new(model, &ctx)),
        Pipeline::Textured => color_pass(model, &ctx, settings, TexturedShader::new(model, &ctx)),
        Pipeline::NormalMap => color_pass(model, &ctx, settings, NormalMappedShader::new(model, &ctx)),
        Pipeline::Darboux => color_pass(model, &ctx, settings, DarbouxShader::new(model, &ctx)),
        Pipeline::Phong => color_pass(model, &ctx, settings, PhongShader::new(model, &ctx)),
        Pipeline::Depth => color_pass(model, &ctx, settings, DepthShader::new(model, &ctx)),
        Pipeline::Shadow => {
            let light_ctx = settings.light_context();
            let shadow = ShadowMap::render(model, &light_ctx, settings.width, settings.height)
                .with_epsilon(settings.shadow_epsilon);
            let mut shader = ShadowShader::new(model, &ctx, &shadow)?;
            let (frame, _) = single_pass(model, &ctx, settings, &mut shader);
            log::debug!(
                "shadow pass: {} lit, {} occluded fragments",
                shader.lit_fragments(),
                shader.occluded_fragments()
            );
            Output::Color(frame)
        }
        Pipeline::Occlusion => {
            let (_, depth) = single_pass(model, &ctx, settings, &mut ZBufferShader::new(model, &ctx));
            Output::Gray(settings.ao.estimate(&depth)?)
        }
        Pipeline::OcclusionTextured => {
            let (mut frame, _) = single_pass(model, &ctx, settings, &mut TexturedShader::new(model, &ctx));
            // Separate depth pass, the estimator is calibrated for camera space depth.
            let (_, camera_depth) = single_pass(model, &ctx, settings, &mut ZBufferShader::new(model, &ctx));
            frame.modulate(&settings.ao.estimate(&camera_depth)?);
            Output::Color(frame)
        }
        Pipeline::BakedOcclusion => {
            let occlusion = bake_occlusion(model, &settings.bake);
            color_pass(model, &ctx, settings, AoLookupShader::new(model, &ctx, &occlusion))
        }
    };
    log::info!("{} pipeline: {}x{} image", pipeline, output.width(), output.height());
    return Ok(output);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for pipeline in Pipeline::ALL {
            assert_eq!(pipeline.name().parse::<Pipeline>().unwrap(), pipeline);
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        match "wireframe".parse::<Pipeline>() {
            Err(Error::UnknownPipeline(name)) => assert_eq!(name, "wireframe"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_frame_is_rejected() {
        let model = Model::from_parts(vec![], vec![], vec![], vec![]);
        let settings = RenderSettings { width: 0, ..Default::default() };
        assert!(matches!(run(Pipeline::Flat, &model, &settings), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn light_parallel_to_up_still_has_a_basis() {
        let settings = RenderSettings { light: vector![0.0, 2.0, 0.0], ..Default::default() };
        let ctx = settings.light_context();
        assert!(ctx.model_view().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_light_still_has_a_light_view() {
        let settings = RenderSettings { light: Vector3::zeros(), ..Default::default() };
        let ctx = settings.light_context();
        assert!(ctx.model_view().iter().all(|v| v.is_finite()));
        assert!(ctx.light_direction().iter().all(|v| v.is_finite()));
    }
}
