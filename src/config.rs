//! Command line configuration of the renderer binary.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use nalgebra::{vector, Vector3};

use crate::error::{Error, Result};
use crate::scene::occlusion::{BakeParams, HorizonAo};
use crate::scene::shadow::SHADOW_EPSILON;
use crate::scene::{Camera, Pipeline, RenderSettings};

pub const USAGE: &str = "\
usage: tiny_raster [options]
  -p <path>              OBJ file, or a directory holding <dir>/<dir>.obj
  -s <pipeline>          shading pipeline (flat, gouraud, toon, textured, normal_map, darboux,
                         phong, shadow, depth, occlusion, occlusion_textured, baked_occlusion)
  -o <file>              output image, format from the extension
  --size <W>x<H>         frame size, at most 16384 per side
  --eye <x,y,z>          camera position
  --center <x,y,z>       point the camera looks at
  --up <x,y,z>           camera up direction
  --light <x,y,z>        direction towards the light
  --shadow-epsilon <f>   shadow comparison tolerance
  --ao-samples <n>       directions rendered by baked_occlusion
  --seed <n>             random seed of baked_occlusion
  --show                 display the result (needs the `preview` feature)
  -v                     debug logging";

#[derive(Debug, Clone)]
pub struct Params {
    pub width: u32,
    pub height: u32,
    pub asset_path: PathBuf,
    pub pipeline: Pipeline,
    pub output: PathBuf,
    pub show: bool,
    pub verbose: bool,
    pub eye: Vector3<f32>,
    pub center: Vector3<f32>,
    pub up: Vector3<f32>,
    pub light: Vector3<f32>,
    pub shadow_epsilon: f32,
    pub ao_samples: u32,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        return Self {
            width: 800,
            height: 800,
            asset_path: PathBuf::from("assets/african_head"),
            pipeline: Pipeline::Textured,
            output: PathBuf::from("output.png"),
            show: false,
            verbose: false,
            eye: vector![1.0, 1.0, 3.0],
            center: vector![0.0, 0.0, 0.0],
            up: vector![0.0, 1.0, 0.0],
            light: vector![1.0, 1.0, 1.0],
            shadow_epsilon: SHADOW_EPSILON,
            ao_samples: 1000,
            seed: 0,
        };
    }
}

fn parse_number<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    return value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::InvalidArgument(format!("{} expects a number, got '{}'", flag, value)));
}

/// Largest accepted frame side, in pixels.
pub const MAX_FRAME_SIDE: u32 = 16384;

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| Error::InvalidArgument(format!("--size expects WxH, got '{}'", value)))?;
    let size = (parse_number::<u32>("--size", w)?, parse_number::<u32>("--size", h)?);
    if size.0 == 0 || size.1 == 0 {
        return Err(Error::InvalidArgument(format!("--size must be positive, got '{}'", value)));
    }
    if size.0 > MAX_FRAME_SIDE || size.1 > MAX_FRAME_SIDE {
        return Err(Error::InvalidArgument(format!(
            "--size sides are limited to {} pixels, got '{}'",
            MAX_FRAME_SIDE, value
        )));
    }
    return Ok(size);
}

fn parse_vector(flag: &str, value: &str) -> Result<Vector3<f32>> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidArgument(format!("{} expects x,y,z, got '{}'", flag, value)));
    }
    let mut v = Vector3::zeros();
    for i in 0..3 {
        v[i] = parse_number(flag, parts[i])?;
    }
    return Ok(v);
}

impl Params {
    /// Parses arguments, not including the program name.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut params = Params::default();
        let args: Vec<String> = args.into_iter().collect();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            // Flags without a value.
            match flag {
                "--show" => {
                    params.show = true;
                    i += 1;
                    continue;
                }
                "-v" => {
                    params.verbose = true;
                    i += 1;
                    continue;
                }
                _ => (),
            }
            let value = match args.get(i + 1) {
                Some(value) => value.as_str(),
                None => return Err(Error::InvalidArgument(format!("missing value after '{}'", flag))),
            };
            match flag {
                "-p" => params.asset_path = PathBuf::from(value),
                "-s" => params.pipeline = value.parse()?,
                "-o" => params.output = PathBuf::from(value),
                "--size" => {
                    let (width, height) = parse_size(value)?;
                    params.width = width;
                    params.height = height;
                }
                "--eye" => params.eye = parse_vector(flag, value)?,
                "--center" => params.center = parse_vector(flag, value)?,
                "--up" => params.up = parse_vector(flag, value)?,
                "--light" => params.light = parse_vector(flag, value)?,
                "--shadow-epsilon" => params.shadow_epsilon = parse_number(flag, value)?,
                "--ao-samples" => params.ao_samples = parse_number(flag, value)?,
                "--seed" => params.seed = parse_number(flag, value)?,
                _ => return Err(Error::InvalidArgument(format!("unknown option '{}'", flag))),
            }
            i += 2;
        }
        return Ok(params);
    }

    /// The OBJ file to load. A directory `d` stands for `d/<name of d>.obj`.
    pub fn model_path(&self) -> PathBuf {
        return resolve_model_path(&self.asset_path);
    }

    pub fn render_settings(&self) -> RenderSettings {
        return RenderSettings {
            width: self.width,
            height: self.height,
            camera: Camera { eye: self.eye, center: self.center, up: self.up },
            light: self.light,
            shadow_epsilon: self.shadow_epsilon,
            ao: HorizonAo::default(),
            bake: BakeParams { iterations: self.ao_samples, seed: self.seed, ..Default::default() },
        };
    }
}

fn resolve_model_path(path: &Path) -> PathBuf {
    if path.extension().is_some() || path.is_file() {
        return path.to_path_buf();
    }
    let stem = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    let mut file = path.join(stem);
    file.set_extension("obj");
    return file;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        return line.split_whitespace().map(String::from).collect();
    }

    #[test]
    fn defaults_without_arguments() {
        let params = Params::from_args(Vec::new()).unwrap();
        assert_eq!((params.width, params.height), (800, 800));
        assert_eq!(params.pipeline, Pipeline::Textured);
        assert!(!params.show);
    }

    #[test]
    fn parses_every_option() {
        let params = Params::from_args(args(
            "-p assets/diablo -s shadow -o out.tga --size 640x480 --eye 0,1,2 --light 1,0,0 \
             --shadow-epsilon 0.5 --ao-samples 12 --seed 3 --show -v",
        ))
        .unwrap();
        assert_eq!(params.asset_path, PathBuf::from("assets/diablo"));
        assert_eq!(params.pipeline, Pipeline::Shadow);
        assert_eq!(params.output, PathBuf::from("out.tga"));
        assert_eq!((params.width, params.height), (640, 480));
        assert_eq!(params.eye, vector![0.0, 1.0, 2.0]);
        assert_eq!(params.light, vector![1.0, 0.0, 0.0]);
        assert_eq!(params.shadow_epsilon, 0.5);
        assert_eq!(params.ao_samples, 12);
        assert_eq!(params.seed, 3);
        assert!(params.show && params.verbose);

        let settings = params.render_settings();
        assert_eq!(settings.bake.iterations, 12);
        assert_eq!(settings.camera.eye, params.eye);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let lines = [
            "--size 640",
            "--size 0x10",
            "--size 70000x70000",
            "--size 16385x1",
            "--eye 1,2",
            "-s wireframe",
            "--seed",
            "--bogus 1",
        ];
        for line in lines {
            assert!(Params::from_args(args(line)).is_err(), "{}", line);
        }
    }

    #[test]
    fn largest_frame_is_accepted() {
        assert_eq!(parse_size("16384x16384").unwrap(), (MAX_FRAME_SIDE, MAX_FRAME_SIDE));
    }

    #[test]
    fn directory_resolves_to_same_named_obj() {
        assert_eq!(resolve_model_path(Path::new("assets/diablo")), PathBuf::from("assets/diablo/diablo.obj"));
        assert_eq!(resolve_model_path(Path::new("head.obj")), PathBuf::from("head.obj"));
    }
}
