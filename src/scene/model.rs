//! Triangle mesh with its textures, loaded from a Wavefront OBJ file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use nalgebra as na;
use na::{point, vector, Point3, Vector2, Vector3};
use obj::raw::object::Polygon;
use obj::raw::parse_obj;

use super::buffer::texel_coord;
use super::util::{Color, WHITE};
use crate::error::Result;

/// Indices of one face corner into the position, uv and normal tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Corner {
    pub position: usize,
    pub uv: usize,
    pub normal: usize,
}

impl Corner {
    pub fn new(position: usize, uv: usize, normal: usize) -> Self {
        return Self { position, uv, normal };
    }
}

/// Model geometry plus optional diffuse, normal and specular maps.
/// All queries are side-effect free.
#[derive(Debug, Clone, Default)]
pub struct Model {
    positions: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    faces: Vec<[Corner; 3]>,
    diffuse_map: Option<RgbImage>,
    normal_map: Option<RgbImage>,         // Normals in object space.
    tangent_normal_map: Option<RgbImage>, // Normals in the Darboux frame of the surface.
    specular_map: Option<GrayImage>,
}

impl Model {
    /// Builds a model from in-memory tables. Faces index into the tables, uv v = 0 is the top row of
    /// the textures. Empty uv or normal tables get a single default entry, so index 0 is always valid.
    pub fn from_parts(
        positions: Vec<Point3<f32>>,
        mut normals: Vec<Vector3<f32>>,
        mut uvs: Vec<Vector2<f32>>,
        faces: Vec<[Corner; 3]>,
    ) -> Self {
        if normals.is_empty() {
            normals.push(Vector3::z());
        }
        if uvs.is_empty() {
            uvs.push(Vector2::zeros());
        }
        return Self {
            positions,
            normals,
            uvs,
            faces,
            ..Default::default()
        };
    }

    /// Loads an OBJ file. Textures are looked up next to it as `<stem>_diffuse.tga`, `<stem>_nm.tga`,
    /// `<stem>_nm_tangent.tga` and `<stem>_spec.tga`; absent textures are fine, unreadable ones are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = parse_obj(BufReader::new(File::open(path)?))?;

        let positions = raw.positions.iter().map(|p| point![p.0, p.1, p.2]).collect();
        let normals = raw.normals.iter().map(|n| vector![n.0, n.1, n.2]).collect();
        // Flipping v, so that textures can be sampled with row 0 on top.
        let uvs = raw.tex_coords.iter().map(|t| vector![t.0, 1.0 - t.1]).collect();

        let mut faces = Vec::<[Corner; 3]>::new();
        for polygon in raw.polygons.iter() {
            let corners: Vec<Corner> = match polygon {
                Polygon::P(v) => v.iter().map(|&p| Corner::new(p, 0, 0)).collect(),
                Polygon::PT(v) => v.iter().map(|&(p, t)| Corner::new(p, t, 0)).collect(),
                Polygon::PN(v) => v.iter().map(|&(p, n)| Corner::new(p, 0, n)).collect(),
                Polygon::PTN(v) => v.iter().map(|&(p, t, n)| Corner::new(p, t, n)).collect(),
            };
            // Fan triangulation of anything that is not a triangle already.
            for i in 1..corners.len().saturating_sub(1) {
                faces.push([corners[0], corners[i], corners[i + 1]]);
            }
        }

        let mut model = Self::from_parts(positions, normals, uvs, faces);
        model.diffuse_map = load_texture(&texture_path(path, "_diffuse.tga"))?.map(|t| t.to_rgb8());
        model.normal_map = load_texture(&texture_path(path, "_nm.tga"))?.map(|t| t.to_rgb8());
        model.tangent_normal_map =
            load_texture(&texture_path(path, "_nm_tangent.tga"))?.map(|t| t.to_rgb8());
        model.specular_map = load_texture(&texture_path(path, "_spec.tga"))?.map(|t| t.to_luma8());

        log::info!(
            "loaded {}: {} vertices, {} faces",
            path.display(),
            model.positions.len(),
            model.faces.len()
        );
        return Ok(model);
    }

    pub fn with_diffuse_map(mut self, texture: RgbImage) -> Self {
        self.diffuse_map = Some(texture);
        return self;
    }

    pub fn with_normal_map(mut self, texture: RgbImage) -> Self {
        self.normal_map = Some(texture);
        return self;
    }

    pub fn with_tangent_normal_map(mut self, texture: RgbImage) -> Self {
        self.tangent_normal_map = Some(texture);
        return self;
    }

    pub fn with_specular_map(mut self, texture: GrayImage) -> Self {
        self.specular_map = Some(texture);
        return self;
    }

    pub fn nfaces(&self) -> usize {
        return self.faces.len();
    }

    pub fn nverts(&self) -> usize {
        return self.positions.len();
    }

    pub fn vert(&self, face: usize, corner: usize) -> Point3<f32> {
        return self.positions[self.faces[face][corner].position];
    }

    /// Unit vertex normal of a face corner.
    pub fn normal(&self, face: usize, corner: usize) -> Vector3<f32> {
        return self.normals[self.faces[face][corner].normal].normalize();
    }

    pub fn uv(&self, face: usize, corner: usize) -> Vector2<f32> {
        return self.uvs[self.faces[face][corner].uv];
    }

    pub fn has_normal_map(&self) -> bool {
        return self.normal_map.is_some();
    }

    /// Diffuse color at uv, white without a diffuse map.
    pub fn diffuse(&self, uv: Vector2<f32>) -> Color {
        return match &self.diffuse_map {
            Some(texture) => rgb_at_uv(texture, uv),
            None => WHITE,
        };
    }

    /// Object space normal from the normal map, +z without one.
    pub fn normal_at_uv(&self, uv: Vector2<f32>) -> Vector3<f32> {
        return match &self.normal_map {
            Some(texture) => decode_normal(rgb_at_uv(texture, uv)),
            None => Vector3::z(),
        };
    }

    /// Normal in the Darboux frame, +z (the unperturbed surface normal) without a tangent map.
    pub fn tangent_normal_at_uv(&self, uv: Vector2<f32>) -> Vector3<f32> {
        return match &self.tangent_normal_map {
            Some(texture) => decode_normal(rgb_at_uv(texture, uv)),
            None => Vector3::z(),
        };
    }

    /// Specular exponent at uv, 1 without a specular map.
    pub fn specular(&self, uv: Vector2<f32>) -> f32 {
        return match &self.specular_map {
            Some(texture) => {
                let (x, y) = texel_coord(uv, texture.width(), texture.height());
                texture.get_pixel(x, y).0[0] as f32
            }
            None => 1.0,
        };
    }
}

/// Path of a texture stored next to the model: "assets/head.obj" + "_nm.tga" -> "assets/head_nm.tga".
fn texture_path(model_path: &Path, suffix: &str) -> PathBuf {
    let stem = model_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    return model_path.with_file_name(format!("{}{}", stem, suffix));
}

fn load_texture(path: &Path) -> Result<Option<DynamicImage>> {
    if !path.exists() {
        log::warn!("texture {} not found, using default", path.display());
        return Ok(None);
    }
    let texture = image::open(path)?;
    log::info!("loaded texture {} ({}x{})", path.display(), texture.width(), texture.height());
    return Ok(Some(texture));
}

fn rgb_at_uv(texture: &RgbImage, uv: Vector2<f32>) -> Color {
    let (x, y) = texel_coord(uv, texture.width(), texture.height());
    let pixel = texture.get_pixel(x, y).0;
    return vector![pixel[0], pixel[1], pixel[2]];
}

/// Color channels [0, 255] to normal coordinates [-1, 1].
fn decode_normal(color: Color) -> Vector3<f32> {
    let n = color.map(|c| c as f32 / 255.0 * 2.0 - 1.0);
    if n.norm() < f32::EPSILON {
        return Vector3::z();
    }
    return n.normalize();
}
