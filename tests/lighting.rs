use image::GenericImageView;
use nalgebra::{point, vector, Point3, Vector2, Vector3};

use tiny_raster::scene::occlusion::{bake_occlusion, BakeParams, HorizonAo};
use tiny_raster::scene::pipeline::{self, Output, Pipeline, RenderSettings};
use tiny_raster::scene::rasterizer::render;
use tiny_raster::scene::shader::ShadowShader;
use tiny_raster::scene::shadow::ShadowMap;
use tiny_raster::scene::{Camera, Corner, DepthBuffer, FrameBuffer, Model};

fn quad(corners: [Point3<f32>; 4], first: usize) -> (Vec<Point3<f32>>, Vec<[Corner; 3]>) {
    let faces = vec![
        [Corner::new(first, first, 0), Corner::new(first + 1, first + 1, 0), Corner::new(first + 2, first + 2, 0)],
        [Corner::new(first, first, 0), Corner::new(first + 2, first + 2, 0), Corner::new(first + 3, first + 3, 0)],
    ];
    return (corners.to_vec(), faces);
}

fn ground() -> (Vec<Point3<f32>>, Vec<[Corner; 3]>) {
    return quad(
        [point![-1.0, 0.0, -1.0], point![1.0, 0.0, -1.0], point![1.0, 0.0, 1.0], point![-1.0, 0.0, 1.0]],
        0,
    );
}

fn uvs_for(positions: &[Point3<f32>]) -> Vec<Vector2<f32>> {
    return positions.iter().map(|p| vector![(p.x + 1.0) / 2.0, (p.z + 1.0) / 2.0]).collect();
}

fn ground_model() -> Model {
    let (positions, faces) = ground();
    let uvs = uvs_for(&positions);
    return Model::from_parts(positions, vec![Vector3::y()], uvs, faces);
}

fn ground_with_roof_model() -> Model {
    let (mut positions, mut faces) = ground();
    let (roof, roof_faces) = quad(
        [point![-0.3, 0.5, -0.3], point![0.3, 0.5, -0.3], point![0.3, 0.5, 0.3], point![-0.3, 0.5, 0.3]],
        4,
    );
    positions.extend(roof);
    faces.extend(roof_faces);
    let uvs = uvs_for(&positions);
    return Model::from_parts(positions, vec![Vector3::y()], uvs, faces);
}

fn settings_lit_from_above() -> RenderSettings {
    return RenderSettings {
        width: 128,
        height: 128,
        light: vector![0.0, 1.0, 0.0],
        ..Default::default()
    };
}

/// Runs the shadowed pass by hand and returns (lit, occluded) fragment counts.
fn shadow_counts(model: &Model, settings: &RenderSettings) -> (usize, usize) {
    let ctx = settings.context();
    let shadow = ShadowMap::render(model, &settings.light_context(), settings.width, settings.height);
    let mut shader = ShadowShader::new(model, &ctx, &shadow).unwrap();
    let mut frame = FrameBuffer::new(settings.width, settings.height);
    let mut depth = DepthBuffer::new(settings.width, settings.height);
    render(model, &ctx, &mut shader, &mut frame, &mut depth);
    return (shader.lit_fragments(), shader.occluded_fragments());
}

#[test]
fn plane_lit_from_above_has_no_self_shadow() {
    let (lit, occluded) = shadow_counts(&ground_model(), &settings_lit_from_above());
    assert!(lit > 200, "{} lit fragments", lit);
    assert_eq!(occluded, 0);
}

#[test]
fn hovering_roof_casts_a_shadow() {
    let (lit, occluded) = shadow_counts(&ground_with_roof_model(), &settings_lit_from_above());
    assert!(lit > 0);
    assert!(occluded > 20, "{} occluded fragments", occluded);
}

#[test]
fn facing_plane_is_fully_open() {
    let positions = vec![point![-1.0, -1.0, 0.0], point![1.0, -1.0, 0.0], point![1.0, 1.0, 0.0], point![-1.0, 1.0, 0.0]];
    let faces = vec![
        [Corner::new(0, 0, 0), Corner::new(1, 0, 0), Corner::new(2, 0, 0)],
        [Corner::new(0, 0, 0), Corner::new(2, 0, 0), Corner::new(3, 0, 0)],
    ];
    let model = Model::from_parts(positions, vec![Vector3::z()], vec![], faces);
    let settings = RenderSettings {
        width: 64,
        height: 64,
        camera: Camera { eye: vector![0.0, 0.0, 3.0], center: Vector3::zeros(), up: Vector3::y() },
        ao: HorizonAo { workers: 4, ..Default::default() },
        ..Default::default()
    };
    let ambient = match pipeline::run(Pipeline::Occlusion, &model, &settings).unwrap() {
        Output::Gray(ambient) => ambient,
        Output::Color(_) => panic!("occlusion pipeline should produce a gray image"),
    };
    assert_eq!(ambient.get(32, 32), 1.0);
    assert_eq!(ambient.get(0, 0), 0.0);
    assert!(ambient.as_slice().iter().all(|a| *a == 0.0 || *a == 1.0));
}

#[test]
fn baked_occlusion_of_open_plane() {
    let params = BakeParams { iterations: 16, texture_size: 16, frame_size: 64, epsilon: 1e-2, seed: 5 };
    let texture = bake_occlusion(&ground_model(), &params);
    assert_eq!((texture.width(), texture.height()), (16, 16));
    assert!(texture.as_slice().iter().all(|a| (0.0..=1.0).contains(a)));
    assert!(texture.as_slice().iter().any(|a| *a > 0.5));
}

#[test]
fn every_pipeline_runs_on_a_small_scene() {
    let model = ground_with_roof_model();
    let mut settings = RenderSettings { width: 48, height: 48, ..Default::default() };
    settings.bake = BakeParams { iterations: 2, texture_size: 8, frame_size: 32, ..Default::default() };
    for pipeline in Pipeline::ALL {
        let output = pipeline::run(pipeline, &model, &settings).unwrap();
        assert_eq!((output.width(), output.height()), (48, 48), "{}", pipeline);
        let image = output.to_image();
        assert_eq!((image.width(), image.height()), (48, 48));
    }
}
