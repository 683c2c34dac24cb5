//! Ambient occlusion.
//!
//! [`HorizonAo`] works in screen space on a finished depth buffer: for every pixel it marches rays
//! in a few directions, keeps the steepest elevation towards a nearer sample on each ray, and turns
//! the mean remaining horizon into an ambient term.
//!
//! [`bake_occlusion`] works in texture space: it renders the model from many random directions
//! and averages, per texel, how often the surface was visible.

use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::{mpsc, Arc};

use nalgebra as na;
use na::{vector, Matrix2x3, Vector2, Vector3, Vector4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use threadpool::ThreadPool;

use super::buffer::{DepthBuffer, FrameBuffer, GrayBuffer, BACKGROUND_DEPTH};
use super::model::Model;
use super::rasterizer;
use super::shader::{DepthShader, Fragment, FragmentOutput, RasterMode, Shader};
use super::transform::{Camera, RenderContext};
use super::util::{embed_point, project_point};
use crate::error::{Error, Result};

/// Screen space horizon based ambient occlusion estimator.
#[derive(Debug, Clone)]
pub struct HorizonAo {
    /// Number of equally spaced ray directions around a pixel.
    pub directions: usize,
    /// Horizon search radius, in pixels.
    pub max_radius: f32,
    /// Exponent applied to the normalized mean horizon angle.
    pub contrast: f32,
    /// Threads the rows are spread across.
    pub workers: usize,
}

impl Default for HorizonAo {
    fn default() -> Self {
        return Self {
            directions: 8,
            max_radius: 1000.0,
            contrast: 100.0,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
    }
}

impl HorizonAo {
    /// Ambient term per pixel in [0, 1], 1 is fully open. Background pixels get 0.
    /// The depth buffer is only read, rows are estimated in parallel on a snapshot of it.
    /// A worker that dies leaves its rows missing, the whole estimate is then an error.
    pub fn estimate(&self, depth: &DepthBuffer) -> Result<GrayBuffer> {
        let estimator = self.clone();
        return self.estimate_rows(depth, move |depth, x, y| estimator.ambient_at(depth, x, y));
    }

    fn estimate_rows<F>(&self, depth: &DepthBuffer, per_pixel: F) -> Result<GrayBuffer>
    where
        F: Fn(&DepthBuffer, u32, u32) -> f32 + Send + Sync + 'static,
    {
        let (width, height) = (depth.width(), depth.height());
        let mut output = GrayBuffer::new(width, height);
        if width == 0 || height == 0 {
            return Ok(output);
        }

        let snapshot = Arc::new(depth.clone());
        let per_pixel = Arc::new(per_pixel);
        let workers = self.workers.max(1);
        let pool = ThreadPool::new(workers);
        let rows_per_job = ((height as usize + workers - 1) / workers).max(1) as u32;
        let (tx, rx) = mpsc::channel::<(u32, Vec<f32>)>();

        for y_begin in (0..height).step_by(rows_per_job as usize) {
            let y_end = (y_begin + rows_per_job).min(height);
            let depth = Arc::clone(&snapshot);
            let per_pixel = Arc::clone(&per_pixel);
            let tx = tx.clone();
            pool.execute(move || {
                for y in y_begin..y_end {
                    let row: Vec<f32> = (0..width).map(|x| per_pixel(&depth, x, y)).collect();
                    // Fails only once the receiver is dropped, nobody is waiting for the row then.
                    let _ = tx.send((y, row));
                }
            });
        }
        drop(tx);

        let mut rows_done = 0;
        for (y, row) in rx.iter() {
            output.set_row(y, &row);
            rows_done += 1;
        }
        if rows_done != height {
            return Err(Error::IncompletePass {
                pass: "ambient occlusion",
                completed: rows_done,
                expected: height,
            });
        }
        log::debug!("ambient occlusion {}x{} on {} threads", width, height, workers);
        return Ok(output);
    }

    /// Ambient term of a single pixel.
    pub fn ambient_at(&self, depth: &DepthBuffer, x: u32, y: u32) -> f32 {
        if depth.is_background(x, y) || self.directions == 0 {
            return 0.0;
        }
        let origin = vector![x as f32, y as f32];
        let origin_depth = depth.get(x, y);
        let step = 2.0 * PI / self.directions as f32;
        // Mean of (pi/2 - horizon) over the directions, normalized by pi/2.
        let mut horizon = 0.0;
        for i in 0..self.directions {
            let angle = step * i as f32;
            let direction = vector![angle.cos(), angle.sin()];
            horizon += self.max_elevation_angle(depth, origin, origin_depth, direction);
        }
        let open = 1.0 - horizon / (FRAC_PI_2 * self.directions as f32);
        return open.clamp(0.0, 1.0).powf(self.contrast);
    }

    /// Steepest elevation towards a nearer sample along a ray, never below 0.
    fn max_elevation_angle(
        &self,
        depth: &DepthBuffer,
        origin: Vector2<f32>,
        origin_depth: f32,
        direction: Vector2<f32>,
    ) -> f32 {
        let mut max_angle = 0.0f32;
        let mut t = 0.0f32;
        while t < self.max_radius {
            let current = origin + direction * t;
            t += 1.0;
            let sample = match depth.sample(current.x.round() as i32, current.y.round() as i32) {
                Some(sample) => sample,
                None => break,
            };
            let distance = (current - origin).norm();
            // Too close to the origin for a stable slope.
            if distance < 1.0 || sample == BACKGROUND_DEPTH {
                continue;
            }
            let elevation = ((sample - origin_depth) / distance).atan();
            if elevation.is_finite() {
                max_angle = max_angle.max(elevation);
            }
        }
        return max_angle;
    }
}

/// Element-wise incremental mean of equally sized samples.
///
/// Each update is `mean += (sample - mean) / n`, which stays in the range of the samples and does
/// not grow an unbounded running sum. Rounding to an output format is left to the consumer.
#[derive(Debug, Clone)]
pub struct RunningMean {
    count: u32,
    mean: Vec<f32>,
}

impl RunningMean {
    pub fn new(len: usize) -> Self {
        return Self { count: 0, mean: vec![0.0; len] };
    }

    /// Folds one sample in, `sample` must have the length given at construction.
    pub fn push(&mut self, sample: &[f32]) {
        self.count += 1;
        let n = self.count as f32;
        for (mean, value) in self.mean.iter_mut().zip(sample.iter()) {
            *mean += (value - *mean) / n;
        }
    }

    pub fn count(&self) -> u32 {
        return self.count;
    }

    pub fn mean(&self) -> &[f32] {
        return &self.mean[..];
    }
}

/// Settings of the texture space occlusion bake.
#[derive(Debug, Clone)]
pub struct BakeParams {
    /// Number of random light directions rendered.
    pub iterations: u32,
    /// Side of the square occlusion texture.
    pub texture_size: u32,
    /// Side of the square depth buffer each direction is rendered into.
    pub frame_size: u32,
    /// Tolerance of the visibility test, in screen depth units.
    pub epsilon: f32,
    pub seed: u64,
}

impl Default for BakeParams {
    fn default() -> Self {
        return Self {
            iterations: 1000,
            texture_size: 1024,
            frame_size: 800,
            epsilon: 1e-2,
            seed: 0,
        };
    }
}

/// Marks the texel under every fragment that is the nearest surface of `visible_depth`.
/// Always discards, the frame and depth buffers of its own pass stay untouched.
struct VisibilityShader<'a> {
    model: &'a Model,
    ctx: &'a RenderContext,
    visible_depth: &'a DepthBuffer,
    texture: &'a mut GrayBuffer,
    epsilon: f32,
    varying_uv: Matrix2x3<f32>,
}

impl Shader for VisibilityShader<'_> {
    fn mode(&self) -> RasterMode {
        return RasterMode::Screen;
    }

    fn vertex(&mut self, face: usize, corner: usize) -> Vector4<f32> {
        self.varying_uv.set_column(corner, &self.model.uv(face, corner));
        let screen = project_point(self.ctx.transform() * embed_point(self.model.vert(face, corner).coords));
        return match screen {
            Some(p) => vector![p.x, p.y, p.z, 1.0],
            None => Vector4::repeat(f32::NAN),
        };
    }

    fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
        if (self.visible_depth.get(fragment.x, fragment.y) - fragment.depth).abs() < self.epsilon {
            let (u, v) = self.texture.texel(self.varying_uv * fragment.bar);
            self.texture.set(u, v, 1.0);
        }
        return FragmentOutput::Discard;
    }
}

/// Uniformly distributed direction on the upper (y >= 0) unit hemisphere.
fn random_upper_direction(rng: &mut StdRng) -> Vector3<f32> {
    let z: f32 = rng.gen_range(-1.0..1.0);
    let phi: f32 = rng.gen_range(0.0..(2.0 * PI));
    let r = (1.0 - z * z).max(0.0).sqrt();
    return vector![r * phi.cos(), (r * phi.sin()).abs(), z];
}

/// Bakes a texture of how often each texel is directly visible from random directions above the
/// model. 1 means visible from everywhere, texels never hit stay 0.
pub fn bake_occlusion(model: &Model, params: &BakeParams) -> GrayBuffer {
    let size = params.texture_size;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut accumulated = RunningMean::new((size * size) as usize);
    let mut sample = GrayBuffer::new(size, size);
    let mut depth = DepthBuffer::new(params.frame_size, params.frame_size);
    let mut scratch_depth = DepthBuffer::new(params.frame_size, params.frame_size);
    let mut frame = FrameBuffer::new(params.frame_size, params.frame_size);

    for iteration in 1..=params.iterations {
        let eye = random_upper_direction(&mut rng);
        // Keep up away from the view direction, lookat has no answer for parallel vectors.
        let up = if eye.y.abs() > 0.99 { Vector3::x() } else { Vector3::y() };
        let camera = Camera { eye, center: Vector3::zeros(), up };
        let mut ctx = RenderContext::for_camera(camera, eye, params.frame_size, params.frame_size);
        ctx.set_projection(0.0);

        depth.clear();
        let mut depth_shader = DepthShader::new(model, &ctx);
        rasterizer::render(model, &ctx, &mut depth_shader, &mut frame, &mut depth);

        sample.as_mut_slice().fill(0.0);
        scratch_depth.clear();
        let mut visibility = VisibilityShader {
            model,
            ctx: &ctx,
            visible_depth: &depth,
            texture: &mut sample,
            epsilon: params.epsilon,
            varying_uv: Matrix2x3::zeros(),
        };
        rasterizer::render(model, &ctx, &mut visibility, &mut frame, &mut scratch_depth);
        accumulated.push(sample.as_slice());

        if iteration % 100 == 0 {
            log::info!("occlusion bake: {}/{} directions", iteration, params.iterations);
        }
    }

    let mut texture = GrayBuffer::new(size, size);
    texture.as_mut_slice().copy_from_slice(accumulated.mean());
    return texture;
}
