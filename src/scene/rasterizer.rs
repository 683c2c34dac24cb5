//! Triangle rasterization with a depth buffer.
//!
//! Two entry points, matching the two vertex conventions of [`RasterMode`]:
//! [`triangle_screen`] takes already divided screen positions and interpolates with screen-space
//! weights, [`triangle_clip`] takes clip-space positions and hands perspective-correct weights to
//! the fragment stage. Both clamp the bounding box to the buffers, reject pixels with a negative
//! weight, keep the fragment only if its depth is strictly greater than the stored one, and write
//! color and depth unless the shader discards.

use nalgebra as na;
use na::{vector, Matrix4, Vector2, Vector3, Vector4};

use super::buffer::{DepthBuffer, FrameBuffer};
use super::model::Model;
use super::shader::{Fragment, FragmentOutput, RasterMode, Shader};
use super::transform::RenderContext;

/// Triangles whose doubled signed area is below this are degenerate.
const DEGENERATE_EPSILON: f32 = 1e-2;

/// Weights returned for degenerate triangles, the negative one gets every pixel rejected.
const REJECTED: Vector3<f32> = Vector3::new(-1.0, 1.0, 1.0);

/// Pixel rectangle to scan, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    ll: (u32, u32), // lower left corner
    ur: (u32, u32), // upper right corner
}

/// Bounding box of the points clamped to a width x height image, None if it misses the image.
fn bounding_box(pts: &[Vector2<f32>; 3], width: u32, height: u32) -> Option<BoundingBox> {
    if width == 0 || height == 0 || pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return None;
    }
    let clamp = vector![(width - 1) as f32, (height - 1) as f32];
    let mut min = vector![f32::MAX, f32::MAX];
    let mut max = vector![f32::MIN, f32::MIN];
    for p in pts.iter() {
        for i in 0..2 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    if max.x < 0.0 || max.y < 0.0 || min.x > clamp.x || min.y > clamp.y {
        return None;
    }
    let ll = (min.x.max(0.0).ceil() as u32, min.y.max(0.0).ceil() as u32);
    let ur = (max.x.min(clamp.x).floor() as u32, max.y.min(clamp.y).floor() as u32);
    if ll.0 > ur.0 || ll.1 > ur.1 {
        return None;
    }
    return Some(BoundingBox { ll, ur });
}

/// Barycentric weights of p by solving [b - a, c - a] * [u, v]^t = p - a, weights are (1 - u - v, u, v).
pub fn barycentric_solve(pts: &[Vector2<f32>; 3], p: Vector2<f32>) -> Vector3<f32> {
    let ab = pts[1] - pts[0];
    let ac = pts[2] - pts[0];
    let ap = p - pts[0];
    let det = ab.x * ac.y - ac.x * ab.y;
    if det.abs() < DEGENERATE_EPSILON {
        return REJECTED;
    }
    let u = (ap.x * ac.y - ac.x * ap.y) / det;
    let v = (ab.x * ap.y - ap.x * ab.y) / det;
    return vector![1.0 - u - v, u, v];
}

/// Barycentric weights of p from the cross product of the x and y edge components.
pub fn barycentric_cross(pts: &[Vector2<f32>; 3], p: Vector2<f32>) -> Vector3<f32> {
    let s_x = vector![pts[2].x - pts[0].x, pts[1].x - pts[0].x, pts[0].x - p.x];
    let s_y = vector![pts[2].y - pts[0].y, pts[1].y - pts[0].y, pts[0].y - p.y];
    let u = s_x.cross(&s_y);
    if u.z.abs() < DEGENERATE_EPSILON {
        return REJECTED;
    }
    return vector![1.0 - (u.x + u.y) / u.z, u.y / u.z, u.x / u.z];
}

fn is_outside(bar: &Vector3<f32>) -> bool {
    return bar.x < 0.0 || bar.y < 0.0 || bar.z < 0.0;
}

/// Depth test, fragment call and write shared by both modes. Returns true if the pixel was written.
fn shade_pixel<S: Shader + ?Sized>(
    shader: &mut S,
    fragment: Fragment,
    frame: &mut FrameBuffer,
    depth: &mut DepthBuffer,
) -> bool {
    // Equal depth is not nearer, the incumbent stays.
    if !(fragment.depth > depth.get(fragment.x, fragment.y)) {
        return false;
    }
    return match shader.fragment(&fragment) {
        FragmentOutput::Color(color) => {
            depth.set(fragment.x, fragment.y, fragment.depth);
            frame.set(fragment.x, fragment.y, color);
            true
        }
        FragmentOutput::Discard => false,
    };
}

/// Rasterizes a triangle given by divided screen coordinates (x, y in pixels, z the depth).
/// Returns the number of pixels written.
pub fn triangle_screen<S: Shader + ?Sized>(
    pts: &[Vector4<f32>; 3],
    shader: &mut S,
    frame: &mut FrameBuffer,
    depth: &mut DepthBuffer,
) -> usize {
    let pts2 = [pts[0].xy(), pts[1].xy(), pts[2].xy()];
    let z_values = vector![pts[0].z, pts[1].z, pts[2].z];
    let bbox = match bounding_box(&pts2, frame.width().min(depth.width()), frame.height().min(depth.height())) {
        Some(bbox) => bbox,
        None => return 0,
    };

    let mut written = 0;
    for x in bbox.ll.0..=bbox.ur.0 {
        for y in bbox.ll.1..=bbox.ur.1 {
            let bar = barycentric_solve(&pts2, vector![x as f32, y as f32]);
            if is_outside(&bar) {
                continue;
            }
            let fragment = Fragment { x, y, depth: z_values.dot(&bar), bar };
            if shade_pixel(shader, fragment, frame, depth) {
                written += 1;
            }
        }
    }
    return written;
}

/// Rasterizes a triangle given in clip space, the viewport is applied here before the divide.
/// Returns the number of pixels written.
pub fn triangle_clip<S: Shader + ?Sized>(
    clip: &[Vector4<f32>; 3],
    viewport: &Matrix4<f32>,
    shader: &mut S,
    frame: &mut FrameBuffer,
    depth: &mut DepthBuffer,
) -> usize {
    let pts = [viewport * clip[0], viewport * clip[1], viewport * clip[2]];
    if pts.iter().any(|p| p.w.abs() < super::util::W_EPSILON) {
        return 0;
    }
    let pts2 = [pts[0].xy() / pts[0].w, pts[1].xy() / pts[1].w, pts[2].xy() / pts[2].w];
    let clip_z = vector![clip[0].z, clip[1].z, clip[2].z];
    let bbox = match bounding_box(&pts2, frame.width().min(depth.width()), frame.height().min(depth.height())) {
        Some(bbox) => bbox,
        None => return 0,
    };

    let mut written = 0;
    for x in bbox.ll.0..=bbox.ur.0 {
        for y in bbox.ll.1..=bbox.ur.1 {
            let bc_screen = barycentric_cross(&pts2, vector![x as f32, y as f32]);
            if is_outside(&bc_screen) {
                continue;
            }
            let bc_clip = vector![bc_screen.x / pts[0].w, bc_screen.y / pts[1].w, bc_screen.z / pts[2].w];
            let sum = bc_clip.sum();
            if !sum.is_finite() || sum.abs() < super::util::W_EPSILON {
                continue;
            }
            let bc_clip = bc_clip / sum;
            let fragment = Fragment { x, y, depth: clip_z.dot(&bc_clip), bar: bc_clip };
            if shade_pixel(shader, fragment, frame, depth) {
                written += 1;
            }
        }
    }
    return written;
}

/// Runs the vertex stage on the three corners of a face and rasterizes it in the shader's mode.
pub fn draw_face<S: Shader + ?Sized>(
    face: usize,
    viewport: &Matrix4<f32>,
    shader: &mut S,
    frame: &mut FrameBuffer,
    depth: &mut DepthBuffer,
) -> usize {
    let corners = [shader.vertex(face, 0), shader.vertex(face, 1), shader.vertex(face, 2)];
    return match shader.mode() {
        RasterMode::Screen => triangle_screen(&corners, shader, frame, depth),
        RasterMode::Clip => triangle_clip(&corners, viewport, shader, frame, depth),
    };
}

/// Draws every face of the model. Returns the number of pixels written.
pub fn render<S: Shader + ?Sized>(
    model: &Model,
    ctx: &RenderContext,
    shader: &mut S,
    frame: &mut FrameBuffer,
    depth: &mut DepthBuffer,
) -> usize {
    let mut written = 0;
    for face in 0..model.nfaces() {
        written += draw_face(face, ctx.viewport(), shader, frame, depth);
    }
    log::debug!("{:?} pass: {} faces, {} pixels written", shader.mode(), model.nfaces(), written);
    return written;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::util::Color;

    /// Writes a constant color and remembers the weights it was called with.
    struct Probe {
        mode: RasterMode,
        color: Color,
        corners: [Vector4<f32>; 3],
        weights: Vec<Vector3<f32>>,
        discard: bool,
    }

    impl Probe {
        fn new(mode: RasterMode, corners: [Vector4<f32>; 3]) -> Self {
            return Self { mode, color: vector![255, 0, 0], corners, weights: Vec::new(), discard: false };
        }
    }

    impl Shader for Probe {
        fn mode(&self) -> RasterMode {
            return self.mode;
        }

        fn vertex(&mut self, _face: usize, corner: usize) -> Vector4<f32> {
            return self.corners[corner];
        }

        fn fragment(&mut self, fragment: &Fragment) -> FragmentOutput {
            self.weights.push(fragment.bar);
            if self.discard {
                return FragmentOutput::Discard;
            }
            return FragmentOutput::Color(self.color);
        }
    }

    fn screen_triangle(z: f32) -> [Vector4<f32>; 3] {
        return [vector![2.0, 2.0, z, 1.0], vector![28.0, 5.0, z, 1.0], vector![10.0, 25.0, z, 1.0]];
    }

    #[test]
    fn solve_and_cross_agree() {
        let pts = [vector![2.0, 2.0], vector![28.0, 5.0], vector![10.0, 25.0]];
        for p in [vector![10.0, 10.0], vector![3.0, 3.0], vector![20.0, 8.0]] {
            let a = barycentric_solve(&pts, p);
            let b = barycentric_cross(&pts, p);
            assert!((a - b).norm() < 1e-5, "{} != {}", a, b);
        }
    }

    #[test]
    fn degenerate_weights_are_rejected() {
        let pts = [vector![0.0, 0.0], vector![5.0, 5.0], vector![10.0, 10.0]];
        assert!(is_outside(&barycentric_solve(&pts, vector![5.0, 5.0])));
        assert!(is_outside(&barycentric_cross(&pts, vector![5.0, 5.0])));
    }

    #[test]
    fn bounding_box_is_clamped() {
        let pts = [vector![-10.0, -4.0], vector![50.0, 3.5], vector![3.0, 80.0]];
        let bbox = bounding_box(&pts, 32, 16).unwrap();
        assert_eq!(bbox, BoundingBox { ll: (0, 0), ur: (31, 15) });
        let off = [vector![-10.0, -4.0], vector![-5.0, -3.0], vector![-1.0, -8.0]];
        assert_eq!(bounding_box(&off, 32, 16), None);
        let nan = [vector![f32::NAN, 0.0], vector![5.0, 3.0], vector![1.0, 8.0]];
        assert_eq!(bounding_box(&nan, 32, 16), None);
    }

    #[test]
    fn screen_weights_sum_to_one() {
        let corners = screen_triangle(1.0);
        let mut probe = Probe::new(RasterMode::Screen, corners);
        let mut frame = FrameBuffer::new(32, 32);
        let mut depth = DepthBuffer::new(32, 32);
        let written = triangle_screen(&corners, &mut probe, &mut frame, &mut depth);
        assert!(written > 100);
        assert_eq!(written, probe.weights.len());
        for bar in probe.weights.iter() {
            assert!((bar.sum() - 1.0).abs() < 1e-4);
            assert!(bar.iter().all(|w| *w >= 0.0));
        }
    }

    #[test]
    fn clip_weights_sum_to_one() {
        // Corners with different w, identity viewport so the divided coordinates are pixels.
        let corners = [
            vector![2.0, 2.0, 0.5, 1.0],
            vector![56.0, 10.0, 0.1, 2.0],
            vector![15.0, 37.5, -0.2, 1.5],
        ];
        let mut probe = Probe::new(RasterMode::Clip, corners);
        let mut frame = FrameBuffer::new(32, 32);
        let mut depth = DepthBuffer::new(32, 32);
        let written = triangle_clip(&corners, &Matrix4::identity(), &mut probe, &mut frame, &mut depth);
        assert!(written > 100);
        for bar in probe.weights.iter() {
            assert!((bar.sum() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn equal_depth_does_not_overwrite() {
        let corners = screen_triangle(1.0);
        let mut frame = FrameBuffer::new(32, 32);
        let mut depth = DepthBuffer::new(32, 32);
        let mut first = Probe::new(RasterMode::Screen, corners);
        let written = triangle_screen(&corners, &mut first, &mut frame, &mut depth);

        let mut second = Probe::new(RasterMode::Screen, corners);
        second.color = vector![0, 0, 255];
        assert_eq!(triangle_screen(&corners, &mut second, &mut frame, &mut depth), 0);
        assert!(second.weights.is_empty());
        assert_eq!(frame.get(10, 10), Some(vector![255, 0, 0]));

        let nearer = screen_triangle(2.0);
        let mut third = Probe::new(RasterMode::Screen, nearer);
        third.color = vector![0, 255, 0];
        assert_eq!(triangle_screen(&nearer, &mut third, &mut frame, &mut depth), written);
        assert_eq!(frame.get(10, 10), Some(vector![0, 255, 0]));
        assert_eq!(depth.get(10, 10), 2.0);
    }

    #[test]
    fn discard_leaves_buffers_untouched() {
        let corners = screen_triangle(1.0);
        let mut probe = Probe::new(RasterMode::Screen, corners);
        probe.discard = true;
        let mut frame = FrameBuffer::new(32, 32);
        let mut depth = DepthBuffer::new(32, 32);
        assert_eq!(triangle_screen(&corners, &mut probe, &mut frame, &mut depth), 0);
        assert!(!probe.weights.is_empty());
        assert!(depth.is_background(10, 10));
        assert_eq!(frame.get(10, 10), Some(vector![0, 0, 0]));
    }

    #[test]
    fn zero_w_triangle_is_skipped() {
        let corners = [vector![2.0, 2.0, 0.0, 0.0], vector![20.0, 3.0, 0.0, 1.0], vector![5.0, 20.0, 0.0, 1.0]];
        let mut probe = Probe::new(RasterMode::Clip, corners);
        let mut frame = FrameBuffer::new(32, 32);
        let mut depth = DepthBuffer::new(32, 32);
        assert_eq!(triangle_clip(&corners, &Matrix4::identity(), &mut probe, &mut frame, &mut depth), 0);
    }
}
