use nalgebra as na;
use na::{vector, Matrix4, Vector3, Vector4};

/// Raw rgb8 color, as stored in the frame buffer.
pub type Color = Vector3<u8>;

pub const WHITE: Color = Vector3::new(255, 255, 255);
pub const BLACK: Color = Vector3::new(0, 0, 0);

/// Below this magnitude the homogeneous w coordinate is treated as zero.
pub const W_EPSILON: f32 = 1e-6;

/// Transformation of a point to homogenous coordinates.
pub fn embed_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a direction to homogenous coordinates, translation has no effect on it.
pub fn embed_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Transformation of a point from homogenous coordinates.
/// Returns None for points at infinity.
pub fn project_point(v: Vector4<f32>) -> Option<Vector3<f32>> {
    if v.w.abs() < W_EPSILON {
        return None;
    }
    return Some(vector![v.x / v.w, v.y / v.w, v.z / v.w]);
}

/// Transformation of a direction from homogenous coordinates.
pub fn project_vector(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x, v.y, v.z];
}

/// Inverse transpose of a matrix, which is the one to apply to normals.
pub fn invert_transpose(m: &Matrix4<f32>) -> Option<Matrix4<f32>> {
    return m.try_inverse().map(|inverse| inverse.transpose());
}

/// Utility for getting convex combination of 2 colors: t * color_1 + (1 - t) * color_2.
/// t is unrestricted, channels saturate.
pub fn color_blend(color_1: Color, color_2: Color, t: f32) -> Color {
    return vector![
        (t * color_1.x as f32 + (1.0 - t) * color_2.x as f32) as u8,
        (t * color_1.y as f32 + (1.0 - t) * color_2.y as f32) as u8,
        (t * color_1.z as f32 + (1.0 - t) * color_2.z as f32) as u8
    ];
}

/// Color scaled by intensity t.
pub fn color_scale(color: Color, t: f32) -> Color {
    return color_blend(color, BLACK, t);
}
