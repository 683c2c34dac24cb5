//! Per-pixel targets of a render pass.
//!
//! All buffers use a bottom-left origin, (0, 0) is the bottom left pixel. Images handed to the
//! `image` crate are top-left, so color output is flipped once right before it is encoded.

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{vector, Vector2};

use super::util::Color;

/// Stored depth of a pixel no surface was drawn to.
pub const BACKGROUND_DEPTH: f32 = f32::MIN;

/// One depth value per pixel, larger is nearer to the viewer.
#[derive(Debug, Clone)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let n_pixels = width as usize * height as usize;
        return Self {
            width,
            height,
            data: vec![BACKGROUND_DEPTH; n_pixels],
        };
    }

    pub fn width(&self) -> u32 {
        return self.width;
    }

    pub fn height(&self) -> u32 {
        return self.height;
    }

    /// Resets every pixel to "no surface seen".
    pub fn clear(&mut self) {
        self.data.fill(BACKGROUND_DEPTH);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        return x as usize + y as usize * self.width as usize;
    }

    /// Depth at pixel (x, y), coordinates must be in bounds.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        return self.data[self.index(x, y)];
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        let index = self.index(x, y);
        self.data[index] = depth;
    }

    /// Depth at a possibly out of bounds pixel.
    pub fn sample(&self, x: i32, y: i32) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        return Some(self.get(x as u32, y as u32));
    }

    pub fn is_background(&self, x: u32, y: u32) -> bool {
        return self.get(x, y) == BACKGROUND_DEPTH;
    }

    pub fn as_slice(&self) -> &[f32] {
        return &self.data[..];
    }
}

/// Color target of a render pass.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    image: RgbImage,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        return Self { image: RgbImage::new(width, height) };
    }

    pub fn width(&self) -> u32 {
        return self.image.width();
    }

    pub fn height(&self) -> u32 {
        return self.image.height();
    }

    pub fn clear(&mut self, color: Color) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgb([color.x, color.y, color.z]);
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let Rgb([r, g, b]) = *self.image.get_pixel(x, y);
        return Some(vector![r, g, b]);
    }

    /// Out of bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        self.image.put_pixel(x, y, Rgb([color.x, color.y, color.z]));
    }

    /// Multiplies every pixel by the matching scalar of `factors`, which must have the same size.
    pub fn modulate(&mut self, factors: &GrayBuffer) {
        for y in 0..self.height().min(factors.height()) {
            for x in 0..self.width().min(factors.width()) {
                let t = factors.get(x, y);
                let Rgb(channels) = self.image.get_pixel_mut(x, y);
                for channel in channels.iter_mut() {
                    *channel = (*channel as f32 * t) as u8;
                }
            }
        }
    }

    /// Stored pixels, bottom row first.
    pub fn as_image(&self) -> &RgbImage {
        return &self.image;
    }
}

/// Scalar image in [0, 1], used for occlusion output and occlusion textures.
#[derive(Debug, Clone)]
pub struct GrayBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl GrayBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        return Self::filled(width, height, 0.0);
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        return Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        };
    }

    pub fn width(&self) -> u32 {
        return self.width;
    }

    pub fn height(&self) -> u32 {
        return self.height;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        return x as usize + y as usize * self.width as usize;
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        return self.data[self.index(x, y)];
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    /// Copies a full row, `row` must be `width` long.
    pub fn set_row(&mut self, y: u32, row: &[f32]) {
        let start = self.index(0, y);
        self.data[start..start + self.width as usize].copy_from_slice(row);
    }

    pub fn as_slice(&self) -> &[f32] {
        return &self.data[..];
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        return &mut self.data[..];
    }

    /// Texel under texture coordinates uv in [0, 1]^2, v = 0 is the top row of the texture.
    pub fn texel(&self, uv: Vector2<f32>) -> (u32, u32) {
        return texel_coord(uv, self.width, self.height);
    }

    pub fn sample_uv(&self, uv: Vector2<f32>) -> f32 {
        let (x, y) = self.texel(uv);
        return self.get(x, y);
    }

    /// Grayscale image, rows in storage order.
    pub fn to_image(&self) -> GrayImage {
        let mut image = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let value = self.get(x, y).clamp(0.0, 1.0) * 255.0;
                image.put_pixel(x, y, Luma([value as u8]));
            }
        }
        return image;
    }
}

/// Pixel of a width x height texture under uv, clamped to the texture.
pub fn texel_coord(uv: Vector2<f32>, width: u32, height: u32) -> (u32, u32) {
    fn to_texel(t: f32, size: u32) -> u32 {
        if !t.is_finite() || t <= 0.0 {
            return 0;
        }
        return ((t * size as f32) as u32).min(size.saturating_sub(1));
    }
    return (to_texel(uv.x, width), to_texel(uv.y, height));
}
