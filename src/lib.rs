//! Small CPU renderer for triangle meshes: depth buffered rasterization in screen or clip space,
//! a family of shading models, shadow mapping and ambient occlusion.

pub mod config;
pub mod error;
pub mod logging;
pub mod scene;

pub use error::{Error, Result};
