//! Software rasterization pipeline: transforms, buffers, shaders and the passes built on them.

pub mod buffer;
pub mod model;
pub mod occlusion;
pub mod pipeline;
pub mod rasterizer;
pub mod shader;
pub mod shadow;
pub mod transform;
pub mod util;

pub use buffer::{DepthBuffer, FrameBuffer, GrayBuffer};
pub use model::{Corner, Model};
pub use pipeline::{Output, Pipeline, RenderSettings};
pub use shader::{Fragment, FragmentOutput, RasterMode, Shader};
pub use transform::{Camera, RenderContext};
