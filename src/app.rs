use std::time;

use anyhow::Context;

use tiny_raster::config::Params;
use tiny_raster::scene::{pipeline, Model, Output};

/// Loads the model, runs the selected pipeline and writes the image.
pub fn run(params: Params) -> anyhow::Result<()> {
    let model_path = params.model_path();
    let model = Model::load(&model_path).with_context(|| format!("loading {}", model_path.display()))?;
    log::info!("{}: {} vertices, {} faces", model_path.display(), model.nverts(), model.nfaces());

    let time_begin = time::Instant::now();
    let output = pipeline::run(params.pipeline, &model, &params.render_settings())?;
    log::info!("rendered in {:.3}s", time_begin.elapsed().as_secs_f32());

    output.save(&params.output).with_context(|| format!("writing {}", params.output.display()))?;
    log::info!("wrote {}", params.output.display());

    if params.show {
        show(&output)?;
    }
    return Ok(());
}

#[cfg(not(feature = "preview"))]
fn show(_output: &Output) -> anyhow::Result<()> {
    log::warn!("--show ignored, built without the `preview` feature");
    return Ok(());
}

/// Helper, defining exit event to be an Escape key press.
#[cfg(feature = "preview")]
fn is_exit_event(window_event: show_image::event::WindowEvent) -> bool {
    use show_image::event;
    if let event::WindowEvent::KeyboardInput(event) = window_event {
        if event.input.key_code == Some(event::VirtualKeyCode::Escape) && event.input.state.is_released() {
            return true;
        }
    }
    return false;
}

/// Shows the image until the window is closed or Escape is released.
#[cfg(feature = "preview")]
fn show(output: &Output) -> anyhow::Result<()> {
    use show_image::{create_window, ImageInfo, ImageView, WindowOptions};

    let image = output.to_image().into_rgb8();
    let (width, height) = image.dimensions();
    let window_options = WindowOptions {
        size: Some([width, height]),
        ..Default::default()
    };
    let window = create_window("tiny_raster", window_options)?;
    window.set_image("image", ImageView::new(ImageInfo::rgb8(width, height), image.as_raw()))?;

    // The channel closes together with the window.
    for window_event in window.event_channel()? {
        if is_exit_event(window_event) {
            break;
        }
    }
    return Ok(());
}
