//! Layer surface creation for newly discovered outputs.

use anyhow::Result;
use smithay_client_toolkit::shell::WaylandSurface;
use smithay_client_toolkit::shell::wlr_layer::{Anchor, KeyboardInteractivity, Layer};
use wayland_client::{QueueHandle, protocol::wl_output};

use super::types::{OutputData, WallpaperDaemon};

/// Create a background layer surface anchored to all edges of `output` and
/// push its bookkeeping onto `app_data.outputs`.
///
/// No buffer is attached here: the compositor must send the first
/// `configure` before we know the surface's size, which is where
/// [`super::event_handlers`] attaches a placeholder.
pub(super) fn create_layer_surface(
    app_data: &mut WallpaperDaemon,
    output: wl_output::WlOutput,
    qh: &QueueHandle<WallpaperDaemon>,
) -> Result<()> {
    let name = app_data.output_state.info(&output).and_then(|info| info.name);

    if let Some(filter) = &app_data.output_filter {
        if name.as_deref() != Some(filter.as_str()) {
            log::debug!("skipping output {name:?}: requested output is {filter:?}");
            return Ok(());
        }
    }

    let surface = app_data.compositor_state.create_surface(qh);
    let layer_surface = app_data.layer_shell.create_layer_surface(
        qh,
        surface,
        Layer::Background,
        Some("wallpaper"),
        Some(&output),
    );
    layer_surface.set_anchor(Anchor::all());
    layer_surface.set_exclusive_zone(-1);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);
    layer_surface.commit();

    let mut output_data = OutputData::new(output, layer_surface);
    output_data.name = name;
    log::info!("created layer surface for output {:?}", output_data.name);
    app_data.outputs.push(output_data);

    Ok(())
}
