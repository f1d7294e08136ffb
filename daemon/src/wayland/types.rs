//! Per-output state and the daemon's top-level SCTK delegate struct.

use std::path::PathBuf;
use std::time::Instant;
use std::sync::Arc;

use anyhow::Result;
use smithay_client_toolkit::{
    compositor::CompositorState, output::OutputState, registry::RegistryState,
    seat::SeatState,
    shell::wlr_layer::{LayerShell, LayerSurface}, shm::Shm,
};
use wayland_client::{QueueHandle, protocol::wl_output};
use wayland_protocols::ext::idle_notify::v1::client::{
    ext_idle_notification_v1::ExtIdleNotificationV1, ext_idle_notifier_v1::ExtIdleNotifierV1,
};

use murkwall_common::MediaKind;

use crate::buffer::ShmBuffer;
use crate::config::{PlaybackOptions, SaveStateMode};
use crate::frame_buffer::FrameBuffer;
use crate::gpu::{GpuTexture, Renderer, TextureCache};
use crate::transition::TransitionEngine;
use crate::video::VideoDecoder;

/// How many released buffers a per-output pool keeps warm before the
/// compositor's `Release` events are allowed to actually trim it.
const MAX_POOL_SIZE: usize = 3;

/// One physical Wayland output and everything tied to its layer surface.
///
/// The decoded source texture lives once in [`WallpaperDaemon::texture_cache`]
/// — every output samples the same frame — only the render target (whose
/// size follows this output) and the `wl_shm` presentation buffers are
/// per-output.
pub struct OutputData {
    pub(super) output: wl_output::WlOutput,
    pub(super) layer_surface: LayerSurface,
    pub(super) name: Option<String>,

    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) configured: bool,

    pub(super) redraw_needed: bool,
    pub(super) frame_callback_pending: bool,

    pub(super) buffer: Option<ShmBuffer>,
    pub(super) buffer_pool: Vec<ShmBuffer>,

    pub(super) render_target: Option<GpuTexture>,
}

impl OutputData {
    pub(super) fn new(output: wl_output::WlOutput, layer_surface: LayerSurface) -> Self {
        Self {
            output,
            layer_surface,
            name: None,
            width: 0,
            height: 0,
            configured: false,
            redraw_needed: true,
            frame_callback_pending: false,
            buffer: None,
            buffer_pool: Vec::new(),
            render_target: None,
        }
    }

    /// Reuse a released buffer of matching dimensions from the pool, or
    /// allocate a new one.
    pub(super) fn get_buffer(
        &mut self,
        shm: &Shm,
        width: u32,
        height: u32,
        qh: &QueueHandle<WallpaperDaemon>,
    ) -> Result<ShmBuffer> {
        if let Some(index) = self
            .buffer_pool
            .iter()
            .position(|buf| buf.width() == width && buf.height() == height && buf.is_released())
        {
            return Ok(self.buffer_pool.swap_remove(index));
        }
        ShmBuffer::new(shm.wl_shm(), width, height, qh)
    }

    /// Move the currently attached buffer into the pool before replacing it.
    pub(super) fn swap_buffer(&mut self, new_buffer: ShmBuffer) {
        if let Some(old_buffer) = self.buffer.take() {
            self.buffer_pool.push(old_buffer);
        }
        self.buffer = Some(new_buffer);
    }

    /// Drop released buffers down to [`MAX_POOL_SIZE`]; warn if the
    /// compositor still hasn't released enough of them to get under the cap.
    pub(super) fn cleanup_buffer_pool(&mut self) {
        let initial_size = self.buffer_pool.len();
        if initial_size <= MAX_POOL_SIZE {
            return;
        }

        let mut to_remove = initial_size - MAX_POOL_SIZE;
        self.buffer_pool.retain(|buf| {
            if to_remove > 0 && buf.is_released() {
                to_remove -= 1;
                false
            } else {
                true
            }
        });

        if self.buffer_pool.len() > MAX_POOL_SIZE {
            log::warn!(
                "output buffer pool has {} busy buffers (max {}), \
                 compositor may not be releasing buffers",
                self.buffer_pool.len(),
                MAX_POOL_SIZE
            );
        }
    }

    /// Ensure a render target matching this output's current dimensions
    /// exists, reallocating only when the size actually changed.
    pub(super) fn ensure_render_target(&mut self, renderer: &Renderer) -> Result<&GpuTexture> {
        let needs_alloc = match &self.render_target {
            Some(t) => t.width != self.width || t.height != self.height,
            None => true,
        };
        if needs_alloc {
            self.render_target = Some(renderer.create_render_target(self.width, self.height)?);
        }
        Ok(self.render_target.as_ref().expect("just ensured"))
    }
}

/// Aggregate object the SCTK event queue dispatches into. Holds one shared
/// GPU pipeline, texture cache, and transition engine: the media shown is
/// identical on every output, so none of that state needs to be duplicated
/// per-output.
pub struct WallpaperDaemon {
    pub(super) registry_state: RegistryState,
    pub(super) compositor_state: CompositorState,
    pub(super) layer_shell: LayerShell,
    pub(super) output_state: OutputState,
    pub(super) seat_state: SeatState,
    pub(super) shm: Shm,
    pub(super) outputs: Vec<OutputData>,

    /// `ext-idle-notify-v1` session-idle reporting; `None` when the
    /// compositor doesn't advertise the global or idle-triggered auto-pause
    /// is disabled (`idle_pause_secs == 0`).
    pub(super) idle_notifier: Option<ExtIdleNotifierV1>,
    pub(super) idle_notification: Option<ExtIdleNotificationV1>,
    pub(super) idle_pause_ms: u32,
    pub(super) paused_by_idle: bool,

    pub(super) renderer: Renderer,
    pub(super) texture_cache: TextureCache,
    pub(super) transition: TransitionEngine,

    pub(super) frame_buffer: Arc<FrameBuffer>,
    pub(super) decoder: Option<VideoDecoder>,

    /// Only attach layer surfaces to the output with this name, if set.
    pub(super) output_filter: Option<String>,
    pub(super) media_path: PathBuf,
    pub(super) media_kind: MediaKind,
    pub(super) options: PlaybackOptions,
    pub(super) fps: u32,
    pub(super) last_render: Option<Instant>,

    pub(super) save_state: SaveStateMode,
    pub(super) output_name_for_state: Option<String>,

    pub(super) exit: bool,
    pub(super) reload: bool,
}
