//! SCTK protocol delegate implementations for [`WallpaperDaemon`].
//!
//! The interesting behaviour lives in [`CompositorHandler::frame`] (the
//! `done` callback contract from spec §4.8: a fired callback nulls the
//! output's pending slot and, if a redraw is owed, calls back into
//! [`super::mainloop::render_output`]) and in [`LayerShellHandler::configure`]
//! (records the output's size; the first real render happens on the next
//! main-loop iteration, not synchronously here).

use smithay_client_toolkit::{
    compositor::CompositorHandler,
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_seat,
    delegate_shm,
    output::{OutputHandler, OutputState},
    registry::ProvidesRegistryState,
    registry_handlers,
    seat::{Capability, SeatHandler, SeatState},
    shell::{
        WaylandSurface,
        wlr_layer::{LayerShellHandler, LayerSurface, LayerSurfaceConfigure},
    },
    shm::{Shm, ShmHandler},
};
use wayland_client::{
    Connection, Dispatch, QueueHandle,
    protocol::{wl_buffer, wl_output, wl_seat, wl_shm_pool, wl_surface},
};
use wayland_protocols::ext::idle_notify::v1::client::{
    ext_idle_notification_v1::{self, ExtIdleNotificationV1},
    ext_idle_notifier_v1::{self, ExtIdleNotifierV1},
};

use super::WallpaperDaemon;
use crate::buffer::BufferState;

impl CompositorHandler for WallpaperDaemon {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, surface: &wl_surface::WlSurface, _time: u32) {
        let Some(idx) = self.outputs.iter().position(|o| o.layer_surface.wl_surface() == surface) else {
            return;
        };
        self.outputs[idx].frame_callback_pending = false;
        if self.outputs[idx].redraw_needed || self.transition.is_active() {
            super::mainloop::render_output(self, qh, idx);
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WallpaperDaemon {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        if let Err(e) = super::outputs::create_layer_surface(self, output, qh) {
            log::error!("failed to create layer surface for new output: {e}");
        }
    }

    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        if let Some(info) = self.output_state.info(&output) {
            log::debug!(
                "output updated: {:?} {}x{} @ scale {}",
                info.name,
                info.logical_size.map(|(w, _)| w).unwrap_or(0),
                info.logical_size.map(|(_, h)| h).unwrap_or(0),
                info.scale_factor,
            );
        }
    }

    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        self.outputs.retain(|o| o.output != output);
    }
}

impl LayerShellHandler for WallpaperDaemon {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        log::info!("layer surface closed by compositor, shutting down");
        self.exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let (width, height) = configure.new_size;
        let Some(output_data) =
            self.outputs.iter_mut().find(|o| o.layer_surface.wl_surface() == layer.wl_surface())
        else {
            return;
        };
        log::info!("output {:?} configured at {width}x{height}", output_data.name);
        output_data.width = width;
        output_data.height = height;
        output_data.configured = true;
        output_data.redraw_needed = true;
    }
}

impl ProvidesRegistryState for WallpaperDaemon {
    fn registry(&mut self) -> &mut smithay_client_toolkit::registry::RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

impl SeatHandler for WallpaperDaemon {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, seat: wl_seat::WlSeat) {
        if self.idle_notification.is_none() {
            if let Some(notifier) = &self.idle_notifier {
                let notification = notifier.get_idle_notification(self.idle_pause_ms, &seat, qh, ());
                self.idle_notification = Some(notification);
            }
        }
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        _capability: Capability,
    ) {
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        _capability: Capability,
    ) {
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}
}

impl Dispatch<ExtIdleNotifierV1, ()> for WallpaperDaemon {
    fn event(
        _state: &mut Self,
        _proxy: &ExtIdleNotifierV1,
        _event: ext_idle_notifier_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ExtIdleNotificationV1, ()> for WallpaperDaemon {
    fn event(
        state: &mut Self,
        _proxy: &ExtIdleNotificationV1,
        event: ext_idle_notification_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            ext_idle_notification_v1::Event::Idled => super::mainloop::on_session_idled(state),
            ext_idle_notification_v1::Event::Resumed => super::mainloop::on_session_resumed(state),
            _ => {}
        }
    }
}

impl ShmHandler for WallpaperDaemon {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl Dispatch<wl_buffer::WlBuffer, std::sync::Arc<std::sync::Mutex<BufferState>>> for WallpaperDaemon {
    fn event(
        _state: &mut Self,
        _proxy: &wl_buffer::WlBuffer,
        event: <wl_buffer::WlBuffer as wayland_client::Proxy>::Event,
        data: &std::sync::Arc<std::sync::Mutex<BufferState>>,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            if let Ok(mut state) = data.lock() {
                state.busy = false;
            }
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for WallpaperDaemon {
    fn event(
        _state: &mut Self,
        _proxy: &wl_shm_pool::WlShmPool,
        _event: <wl_shm_pool::WlShmPool as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

delegate_compositor!(WallpaperDaemon);
delegate_output!(WallpaperDaemon);
delegate_layer!(WallpaperDaemon);
delegate_shm!(WallpaperDaemon);
delegate_seat!(WallpaperDaemon);
delegate_registry!(WallpaperDaemon);
