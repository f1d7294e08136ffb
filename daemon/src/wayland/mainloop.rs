//! The daemon's poll loop: multiplexes the Wayland connection, decoded video
//! frames, IPC commands, and process signals on one thread, and drives the
//! per-output render routine off the compositor's frame callbacks.

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use smithay_client_toolkit::compositor::CompositorState;
use smithay_client_toolkit::output::OutputState;
use smithay_client_toolkit::registry::RegistryState;
use smithay_client_toolkit::seat::SeatState;
use smithay_client_toolkit::shell::WaylandSurface;
use smithay_client_toolkit::shell::wlr_layer::LayerShell;
use smithay_client_toolkit::shm::Shm;
use wayland_client::{Connection, EventQueue};
use wayland_protocols::ext::idle_notify::v1::client::ext_idle_notifier_v1::ExtIdleNotifierV1;

use murkwall_common::{IpcCommand, MediaKind, TransitionKind};

use crate::commit_buffer;
use crate::config::{PlaybackOptions, SaveStateMode, Settings};
use crate::frame_buffer::FrameBuffer;
use crate::gpu::Renderer;
use crate::ipc_server::{self, IpcServer};
use crate::scaling::compute_scale;
use crate::signals::{SignalKind, SignalPipe};
use crate::state_store::{self, DurableState};
use crate::transition::{TransitionEngine, MAX_DURATION, MIN_DURATION};
use crate::video::VideoDecoder;
use crate::wallpaper_manager;
use crate::watchers::{WatcherEvent, WatcherHandle};

use super::types::WallpaperDaemon;

/// Run until a shutdown signal, an IPC `stop`, or a compositor disconnect.
/// Returns whether the caller should treat the exit as a reload (`SIGHUP`).
pub fn run(
    settings: Settings,
    frame_buffer: std::sync::Arc<FrameBuffer>,
    ipc: &mut IpcServer,
    watchers: &mut WatcherHandle,
    signals: &SignalPipe,
) -> Result<bool> {
    let conn = Connection::connect_to_env().context("connecting to the Wayland compositor")?;
    let (globals, mut event_queue) = wayland_client::globals::registry_queue_init(&conn)
        .context("initializing the Wayland registry")?;
    let qh = event_queue.handle();

    let renderer = Renderer::new().context("initializing the GPU renderer")?;
    renderer.capabilities().log_info();

    let restored = if matches!(settings.save_state, SaveStateMode::Restore) {
        state_store::state_dir().ok().and_then(|dir| {
            let path = state_store::state_file_path(&dir, settings.output.as_deref());
            state_store::load(&path).ok().flatten()
        })
    } else {
        None
    };

    let (media_path, media_kind) = match &restored {
        Some(state) => (PathBuf::from(&state.path), state.kind),
        None => (settings.media.clone(), MediaKind::of(&settings.media)),
    };
    let options = match &restored {
        Some(state) => PlaybackOptions::parse(&state.options, media_kind),
        None => settings.options,
    };

    let idle_notifier: Option<ExtIdleNotifierV1> = if settings.idle_pause_secs > 0 {
        match globals.bind::<ExtIdleNotifierV1, WallpaperDaemon, ()>(&qh, 1..=1, ()) {
            Ok(notifier) => {
                log::info!("ext-idle-notify-v1 bound, auto-pause after {}s idle", settings.idle_pause_secs);
                Some(notifier)
            }
            Err(e) => {
                log::warn!("ext-idle-notify-v1 not available ({e}), idle-triggered auto-pause disabled");
                None
            }
        }
    } else {
        None
    };

    let mut app_data = WallpaperDaemon {
        registry_state: RegistryState::new(&globals),
        compositor_state: CompositorState::bind(&globals, &qh)
            .context("compositor protocol not available")?,
        layer_shell: LayerShell::bind(&globals, &qh).context("layer-shell protocol not available")?,
        output_state: OutputState::new(&globals, &qh),
        seat_state: SeatState::new(&globals, &qh),
        shm: Shm::bind(&globals, &qh).context("wl_shm protocol not available")?,
        outputs: Vec::new(),
        idle_notifier,
        idle_notification: None,
        idle_pause_ms: (settings.idle_pause_secs.saturating_mul(1000)).min(u64::from(u32::MAX)) as u32,
        paused_by_idle: false,
        renderer,
        texture_cache: crate::gpu::TextureCache::new(),
        transition: TransitionEngine::new(settings.transition, settings.transition_duration),
        frame_buffer: frame_buffer.clone(),
        decoder: None,
        output_filter: settings.output.clone(),
        media_path,
        media_kind,
        options,
        fps: settings.fps,
        last_render: None,
        save_state: settings.save_state,
        output_name_for_state: settings.output.clone(),
        exit: false,
        reload: false,
    };

    // First roundtrip delivers `new_output` (creating layer surfaces); the
    // second picks up each surface's initial `configure`.
    event_queue.roundtrip(&mut app_data)?;
    event_queue.roundtrip(&mut app_data)?;

    load_media(&mut app_data, &app_data.media_path.clone(), restored.as_ref())?;

    let result = poll_loop(&mut app_data, &mut event_queue, &qh, ipc, watchers, signals);

    if matches!(app_data.save_state, SaveStateMode::Save) {
        persist_state(&app_data);
    }

    result.map(|()| app_data.reload)
}

fn poll_loop(
    app_data: &mut WallpaperDaemon,
    event_queue: &mut EventQueue<WallpaperDaemon>,
    qh: &wayland_client::QueueHandle<WallpaperDaemon>,
    ipc: &mut IpcServer,
    watchers: &mut WatcherHandle,
    signals: &SignalPipe,
) -> Result<()> {
    loop {
        event_queue.flush()?;

        let read_guard = event_queue.prepare_read();

        let timeout_ms = if app_data.transition.is_active() { 16 } else { 50 };

        let mut pollfds = [
            libc::pollfd { fd: conn_fd(&read_guard), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: app_data.frame_buffer.wakeup_fd().as_raw_fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: ipc.wakeup_fd().as_raw_fd(), events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: signals.fd().as_raw_fd(), events: libc::POLLIN, revents: 0 },
        ];

        let rc = unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms)
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                drop(read_guard);
                continue;
            }
            return Err(err).context("polling the main loop's file descriptors");
        }

        if pollfds[0].revents & libc::POLLIN != 0 {
            if let Some(guard) = read_guard {
                let _ = guard.read();
            }
        } else {
            drop(read_guard);
        }
        event_queue.dispatch_pending(app_data)?;

        if pollfds[1].revents & libc::POLLIN != 0 {
            app_data.frame_buffer.drain_wakeup();
            for idx in 0..app_data.outputs.len() {
                let output = &app_data.outputs[idx];
                if !output.configured || output.width == 0 || output.height == 0 {
                    continue;
                }
                if output.frame_callback_pending {
                    continue;
                }
                render_output(app_data, qh, idx);
            }
            for output in &mut app_data.outputs {
                if output.frame_callback_pending {
                    output.redraw_needed = true;
                }
            }
        }

        if pollfds[2].revents & libc::POLLIN != 0 {
            ipc.drain_wakeup();
        }
        for pending in ipc.drain_commands() {
            handle_ipc_command(app_data, pending);
        }

        if pollfds[3].revents & libc::POLLIN != 0 {
            match signals.drain() {
                Some(SignalKind::Shutdown) => {
                    app_data.exit = true;
                }
                Some(SignalKind::Reload) => {
                    app_data.exit = true;
                    app_data.reload = true;
                }
                None => {}
            }
        }

        for event in watchers.drain() {
            apply_watcher_event(app_data, event);
        }

        for idx in 0..app_data.outputs.len() {
            if should_redraw(app_data, idx) {
                render_output(app_data, qh, idx);
            }
        }

        if app_data.exit {
            return Ok(());
        }
    }
}

fn conn_fd(guard: &Option<wayland_client::backend::ReadEventsGuard>) -> std::os::fd::RawFd {
    guard.as_ref().map(|g| g.connection_fd().as_raw_fd()).unwrap_or(-1)
}

fn should_redraw(app_data: &WallpaperDaemon, idx: usize) -> bool {
    let output = &app_data.outputs[idx];
    if !output.configured || output.width == 0 || output.height == 0 {
        return false;
    }
    if output.frame_callback_pending {
        return false;
    }
    output.redraw_needed || app_data.transition.is_active()
}

/// The compositor's `ext-idle-notify-v1` session reported idle: pause
/// playback the same way a pauselist hit would, remembering that the pause
/// was idle-triggered so a manual `pause` in the meantime isn't clobbered by
/// the matching `Resumed` event.
pub(super) fn on_session_idled(app_data: &mut WallpaperDaemon) {
    let Some(decoder) = &mut app_data.decoder else { return };
    if decoder.is_paused() {
        return;
    }
    log::info!("compositor session idle, pausing playback");
    crate::log_and_continue!(decoder.pause(), "pause video for session idle");
    app_data.paused_by_idle = true;
}

/// The compositor's session resumed: only undo a pause this module started.
pub(super) fn on_session_resumed(app_data: &mut WallpaperDaemon) {
    if !app_data.paused_by_idle {
        return;
    }
    app_data.paused_by_idle = false;
    let Some(decoder) = &mut app_data.decoder else { return };
    log::info!("compositor session active again, resuming playback");
    crate::log_and_continue!(decoder.resume(), "resume video after session idle");
}

fn apply_watcher_event(app_data: &mut WallpaperDaemon, event: WatcherEvent) {
    let Some(decoder) = &mut app_data.decoder else { return };
    match event {
        WatcherEvent::Pause => {
            crate::log_and_continue!(decoder.pause(), "pause video for watcher");
        }
        WatcherEvent::Resume => {
            crate::log_and_continue!(decoder.resume(), "resume video for watcher");
        }
        WatcherEvent::Stop => {
            app_data.exit = true;
        }
    }
}

/// Load (or switch to) the given media path. Images upload straight to the
/// shared texture cache; videos (re)build an in-process GStreamer pipeline
/// feeding the shared `FrameBuffer`. See `DESIGN.md` for why video switches
/// rebuild in-process instead of re-executing the daemon.
fn load_media(
    app_data: &mut WallpaperDaemon,
    path: &Path,
    restored: Option<&DurableState>,
) -> Result<()> {
    let kind = MediaKind::of(path);
    app_data.decoder = None;
    app_data.frame_buffer.take();

    match kind {
        MediaKind::Image => {
            let image = wallpaper_manager::load_image(path)?;
            app_data.texture_cache.upload_rgba(
                app_data.renderer.device(),
                app_data.renderer.queue(),
                app_data.renderer.texture_bind_group_layout(),
                app_data.renderer.sampler(),
                image.width,
                image.height,
                &image.rgba,
            )?;
        }
        MediaKind::Video => {
            let (w, h) = first_output_dims(app_data).unwrap_or((1920, 1080));
            let mut decoder = VideoDecoder::start(
                path,
                w,
                h,
                app_data.options.no_audio,
                app_data.options.loop_playback,
                app_data.frame_buffer.clone(),
            )?;
            if let Some(fps) = decoder.detected_fps() {
                log::info!("detected {fps:.2} fps for {}", path.display());
            }
            if let Some(state) = restored {
                if state.path == path.to_string_lossy() {
                    crate::log_and_continue!(decoder.seek_to_secs(state.position), "seek to saved position");
                    if state.paused {
                        crate::log_and_continue!(decoder.pause(), "pause restored video");
                    }
                }
            }
            app_data.decoder = Some(decoder);
        }
    }

    app_data.media_path = path.to_path_buf();
    app_data.media_kind = kind;
    for output in &mut app_data.outputs {
        output.redraw_needed = true;
    }
    Ok(())
}

fn first_output_dims(app_data: &WallpaperDaemon) -> Option<(u32, u32)> {
    app_data
        .outputs
        .iter()
        .find(|o| o.width > 0 && o.height > 0)
        .map(|o| (o.width, o.height))
}

fn persist_state(app_data: &WallpaperDaemon) {
    let Ok(dir) = state_store::state_dir() else { return };
    let path = state_store::state_file_path(&dir, app_data.output_name_for_state.as_deref());
    let state = DurableState {
        output: app_data.output_name_for_state.clone(),
        path: app_data.media_path.to_string_lossy().into_owned(),
        kind: app_data.media_kind,
        options: app_data.options.to_token_string(),
        position: app_data.decoder.as_ref().map(|d| d.position_secs()).unwrap_or(0.0),
        paused: app_data.decoder.as_ref().map(|d| d.is_paused()).unwrap_or(false),
    };
    state_store::save(&path, &state);
}

/// Execute one already-dequeued command and answer its client.
///
/// `change` is the one command whose response isn't a single fixed string
/// computed up front: when it starts a cross-fade the response must reach
/// the client *before* the (possibly blocking) image load, so that path
/// sends its own response and skips the generic send below.
fn handle_ipc_command(app_data: &mut WallpaperDaemon, pending: crate::ipc_server::PendingCommand) {
    let crate::ipc_server::PendingCommand { command, mut client } = pending;

    match command {
        IpcCommand::Pause => {
            let response = match &mut app_data.decoder {
                None => "ERROR: no pipeline\n".to_string(),
                Some(decoder) => match decoder.pause() {
                    Ok(()) => "OK\n".to_string(),
                    Err(_) => "ERROR: failed to pause\n".to_string(),
                },
            };
            send(&mut client, &response);
        }
        IpcCommand::Resume => {
            let response = match &mut app_data.decoder {
                None => "ERROR: no pipeline\n".to_string(),
                Some(decoder) => match decoder.resume() {
                    Ok(()) => "OK\n".to_string(),
                    Err(_) => "ERROR: failed to resume\n".to_string(),
                },
            };
            send(&mut client, &response);
        }
        IpcCommand::Query => {
            let paused = app_data.decoder.as_ref().map(|d| d.is_paused()).unwrap_or(false);
            send(&mut client, &format_status(paused, app_data.media_kind, &app_data.media_path));
        }
        IpcCommand::Change(raw) => handle_change(app_data, &raw, &mut client),
        IpcCommand::Stop => {
            ipc_server::send_response_and_half_close(&mut client, "OK\n");
            app_data.exit = true;
        }
        IpcCommand::SetTransition(raw) => {
            let response = match TransitionKind::parse(raw.trim()) {
                Some(kind) => {
                    app_data.transition.set_enabled(kind);
                    format!("OK: transition set to {}\n", kind.as_str())
                }
                None => "ERROR: unknown transition type\n".to_string(),
            };
            send(&mut client, &response);
        }
        IpcCommand::GetTransition => {
            let response = format_transition(
                app_data.transition.kind(),
                app_data.transition.is_enabled(),
                app_data.transition.duration_secs(),
            );
            send(&mut client, &response);
        }
        IpcCommand::SetTransitionDuration(raw) => {
            let response = match parse_duration_arg(raw.trim()) {
                Some(secs) => {
                    app_data.transition.set_duration_secs(secs);
                    format!("OK: duration set to {secs:.2} seconds\n")
                }
                None => "ERROR: invalid duration (must be 0.0-5.0)\n".to_string(),
            };
            send(&mut client, &response);
        }
    }

    for output in &mut app_data.outputs {
        output.redraw_needed = true;
    }
}

/// `change <path>`: validates the argument, then either starts a cross-fade
/// (responding before the load) or persists+loads synchronously (responding
/// after). See `DESIGN.md` for why a video swap rebuilds the decoder
/// in-process instead of re-executing the daemon.
fn handle_change(app_data: &mut WallpaperDaemon, raw: &str, client: &mut std::os::unix::net::UnixStream) {
    let arg = raw.trim();
    if arg.is_empty() {
        send(client, "ERROR: missing path argument\n");
        return;
    }

    let path = PathBuf::from(arg);
    if !path.exists() {
        send(client, "ERROR: file not accessible\n");
        return;
    }

    let new_kind = MediaKind::of(&path);
    let transition_started =
        app_data.transition.start(new_kind, app_data.media_kind, &mut app_data.texture_cache);

    if transition_started {
        send(client, "OK: transition started\n");
    }

    match load_media(app_data, &path, None) {
        Ok(()) => {
            persist_state(app_data);
            if !transition_started {
                send(client, "OK\n");
            }
        }
        Err(e) => {
            log::error!("failed to change media to {}: {e}", path.display());
            if transition_started {
                app_data.transition.cancel();
            } else {
                send(client, "ERROR: file not accessible\n");
            }
        }
    }
}

fn send(client: &mut std::os::unix::net::UnixStream, text: &str) {
    crate::log_and_continue!(ipc_server::send_response(client, text), "send IPC response");
}

fn format_status(paused: bool, kind: MediaKind, path: &Path) -> String {
    let state = if paused { "paused" } else { "playing" };
    format!("STATUS: {state} {} {}\n", kind.as_str(), path.display())
}

fn format_transition(kind: TransitionKind, enabled: bool, duration_secs: f64) -> String {
    let enabled = if enabled { "enabled" } else { "disabled" };
    format!("TRANSITION: {} {enabled} {duration_secs:.2}\n", kind.as_str())
}

/// `(0, 5]` per the command table's prose, but its own error text says
/// `0.0-5.0`; matched against `TransitionEngine`'s own clamp range so a
/// rejected value here is never one `set_duration_secs` would have silently
/// clamped instead.
fn parse_duration_arg(arg: &str) -> Option<f64> {
    let value: f64 = arg.parse().ok()?;
    if value.is_finite() && (MIN_DURATION..=MAX_DURATION).contains(&value) {
        Some(value)
    } else {
        None
    }
}

pub(super) fn render_output(
    app_data: &mut WallpaperDaemon,
    qh: &wayland_client::QueueHandle<WallpaperDaemon>,
    idx: usize,
) {
    if let Some(frame) = app_data.frame_buffer.take() {
        crate::log_and_continue!(
            app_data.texture_cache.upload_bgra(
                app_data.renderer.device(),
                app_data.renderer.queue(),
                app_data.renderer.texture_bind_group_layout(),
                app_data.renderer.sampler(),
                frame.width,
                frame.height,
                &frame.data,
            ),
            "upload decoded video frame"
        );
    }

    if let Some(decoder) = &mut app_data.decoder {
        decoder.poll_eos();
    }

    if let Some(fps_period) = fps_period(app_data.fps) {
        if let Some(last) = app_data.last_render {
            if last.elapsed() < fps_period && !app_data.transition.is_active() {
                return;
            }
        }
    }

    let Some(source) = app_data.texture_cache.get() else { return };
    let (media_w, media_h) = (source.width, source.height);

    let output = &mut app_data.outputs[idx];
    let (out_w, out_h) = (output.width, output.height);
    let target = match output.ensure_render_target(&app_data.renderer) {
        Ok(t) => t,
        Err(e) => {
            log::error!("failed to allocate render target: {e}");
            return;
        }
    };

    let (scale, offset) =
        compute_scale(app_data.options.scale_mode, media_w, media_h, out_w, out_h, app_data.options.panscan);

    let render_result = if app_data.transition.is_active() {
        let (alpha_old, alpha_new) = app_data.transition.tick(Instant::now());
        if let Some(outgoing) = app_data.transition.outgoing() {
            app_data.renderer.blend(
                target, outgoing, source, scale, offset, scale, offset, alpha_old, alpha_new,
            )
        } else {
            app_data.renderer.present(target, source, scale, offset)
        }
    } else {
        app_data.renderer.present(target, source, scale, offset)
    };
    if let Err(e) = render_result {
        log::error!("failed to render output: {e}");
        return;
    }

    let argb = match app_data.renderer.read_to_argb(target) {
        Ok(data) => data,
        Err(e) => {
            log::error!("failed to read back render target: {e}");
            return;
        }
    };

    let output = &mut app_data.outputs[idx];
    let (width, height) = (output.width, output.height);
    let buffer = match output.get_buffer(&app_data.shm, width, height, qh) {
        Ok(b) => b,
        Err(e) => {
            log::error!("failed to allocate presentation buffer: {e}");
            return;
        }
    };
    let mut buffer = buffer;
    if let Err(e) = buffer.write_image_data(&argb) {
        log::error!("failed to write presentation buffer: {e}");
        return;
    }
    buffer.mark_busy();

    let layer_surface = output.layer_surface.clone();
    commit_buffer!(layer_surface, buffer, width, height, qh);

    output.swap_buffer(buffer);
    output.cleanup_buffer_pool();
    output.frame_callback_pending = true;
    output.redraw_needed = false;

    app_data.last_render = Some(Instant::now());
}

fn fps_period(fps: u32) -> Option<Duration> {
    if fps == 0 {
        None
    } else {
        Some(Duration::from_secs_f64(1.0 / fps as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_playing_for_images_and_pause_state_for_video() {
        let path = Path::new("/tmp/a.png");
        assert_eq!(
            format_status(false, MediaKind::Image, path),
            "STATUS: playing image /tmp/a.png\n"
        );
        assert_eq!(
            format_status(true, MediaKind::Video, path),
            "STATUS: paused video /tmp/a.png\n"
        );
    }

    #[test]
    fn transition_report_matches_command_table() {
        assert_eq!(
            format_transition(TransitionKind::Fade, true, 0.5),
            "TRANSITION: fade enabled 0.50\n"
        );
        assert_eq!(
            format_transition(TransitionKind::None, false, 0.0),
            "TRANSITION: none disabled 0.00\n"
        );
    }

    #[test]
    fn duration_arg_accepts_the_documented_range() {
        assert_eq!(parse_duration_arg("0.5"), Some(0.5));
        assert_eq!(parse_duration_arg("0"), Some(0.0));
        assert_eq!(parse_duration_arg("5"), Some(5.0));
    }

    #[test]
    fn duration_arg_rejects_out_of_range_or_unparseable() {
        assert_eq!(parse_duration_arg("10"), None);
        assert_eq!(parse_duration_arg("-1"), None);
        assert_eq!(parse_duration_arg("nope"), None);
        assert_eq!(parse_duration_arg("nan"), None);
    }
}
