//! Hardware-accelerated video decoding via GStreamer.
//!
//! Decoding happens on GStreamer's own streaming thread; [`pipeline`]'s
//! `new_sample` callback deposits each decoded BGRA frame into a
//! [`crate::frame_buffer::FrameBuffer`], which is the only thing the render
//! thread touches.

mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;

use murkwall_common::{Result, WallpaperError};

use crate::frame_buffer::FrameBuffer;

/// Owns one GStreamer playback pipeline for a single output's video media.
pub struct VideoDecoder {
    pipeline: gst::Pipeline,
    path: PathBuf,
    width: u32,
    height: u32,
    paused: bool,
    loop_playback: bool,
}

impl VideoDecoder {
    /// Build and start a pipeline decoding `path` at `target_width` x
    /// `target_height`, depositing frames into `frame_buffer`.
    pub fn start(
        path: impl AsRef<Path>,
        target_width: u32,
        target_height: u32,
        muted: bool,
        loop_playback: bool,
        frame_buffer: Arc<FrameBuffer>,
    ) -> Result<Self> {
        pipeline::initialize_gstreamer();

        let path = path.as_ref();
        let (pipeline, app_sink) = pipeline::build_pipeline(path, target_width, target_height)
            .map_err(|e| WallpaperError::fatal(format!("failed to build decoder pipeline: {e}")))?;

        pipeline::configure_app_sink(&app_sink);
        pipeline::setup_frame_callback(&app_sink, target_width, target_height, frame_buffer);

        if muted {
            mute_audio(&pipeline);
        }

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| WallpaperError::fatal(format!("decoder pipeline failed to reach playing: {e}")))?;

        Ok(Self {
            pipeline,
            path: path.to_path_buf(),
            width: target_width,
            height: target_height,
            paused: false,
            loop_playback,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| WallpaperError::Recoverable(format!("failed to pause: {e}")))?;
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| WallpaperError::Recoverable(format!("failed to resume: {e}")))?;
        self.paused = false;
        Ok(())
    }

    /// Current playback position, in seconds.
    pub fn position_secs(&self) -> f64 {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(|t| t.nseconds() as f64 / 1_000_000_000.0)
            .unwrap_or(0.0)
    }

    /// Seek to an absolute position in seconds, used to restore a saved
    /// position on startup.
    pub fn seek_to_secs(&self, secs: f64) -> Result<()> {
        let time = gst::ClockTime::from_nseconds((secs.max(0.0) * 1_000_000_000.0) as u64);
        self.pipeline
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT, time)
            .map_err(|e| WallpaperError::Recoverable(format!("seek failed: {e}")))
    }

    /// Seek back to the start on end-of-stream. Falls back to a plain
    /// flushing seek if the cheaper segment-seek is rejected.
    pub fn seek_to_zero(&self) -> Result<()> {
        let zero = gst::ClockTime::ZERO;
        if self
            .pipeline
            .seek_simple(gst::SeekFlags::SEGMENT | gst::SeekFlags::FLUSH, zero)
            .is_ok()
        {
            return Ok(());
        }
        self.pipeline
            .seek_simple(gst::SeekFlags::FLUSH, zero)
            .map_err(|e| WallpaperError::Recoverable(format!("seek-to-zero failed: {e}")))
    }

    /// Poll the pipeline bus for an end-of-stream message. When
    /// `loop_playback` is set, seeks back to the start; otherwise pauses on
    /// the last decoded frame.
    pub fn poll_eos(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    if self.loop_playback {
                        if let Err(e) = self.seek_to_zero() {
                            log::warn!("failed to loop video {}: {e}", self.path.display());
                        }
                    } else if let Err(e) = self.pause() {
                        log::warn!("failed to pause video at end of stream {}: {e}", self.path.display());
                    }
                }
                gst::MessageView::Error(err) => {
                    log::warn!(
                        "decoder pipeline error for {}: {} ({:?})",
                        self.path.display(),
                        err.error(),
                        err.debug()
                    );
                }
                _ => {}
            }
        }
    }

    pub fn detected_fps(&self) -> Option<f64> {
        pipeline::detect_fps(&self.pipeline)
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        // Step the pipeline down gradually rather than jumping straight to
        // Null.
        let _ = self.pipeline.set_state(gst::State::Paused);
        let _ = self.pipeline.set_state(gst::State::Ready);
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn mute_audio(pipeline: &gst::Pipeline) {
    for element in pipeline.iterate_elements().into_iter().flatten() {
        if element.has_property("mute") {
            element.set_property("mute", true);
        }
    }
}
