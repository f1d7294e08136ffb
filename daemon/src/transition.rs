//! Time-driven, frame-pulled cross-fade between two images.
//!
//! The engine never touches pixels itself: `start` hands the outgoing GPU
//! texture to the Renderer's blend pass and lets the TextureCache allocate a
//! fresh handle for the incoming image; `tick` only computes the alpha pair
//! the blend shader needs for the current frame.

use std::time::{Duration, Instant};

use murkwall_common::{MediaKind, TransitionKind};

use crate::gpu::{GpuTexture, TextureCache};

pub const MIN_DURATION: f64 = 0.0;
pub const MAX_DURATION: f64 = 5.0;

/// idle <-> active state machine driving a single cross-fade.
pub struct TransitionEngine {
    enabled: bool,
    kind: TransitionKind,
    duration: Duration,
    start: Option<Instant>,
    outgoing: Option<GpuTexture>,
    alpha_old: f32,
    alpha_new: f32,
}

impl TransitionEngine {
    pub fn new(kind: TransitionKind, duration_secs: f64) -> Self {
        Self {
            enabled: !matches!(kind, TransitionKind::None),
            kind,
            duration: Duration::from_secs_f64(duration_secs.clamp(MIN_DURATION, MAX_DURATION)),
            start: None,
            outgoing: None,
            alpha_old: 0.0,
            alpha_new: 1.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    pub fn set_enabled(&mut self, kind: TransitionKind) {
        self.kind = kind;
        self.enabled = !matches!(kind, TransitionKind::None);
    }

    /// `0.0..=5.0`; out-of-range values are rejected by the caller before
    /// reaching here (see the IPC handler).
    pub fn set_duration_secs(&mut self, secs: f64) {
        self.duration = Duration::from_secs_f64(secs.clamp(MIN_DURATION, MAX_DURATION));
    }

    /// Current blend weights for this frame. `(1.0, 0.0)` when idle, meaning
    /// "draw the incoming texture alone".
    pub fn alphas(&self) -> (f32, f32) {
        (self.alpha_old, self.alpha_new)
    }

    pub fn outgoing(&self) -> Option<&GpuTexture> {
        self.outgoing.as_ref()
    }

    /// Attempt to begin a fade. No-op (returns `false`) unless transitions
    /// are enabled, the kind is `fade`, both the outgoing and incoming media
    /// are images, no transition is already active, and the cache holds an
    /// initialised texture to use as the outgoing frame.
    pub fn start(
        &mut self,
        new_media_kind: MediaKind,
        current_media_kind: MediaKind,
        cache: &mut TextureCache,
    ) -> bool {
        if self.is_active() {
            return false;
        }
        if !self.enabled || !matches!(self.kind, TransitionKind::Fade) {
            return false;
        }
        if new_media_kind != MediaKind::Image || current_media_kind != MediaKind::Image {
            return false;
        }
        let Some(outgoing) = cache.detach() else {
            return false;
        };

        self.outgoing = Some(outgoing);
        self.alpha_old = 1.0;
        self.alpha_new = 0.0;
        self.start = Some(Instant::now());
        true
    }

    /// Advance the fade to `now`, returning the new `(alpha_old, alpha_new)`
    /// pair. Releases the outgoing texture and returns to idle once the
    /// configured duration has elapsed.
    pub fn tick(&mut self, now: Instant) -> (f32, f32) {
        let Some(start) = self.start else {
            return (self.alpha_old, self.alpha_new);
        };

        let elapsed = now.saturating_duration_since(start);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0) as f32
        };

        self.alpha_new = progress;
        self.alpha_old = 1.0 - progress;

        if progress >= 1.0 {
            self.release();
        }

        (self.alpha_old, self.alpha_new)
    }

    /// Idempotent: releases the outgoing texture, if any, and returns to
    /// idle.
    pub fn cancel(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.start = None;
        self.outgoing = None;
        self.alpha_old = 0.0;
        self.alpha_new = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_rejects_when_disabled() {
        let mut engine = TransitionEngine::new(TransitionKind::None, 0.5);
        let mut cache = TextureCache::new();
        assert!(!engine.start(MediaKind::Image, MediaKind::Image, &mut cache));
    }

    #[test]
    fn start_rejects_video_media() {
        let mut engine = TransitionEngine::new(TransitionKind::Fade, 0.5);
        let mut cache = TextureCache::new();
        assert!(!engine.start(MediaKind::Video, MediaKind::Image, &mut cache));
        assert!(!engine.start(MediaKind::Image, MediaKind::Video, &mut cache));
    }

    #[test]
    fn start_rejects_without_resident_texture() {
        let mut engine = TransitionEngine::new(TransitionKind::Fade, 0.5);
        let mut cache = TextureCache::new();
        assert!(!engine.start(MediaKind::Image, MediaKind::Image, &mut cache));
    }

    #[test]
    fn tick_progress_is_monotonic_and_completes() {
        let mut engine = TransitionEngine::new(TransitionKind::Fade, 0.1);
        let t0 = Instant::now();
        let (old0, new0) = engine.tick(t0);
        assert_eq!((old0, new0), (0.0, 1.0)); // idle state reports no-op alphas

        engine.start = Some(t0);
        engine.outgoing = None;
        engine.alpha_old = 1.0;
        engine.alpha_new = 0.0;

        let (old_mid, new_mid) = engine.tick(t0 + Duration::from_millis(50));
        assert!(new_mid > 0.0 && new_mid < 1.0);
        assert!((old_mid + new_mid - 1.0).abs() < 1e-6);
        assert!(engine.is_active());

        let (old_end, new_end) = engine.tick(t0 + Duration::from_millis(200));
        assert_eq!(new_end, 1.0);
        assert_eq!(old_end, 0.0);
        assert!(!engine.is_active());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut engine = TransitionEngine::new(TransitionKind::Fade, 0.5);
        engine.cancel();
        engine.cancel();
        assert!(!engine.is_active());
    }

    #[test]
    fn duration_is_clamped_to_valid_range() {
        let mut engine = TransitionEngine::new(TransitionKind::Fade, 0.5);
        engine.set_duration_secs(100.0);
        assert_eq!(engine.duration_secs(), MAX_DURATION);
        engine.set_duration_secs(-5.0);
        assert_eq!(engine.duration_secs(), MIN_DURATION);
    }
}
