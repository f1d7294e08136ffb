//! Configuration layer: built-in defaults < TOML config file < CLI flags.
//!
//! Environment variables (`XDG_STATE_HOME`, `HOME`, `WAYLAND_DISPLAY`) sit
//! above all three but only ever affect path resolution (state directory,
//! socket fallback) — see [`crate::state_store`] and
//! `murkwall_common::get_socket_path`, which already consult them directly.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use murkwall_common::{MediaKind, ScaleMode, TransitionKind};

use crate::watchers::WatcherConfig;

/// Command-line surface consumed by the daemon's bootstrap.
#[derive(Parser, Debug, Clone)]
#[command(name = "murkwalld", about = "Wayland layer-shell wallpaper daemon")]
pub struct Cli {
    /// Output to attach to (e.g. `eDP-1`). Unset attaches to every output.
    #[arg(long)]
    pub output: Option<String>,

    /// Image or video file to display.
    pub media: PathBuf,

    /// Space-separated option tokens: no-audio, mute, loop, fill, stretch,
    /// original, panscan=FLOAT.
    #[arg(long)]
    pub options: Option<String>,

    /// Frame-rate cap in frames per second: 30, 60, or 100.
    #[arg(long)]
    pub fps: Option<u32>,

    /// Path to the IPC control socket. Defaults to the XDG runtime dir.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Initial transition kind.
    #[arg(long, value_parser = ["none", "fade"])]
    pub transition: Option<String>,

    /// Transition duration in seconds, 0.0 through 5.0.
    #[arg(long)]
    pub transition_duration: Option<f64>,

    /// Cache size hint in megabytes; 0 disables the hint.
    #[arg(long)]
    pub cache_size_mb: Option<u64>,

    /// Persist playback state on exit (the default).
    #[arg(long, conflicts_with_all = ["restore", "no_save_state"])]
    pub save_state: bool,

    /// Restore previously saved state for this output on startup.
    #[arg(long, conflicts_with_all = ["save_state", "no_save_state"])]
    pub restore: bool,

    /// Never read or write the durable state file.
    #[arg(long, conflicts_with_all = ["save_state", "restore"])]
    pub no_save_state: bool,

    /// Path to the small helper binary used to re-exec the process across a
    /// video `change` restart.
    #[arg(long)]
    pub holder: Option<PathBuf>,

    /// Path to a TOML config file, overriding the default location.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated process names whose presence stops the daemon.
    #[arg(long)]
    pub stoplist: Option<String>,

    /// Comma-separated process names whose presence pauses playback.
    #[arg(long)]
    pub pauselist: Option<String>,

    /// Auto-pause playback after this many seconds of compositor-reported
    /// session idle (via ext-idle-notify-v1, where the compositor supports
    /// it). 0 disables idle-triggered auto-pause.
    #[arg(long)]
    pub idle_pause_secs: Option<u64>,
}

/// What the daemon should do with durable per-output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStateMode {
    Save,
    Restore,
    Disabled,
}

/// Parsed playback options bag (the CLI/IPC `options` string).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub no_audio: bool,
    pub loop_playback: bool,
    pub scale_mode: ScaleMode,
    pub panscan: f32,
}

impl PlaybackOptions {
    /// Defaults depend on media kind: fill for images, panscan for video.
    /// `loop_playback` defaults off; the `loop` token turns it on.
    pub fn default_for(kind: MediaKind) -> Self {
        Self {
            no_audio: false,
            loop_playback: false,
            scale_mode: match kind {
                MediaKind::Image => ScaleMode::Fill,
                MediaKind::Video => ScaleMode::Panscan,
            },
            panscan: 1.0,
        }
    }

    /// Parse a whitespace/comma-separated token string against `kind`'s
    /// defaults. Unknown tokens are logged and ignored rather than
    /// rejected — the options bag is best-effort, not validated input.
    pub fn parse(tokens: &str, kind: MediaKind) -> Self {
        let mut options = Self::default_for(kind);
        for token in tokens.split([' ', ',']).filter(|t| !t.is_empty()) {
            match token {
                "no-audio" | "mute" => options.no_audio = true,
                "loop" => options.loop_playback = true,
                "fill" => options.scale_mode = ScaleMode::Fill,
                "stretch" => options.scale_mode = ScaleMode::Stretch,
                "original" => options.scale_mode = ScaleMode::Original,
                _ if token.starts_with("panscan=") => {
                    match token["panscan=".len()..].parse::<f32>() {
                        Ok(value) if value > 0.0 && value <= 1.0 => {
                            options.scale_mode = ScaleMode::Panscan;
                            options.panscan = value;
                        }
                        _ => log::warn!("ignoring invalid panscan value in options: {token}"),
                    }
                }
                other => log::warn!("ignoring unknown option token: {other}"),
            }
        }
        options
    }

    /// Render back to the token-string form `state_store`/IPC persist, for
    /// round-tripping through `DurableState::options`.
    pub fn to_token_string(&self) -> String {
        let mut tokens = Vec::new();
        if self.no_audio {
            tokens.push("no-audio".to_string());
        }
        if self.loop_playback {
            tokens.push("loop".to_string());
        }
        match self.scale_mode {
            ScaleMode::Fill => tokens.push("fill".to_string()),
            ScaleMode::Stretch => tokens.push("stretch".to_string()),
            ScaleMode::Original => tokens.push("original".to_string()),
            ScaleMode::Panscan => tokens.push(format!("panscan={}", self.panscan)),
        }
        tokens.join(" ")
    }
}

/// TOML-backed configuration file, `$XDG_CONFIG_HOME/murkwall/config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_transition")]
    pub transition: String,

    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,

    #[serde(default)]
    pub cache_size_mb: u64,

    #[serde(default)]
    pub socket: Option<PathBuf>,

    #[serde(default)]
    pub holder: Option<PathBuf>,

    #[serde(default)]
    pub stoplist: Vec<String>,

    #[serde(default)]
    pub pauselist: Vec<String>,

    #[serde(default = "default_idle_pause_secs")]
    pub idle_pause_secs: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            transition: default_transition(),
            transition_duration: default_transition_duration(),
            cache_size_mb: 0,
            socket: None,
            holder: None,
            stoplist: Vec::new(),
            pauselist: Vec::new(),
            idle_pause_secs: default_idle_pause_secs(),
        }
    }
}

fn default_fps() -> u32 {
    60
}
fn default_transition() -> String {
    "fade".to_string()
}
fn default_transition_duration() -> f64 {
    0.5
}
fn default_idle_pause_secs() -> u64 {
    300
}

impl Config {
    /// Load from the default location, falling back to built-in defaults
    /// if no file exists there.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        log::info!("loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("failed to determine config directory")?;
        Ok(dir.join("murkwall").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.general.fps, 30 | 60 | 100) {
            anyhow::bail!("invalid fps (must be 30, 60, or 100): {}", self.general.fps);
        }
        if TransitionKind::parse(&self.general.transition).is_none() {
            anyhow::bail!("invalid transition kind: {}", self.general.transition);
        }
        if !(0.0..=5.0).contains(&self.general.transition_duration) {
            anyhow::bail!(
                "invalid transition duration (must be 0.0-5.0): {}",
                self.general.transition_duration
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
        }
    }
}

/// Fully resolved runtime settings: file defaults overridden by whatever the
/// CLI actually set.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output: Option<String>,
    pub media: PathBuf,
    pub options: PlaybackOptions,
    pub fps: u32,
    pub socket: PathBuf,
    pub transition: TransitionKind,
    pub transition_duration: f64,
    pub cache_size_mb: u64,
    pub save_state: SaveStateMode,
    pub holder: Option<PathBuf>,
    pub watchers: WatcherConfig,
    /// 0 disables idle-triggered auto-pause.
    pub idle_pause_secs: u64,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let fps = cli.fps.unwrap_or(config.general.fps);
        if !matches!(fps, 30 | 60 | 100) {
            anyhow::bail!("invalid --fps (must be 30, 60, or 100): {fps}");
        }

        let transition_name = cli
            .transition
            .clone()
            .unwrap_or_else(|| config.general.transition.clone());
        let transition = TransitionKind::parse(&transition_name)
            .with_context(|| format!("invalid --transition: {transition_name}"))?;

        let transition_duration = cli
            .transition_duration
            .unwrap_or(config.general.transition_duration);
        if !(0.0..=5.0).contains(&transition_duration) {
            anyhow::bail!("invalid --transition-duration (must be 0.0-5.0): {transition_duration}");
        }

        let cache_size_mb = cli.cache_size_mb.unwrap_or(config.general.cache_size_mb);

        let socket = cli
            .socket
            .clone()
            .or_else(|| config.general.socket.clone())
            .unwrap_or_else(murkwall_common::get_socket_path);

        let holder = cli.holder.clone().or_else(|| config.general.holder.clone());

        let save_state = if cli.restore {
            SaveStateMode::Restore
        } else if cli.no_save_state {
            SaveStateMode::Disabled
        } else {
            SaveStateMode::Save
        };

        let kind = MediaKind::of(&cli.media);
        let options = match &cli.options {
            Some(tokens) => PlaybackOptions::parse(tokens, kind),
            None => PlaybackOptions::default_for(kind),
        };

        let stoplist = cli
            .stoplist
            .as_deref()
            .map(parse_name_list)
            .unwrap_or_else(|| config.general.stoplist.clone());
        let pauselist = cli
            .pauselist
            .as_deref()
            .map(parse_name_list)
            .unwrap_or_else(|| config.general.pauselist.clone());

        let idle_pause_secs = cli.idle_pause_secs.unwrap_or(config.general.idle_pause_secs);

        Ok(Self {
            output: cli.output.clone(),
            media: cli.media.clone(),
            options,
            fps,
            socket,
            transition,
            transition_duration,
            cache_size_mb,
            save_state,
            holder,
            watchers: WatcherConfig { stoplist, pauselist },
            idle_pause_secs,
        })
    }
}

fn parse_name_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_fps() {
        let mut config = Config::default();
        config.general.fps = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_transition_kind() {
        let mut config = Config::default();
        config.general.transition = "wipe-left".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn playback_options_default_by_media_kind() {
        let image = PlaybackOptions::default_for(MediaKind::Image);
        assert_eq!(image.scale_mode, ScaleMode::Fill);

        let video = PlaybackOptions::default_for(MediaKind::Video);
        assert_eq!(video.scale_mode, ScaleMode::Panscan);
        assert_eq!(video.panscan, 1.0);
    }

    #[test]
    fn playback_options_parses_known_tokens() {
        let options = PlaybackOptions::parse("mute stretch", MediaKind::Image);
        assert!(options.no_audio);
        assert_eq!(options.scale_mode, ScaleMode::Stretch);
    }

    #[test]
    fn playback_options_parses_panscan_value() {
        let options = PlaybackOptions::parse("panscan=0.75", MediaKind::Video);
        assert_eq!(options.scale_mode, ScaleMode::Panscan);
        assert_eq!(options.panscan, 0.75);
    }

    #[test]
    fn playback_options_ignores_out_of_range_panscan() {
        let defaults = PlaybackOptions::default_for(MediaKind::Video);
        let options = PlaybackOptions::parse("panscan=4.0", MediaKind::Video);
        assert_eq!(options.panscan, defaults.panscan);
    }

    #[test]
    fn playback_options_ignores_unknown_tokens() {
        let options = PlaybackOptions::parse("bogus-token", MediaKind::Image);
        assert_eq!(options, PlaybackOptions::default_for(MediaKind::Image));
    }

    #[test]
    fn to_token_string_round_trips_through_parse() {
        let options = PlaybackOptions::parse("mute panscan=0.75", MediaKind::Video);
        let rendered = options.to_token_string();
        let reparsed = PlaybackOptions::parse(&rendered, MediaKind::Video);
        assert_eq!(options, reparsed);
    }

    #[test]
    fn loop_playback_defaults_off_and_is_set_by_its_token() {
        let defaults = PlaybackOptions::default_for(MediaKind::Video);
        assert!(!defaults.loop_playback);

        let looping = PlaybackOptions::parse("loop", MediaKind::Video);
        assert!(looping.loop_playback);
        assert_eq!(
            PlaybackOptions::parse(&looping.to_token_string(), MediaKind::Video),
            looping
        );
    }
}
