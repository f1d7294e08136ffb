//! Common types and utilities for murkwall.
//!
//! This crate defines the shared vocabulary used by the daemon (`murkwalld`)
//! and the control client (`murkwallctl`): the error kinds returned by the
//! core subsystems, the line-oriented IPC commands and their textual
//! spelling, the scaling-mode and media-kind enums, and the socket-path
//! helper both binaries use to find each other.
//!
//! # IPC protocol
//!
//! Communication happens over a Unix domain socket using newline-terminated
//! ASCII lines — not a structured serialization format. A request is one
//! line, `command[ argument]\n`; a response is one or more `\n`-terminated
//! lines. [`IpcCommand::parse`] and [`IpcCommand::to_line`] are the only
//! places that know the wire spelling.
//!
//! # Examples
//!
//! ```
//! use murkwall_common::IpcCommand;
//!
//! let cmd = IpcCommand::parse("change /tmp/wallpaper.png").unwrap();
//! assert_eq!(cmd.to_line(), "change /tmp/wallpaper.png");
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds shared between the daemon's subsystems and (where relevant)
/// surfaced to the client.
///
/// These map onto the three categories the core's error handling design
/// distinguishes: failures that abort startup, failures that are logged and
/// absorbed, and failures that become an `ERROR: <reason>` line to one IPC
/// client.
#[derive(Error, Debug)]
pub enum WallpaperError {
    #[error("{0}")]
    Fatal(String),

    #[error("{0}")]
    Recoverable(String),

    #[error("{0}")]
    Command(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WallpaperError {
    pub fn command(reason: impl Into<String>) -> Self {
        Self::Command(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, WallpaperError>;

/// Kind of media a path resolves to.
///
/// Derived from the path's final dot-extension, lowercased, against a fixed
/// set — never by sniffing file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    const IMAGE_EXTENSIONS: &'static [&'static str] = &["jpg", "jpeg", "png", "webp", "gif"];

    /// Classify a path as image or video.
    ///
    /// Paths with no extension, or an extension outside the fixed image set,
    /// are classified as video — the daemon hands them to the external
    /// decoder and lets it fail if they are not actually playable.
    ///
    /// # Examples
    ///
    /// ```
    /// use murkwall_common::MediaKind;
    ///
    /// assert_eq!(MediaKind::of("wallpaper.PNG"), MediaKind::Image);
    /// assert_eq!(MediaKind::of("clip.mp4"), MediaKind::Video);
    /// assert_eq!(MediaKind::of("no-extension"), MediaKind::Video);
    /// ```
    pub fn of(path: impl AsRef<std::path::Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        match ext {
            Some(ext) if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) => Self::Image,
            _ => Self::Video,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Scaling mode applied when the media's native size doesn't match the
/// output's pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Fill,
    Stretch,
    Original,
    Panscan,
}

impl Default for ScaleMode {
    fn default() -> Self {
        Self::Fill
    }
}

/// Transition kind between successive images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    None,
    Fade,
}

impl TransitionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "fade" => Some(Self::Fade),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fade => "fade",
        }
    }
}

/// A parsed IPC request line.
///
/// `IpcCommand::parse` is the single place that knows the command table's
/// wire spelling. It only rejects lines whose first token isn't a known
/// command name; a known name with a missing or malformed argument still
/// parses (carrying the raw argument text) so the handler can reply with the
/// specific `ERROR: missing path argument` / `ERROR: unknown transition
/// type` / `ERROR: invalid duration` text the command table requires instead
/// of a blanket `ERROR: unknown command`.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcCommand {
    Pause,
    Resume,
    Query,
    Change(String),
    Stop,
    SetTransition(String),
    GetTransition,
    SetTransitionDuration(String),
}

impl IpcCommand {
    /// Parse one already-trimmed command line (no trailing `\n`).
    ///
    /// Returns `None` for anything not in the command table; the caller is
    /// responsible for responding `ERROR: unknown command\n`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(2, ' ');
        let name = parts.next()?;
        let arg = parts.next().map(str::trim).unwrap_or("");
        match name {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "query" => Some(Self::Query),
            "stop" => Some(Self::Stop),
            "get-transition" => Some(Self::GetTransition),
            "change" => Some(Self::Change(arg.to_string())),
            "set-transition" => Some(Self::SetTransition(arg.to_string())),
            "set-transition-duration" => Some(Self::SetTransitionDuration(arg.to_string())),
            _ => None,
        }
    }

    /// Render back to wire form, for the client and for tests.
    pub fn to_line(&self) -> String {
        match self {
            Self::Pause => "pause".to_string(),
            Self::Resume => "resume".to_string(),
            Self::Query => "query".to_string(),
            Self::Stop => "stop".to_string(),
            Self::GetTransition => "get-transition".to_string(),
            Self::Change(path) => format!("change {path}"),
            Self::SetTransition(kind) => format!("set-transition {kind}"),
            Self::SetTransitionDuration(secs) => format!("set-transition-duration {secs}"),
        }
    }
}

/// Locate the IPC socket path.
///
/// `$XDG_RUNTIME_DIR/murkwall.sock`, falling back to `/tmp/murkwall-<uid>.sock`
/// when the runtime directory is not set (matching how the rest of the
/// desktop stack resolves a per-user scratch location).
pub fn get_socket_path() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("murkwall.sock"),
        _ => {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/murkwall-{uid}.sock"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_classification() {
        assert_eq!(MediaKind::of("a.png"), MediaKind::Image);
        assert_eq!(MediaKind::of("a.JPG"), MediaKind::Image);
        assert_eq!(MediaKind::of("a.jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::of("a.webp"), MediaKind::Image);
        assert_eq!(MediaKind::of("a.gif"), MediaKind::Image);
        assert_eq!(MediaKind::of("a.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::of("a.mkv"), MediaKind::Video);
        assert_eq!(MediaKind::of("noext"), MediaKind::Video);
        assert_eq!(MediaKind::of(".hidden"), MediaKind::Video);
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(IpcCommand::parse("pause"), Some(IpcCommand::Pause));
        assert_eq!(
            IpcCommand::parse("change /tmp/a.png"),
            Some(IpcCommand::Change("/tmp/a.png".to_string()))
        );
        assert_eq!(
            IpcCommand::parse("set-transition fade"),
            Some(IpcCommand::SetTransition("fade".to_string()))
        );
        assert_eq!(
            IpcCommand::parse("set-transition-duration 0.5"),
            Some(IpcCommand::SetTransitionDuration("0.5".to_string()))
        );
    }

    #[test]
    fn rejects_only_unknown_command_names() {
        assert_eq!(IpcCommand::parse("fubar x y"), None);
    }

    #[test]
    fn known_commands_with_bad_arguments_still_parse_for_the_handler_to_reject() {
        // missing/malformed arguments are not `parse`'s job to reject: the
        // handler needs the raw text to produce the command table's specific
        // `ERROR: ...` responses rather than a blanket unknown-command one.
        assert_eq!(IpcCommand::parse("change"), Some(IpcCommand::Change(String::new())));
        assert_eq!(
            IpcCommand::parse("set-transition bogus"),
            Some(IpcCommand::SetTransition("bogus".to_string()))
        );
        assert_eq!(
            IpcCommand::parse("set-transition-duration nope"),
            Some(IpcCommand::SetTransitionDuration("nope".to_string()))
        );
    }

    #[test]
    fn round_trips_to_line() {
        let cmd = IpcCommand::Change("/tmp/a.png".to_string());
        assert_eq!(IpcCommand::parse(&cmd.to_line()), Some(cmd));
    }

    #[test]
    fn socket_path_uses_runtime_dir() {
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        assert_eq!(
            get_socket_path(),
            PathBuf::from("/run/user/1000/murkwall.sock")
        );
    }
}
