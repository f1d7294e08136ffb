//! Durable per-output wallpaper state: atomic save, shared-lock load.
//!
//! Grounded in the original daemon's `state.c`: a versioned `key=value` text
//! file per output, written via temp-file + `O_EXCL` + `flock` + `fsync` +
//! rename so a crash mid-write never leaves a partial file in place of the
//! last good one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use murkwall_common::{MediaKind, WallpaperError};

const STATE_FILE_VERSION: u32 = 1;
const DEFAULT_STATE_FILE: &str = "state.txt";
const SAVE_RETRIES: u32 = 3;
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Durable record of what an output was last showing.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableState {
    pub output: Option<String>,
    pub path: String,
    pub kind: MediaKind,
    pub options: String,
    /// Playback position in seconds. Only meaningful for video.
    pub position: f64,
    /// Only meaningful for video.
    pub paused: bool,
}

/// Resolve the state directory: `$XDG_STATE_HOME/murkwall`, falling back to
/// `$HOME/.local/state/murkwall`. Creates the directory (mode 0700,
/// recursively) if it doesn't exist.
pub fn state_dir() -> murkwall_common::Result<PathBuf> {
    let dir = if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if xdg.is_empty() {
            return Err(WallpaperError::fatal("XDG_STATE_HOME set but empty"));
        }
        PathBuf::from(xdg).join("murkwall")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/state/murkwall")
    } else {
        return Err(WallpaperError::fatal(
            "neither XDG_STATE_HOME nor HOME is set; cannot locate state directory",
        ));
    };

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            WallpaperError::fatal(format!("failed to create state dir {}: {e}", dir.display()))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700));
        }
    }
    Ok(dir)
}

/// Sanitize an output name for use as part of a filename: `/\:*` become `_`.
fn sanitize_output_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*') { '_' } else { c })
        .collect()
}

/// Path of the state file for a given output (or the default file when
/// `output` is `None`/empty).
pub fn state_file_path(dir: &Path, output: Option<&str>) -> PathBuf {
    match output.filter(|o| !o.is_empty()) {
        Some(name) => dir.join(format!("state-{}.txt", sanitize_output_name(name))),
        None => dir.join(DEFAULT_STATE_FILE),
    }
}

/// Save `state` to `path`, retrying up to three times on transient failure.
///
/// Never returns a fatal error to the caller: exhausting all retries is
/// logged and swallowed, matching the design's "state save failure is never
/// fatal" rule.
pub fn save(path: &Path, state: &DurableState) {
    for attempt in 1..=SAVE_RETRIES {
        match save_once(path, state) {
            Ok(()) => {
                log::info!("state saved to {}", path.display());
                return;
            }
            Err(e) => {
                log::warn!("state save attempt {attempt}/{SAVE_RETRIES} failed: {e}");
                if attempt < SAVE_RETRIES {
                    std::thread::sleep(SAVE_RETRY_DELAY);
                }
            }
        }
    }
    log::error!("state save to {} failed after {SAVE_RETRIES} attempts", path.display());
}

fn save_once(path: &Path, state: &DurableState) -> murkwall_common::Result<()> {
    let tmp_path = path.with_extension("txt.tmp");

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp_path)
        .map_err(|e| WallpaperError::Recoverable(format!("create temp state file: {e}")))?;

    let result = write_and_lock(&file, state);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
        return result;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        WallpaperError::Recoverable(format!("rename temp state file: {e}"))
    })
}

fn write_and_lock(file: &File, state: &DurableState) -> murkwall_common::Result<()> {
    let fd = file.as_raw_fd();
    if unsafe { libc::flock(fd, libc::LOCK_EX) } != 0 {
        return Err(WallpaperError::Recoverable(format!(
            "flock state file: {}",
            std::io::Error::last_os_error()
        )));
    }

    let mut writer = file;
    let write_result = (|| -> std::io::Result<()> {
        writeln!(writer, "# murkwall state file")?;
        writeln!(writer, "# Format: key=value")?;
        writeln!(writer, "version={STATE_FILE_VERSION}")?;
        writeln!(writer)?;
        if let Some(output) = &state.output {
            writeln!(writer, "output={output}")?;
        }
        writeln!(writer, "path={}", state.path)?;
        writeln!(writer, "type={}", state.kind.as_str())?;
        if !state.options.is_empty() {
            writeln!(writer, "options={}", state.options)?;
        }
        if state.kind == MediaKind::Video {
            writeln!(writer, "position={:.2}", state.position)?;
            writeln!(writer, "paused={}", if state.paused { 1 } else { 0 })?;
        }
        writer.flush()?;
        file.sync_all()?;
        Ok(())
    })();

    unsafe { libc::flock(fd, libc::LOCK_UN) };

    write_result.map_err(|e| WallpaperError::Recoverable(format!("write state file: {e}")))
}

/// Load durable state for an output, if a well-formed record exists.
///
/// Returns `Ok(None)` when the file is absent (not an error: "no saved
/// state"). Returns `Err` for a structurally invalid record — unknown
/// `type`, negative `position`, malformed `paused`, or a missing `path` —
/// which the caller should treat the same as "no saved state" per the
/// design's "state load failure is never fatal" rule, while still logging
/// the specifics here.
pub fn load(path: &Path) -> murkwall_common::Result<Option<DurableState>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            log::warn!("failed to open state file {}: {e}", path.display());
            return Ok(None);
        }
    };

    let fd = file.as_raw_fd();
    if unsafe { libc::flock(fd, libc::LOCK_SH) } != 0 {
        log::warn!("failed to lock state file {}: {}", path.display(), std::io::Error::last_os_error());
        return Ok(None);
    }

    let parsed = parse_state_file(&file);
    unsafe { libc::flock(fd, libc::LOCK_UN) };

    let state = match parsed? {
        Some(s) => s,
        None => return Ok(None),
    };

    if !Path::new(&state.path).exists() {
        log::warn!(
            "state file {} references non-existent path {} (may have been moved or deleted)",
            path.display(),
            state.path
        );
    }

    log::info!("state loaded from {}", path.display());
    Ok(Some(state))
}

fn parse_state_file(file: &File) -> murkwall_common::Result<Option<DurableState>> {
    let reader = BufReader::new(file);

    let mut output: Option<String> = None;
    let mut path: Option<String> = None;
    let mut kind: Option<MediaKind> = None;
    let mut options = String::new();
    let mut position = 0.0f64;
    let mut paused = false;

    for line in reader.lines() {
        let line = line.map_err(|e| WallpaperError::Recoverable(format!("read state file: {e}")))?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        match key {
            "version" => {
                if let Ok(v) = value.parse::<u32>() {
                    if v > STATE_FILE_VERSION {
                        log::warn!("state file version {v} is newer than supported {STATE_FILE_VERSION}");
                    }
                }
            }
            "output" => output = Some(value.to_string()),
            "path" => path = Some(value.to_string()),
            "type" => match MediaKind::parse(value) {
                Some(k) => kind = Some(k),
                None => {
                    return Err(WallpaperError::Recoverable(format!(
                        "invalid type in state file: {value} (expected 'image' or 'video')"
                    )))
                }
            },
            "options" => options = value.to_string(),
            "position" => {
                let parsed = value.parse::<f64>().map_err(|_| {
                    WallpaperError::Recoverable(format!("invalid position in state file: {value}"))
                })?;
                if parsed < 0.0 {
                    return Err(WallpaperError::Recoverable(format!(
                        "invalid position in state file: {parsed:.2} (must be >= 0)"
                    )));
                }
                position = parsed;
            }
            "paused" => match value {
                "0" => paused = false,
                "1" => paused = true,
                other => {
                    return Err(WallpaperError::Recoverable(format!(
                        "invalid paused value in state file: {other} (expected '0' or '1')"
                    )))
                }
            },
            _ => {}
        }
    }

    let path = path.ok_or_else(|| {
        WallpaperError::Recoverable("state file missing required 'path' field".to_string())
    })?;
    let kind = kind.unwrap_or(MediaKind::Image);

    let output = output.filter(|o| !o.is_empty());

    Ok(Some(DurableState {
        output,
        path,
        kind,
        options,
        position,
        paused,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: MediaKind) -> DurableState {
        DurableState {
            output: Some("DP-1".to_string()),
            path: "/tmp/wallpaper.png".to_string(),
            kind,
            options: String::new(),
            position: 12.5,
            paused: true,
        }
    }

    #[test]
    fn sanitizes_unsafe_output_names() {
        assert_eq!(sanitize_output_name("DP-1"), "DP-1");
        assert_eq!(sanitize_output_name("a/b:c*d\\e"), "a_b_c_d_e");
    }

    #[test]
    fn default_file_used_when_output_is_none() {
        let dir = PathBuf::from("/tmp/murkwall-state-test");
        assert_eq!(state_file_path(&dir, None), dir.join("state.txt"));
        assert_eq!(state_file_path(&dir, Some("")), dir.join("state.txt"));
    }

    #[test]
    fn output_name_becomes_part_of_filename() {
        let dir = PathBuf::from("/tmp/murkwall-state-test");
        assert_eq!(state_file_path(&dir, Some("DP-1")), dir.join("state-DP-1.txt"));
    }

    #[test]
    fn round_trips_video_state() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).ok();

        let state = sample(MediaKind::Video);
        save(&path, &state);

        let loaded = load(&path).unwrap().expect("state present");
        assert_eq!(loaded.output, state.output);
        assert_eq!(loaded.path, state.path);
        assert_eq!(loaded.kind, state.kind);
        assert!((loaded.position - state.position).abs() < 1e-6);
        assert_eq!(loaded.paused, state.paused);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn image_state_omits_playback_fields() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::fs::remove_file(&path).ok();

        save(&path, &sample(MediaKind::Image));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("position="));
        assert!(!contents.contains("paused="));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = PathBuf::from("/tmp/murkwall-state-test/definitely-absent.txt");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn negative_position_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            &tmp,
            "version=1\npath=/tmp/a.mp4\ntype=video\nposition=-1.0\npaused=0\n",
        )
        .unwrap();
        assert!(load(tmp.path()).is_err());
    }

    #[test]
    fn malformed_paused_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            &tmp,
            "version=1\npath=/tmp/a.mp4\ntype=video\nposition=0.0\npaused=maybe\n",
        )
        .unwrap();
        assert!(load(tmp.path()).is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(&tmp, "version=1\ntype=image\n").unwrap();
        assert!(load(tmp.path()).is_err());
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            &tmp,
            "version=1\npath=/tmp/a.png\ntype=image\nfuture-key=xyz\n",
        )
        .unwrap();
        let loaded = load(tmp.path()).unwrap().expect("state present");
        assert_eq!(loaded.path, "/tmp/a.png");
    }
}
