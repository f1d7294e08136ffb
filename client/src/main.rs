//! `murkwallctl`: a thin line-protocol client for `murkwalld`.
//!
//! Every subcommand maps to exactly one [`murkwall_common::IpcCommand`],
//! writes its wire form plus a trailing newline to the daemon's socket, and
//! prints back whatever response line(s) the daemon sends. There is no
//! structured response parsing here: the daemon's `STATUS:`/`TRANSITION:`/
//! `OK`/`ERROR:` lines are already meant for a human to read.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use murkwall_common::get_socket_path;

#[derive(Parser)]
#[command(name = "murkwallctl")]
#[command(about = "Control a running murkwalld instance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch the displayed media to a new image or video file
    Change {
        /// Path to the new wallpaper file
        path: String,
    },

    /// Pause video playback
    Pause,

    /// Resume video playback
    Resume,

    /// Print the currently displayed media and playback state
    Query,

    /// Enable or disable the cross-fade transition
    SetTransition {
        /// Transition kind: "none" or "fade"
        kind: String,
    },

    /// Print the active transition kind, whether it's enabled, and its duration
    GetTransition,

    /// Set the cross-fade duration, in seconds (0.0-5.0)
    SetTransitionDuration {
        /// Duration in seconds
        seconds: String,
    },

    /// Ask the daemon to shut down cleanly
    Stop,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Change { path } => murkwall_common::IpcCommand::Change(path),
        Commands::Pause => murkwall_common::IpcCommand::Pause,
        Commands::Resume => murkwall_common::IpcCommand::Resume,
        Commands::Query => murkwall_common::IpcCommand::Query,
        Commands::SetTransition { kind } => murkwall_common::IpcCommand::SetTransition(kind),
        Commands::GetTransition => murkwall_common::IpcCommand::GetTransition,
        Commands::SetTransitionDuration { seconds } => {
            murkwall_common::IpcCommand::SetTransitionDuration(seconds)
        }
        Commands::Stop => murkwall_common::IpcCommand::Stop,
    };

    match send_command(&command) {
        Ok(lines) => {
            let mut is_error = false;
            for line in &lines {
                println!("{line}");
                is_error |= line.starts_with("ERROR");
            }
            if is_error { ExitCode::FAILURE } else { ExitCode::SUCCESS }
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("is murkwalld running? the socket is expected at {}", get_socket_path().display());
            ExitCode::FAILURE
        }
    }
}

/// Send one command and read back its single response line. Every command
/// in the table answers with exactly one line; `stop` half-closes its write
/// side right after, which just makes the next call's connect fail instead
/// of changing anything here.
fn send_command(command: &murkwall_common::IpcCommand) -> anyhow::Result<Vec<String>> {
    let socket_path = get_socket_path();
    let mut stream = UnixStream::connect(&socket_path)?;

    let line = format!("{}\n", command.to_line());
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut buf = String::new();
    let n = reader.read_line(&mut buf)?;
    if n == 0 {
        anyhow::bail!("daemon closed the connection without a response");
    }

    Ok(vec![buf.trim_end_matches(['\r', '\n']).to_string()])
}
