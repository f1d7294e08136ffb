mod buffer;
mod config;
mod frame_buffer;
mod gpu;
mod ipc_server;
mod macros;
mod scaling;
mod signals;
mod state_store;
mod transition;
mod video;
mod wallpaper_manager;
mod wayland;
mod watchers;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use config::{Cli, Config, SaveStateMode, Settings};
use frame_buffer::FrameBuffer;
use ipc_server::IpcServer;
use signals::SignalPipe;
use watchers::WatcherHandle;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Bootstrap and drive the daemon until a clean shutdown. `SIGHUP` is
/// handled in-process (the render pipeline is rebuilt with a restore flag)
/// rather than by re-executing, per `DESIGN.md`; the loop below is the
/// surface expression of that choice.
fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let config = Config::load_from_path(&config_path).unwrap_or_else(|e| {
        log::warn!("failed to load config from {}: {e}", config_path.display());
        Config::default()
    });

    let mut settings = Settings::resolve(&cli, &config)?;

    log::info!(
        "starting murkwalld v{} on {}",
        env!("CARGO_PKG_VERSION"),
        settings.media.display()
    );

    let frame_buffer = Arc::new(FrameBuffer::new()?);
    let mut ipc = IpcServer::start(&settings.socket)?;
    let mut watchers = WatcherHandle::spawn(settings.watchers.clone());
    let signals = SignalPipe::install()?;

    let exit_reason = loop {
        match wayland::run(settings.clone(), frame_buffer.clone(), &mut ipc, &mut watchers, &signals) {
            Ok(true) => {
                log::info!("received SIGHUP, reloading with saved state restored");
                settings.save_state = SaveStateMode::Restore;
                continue;
            }
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    watchers.stop();
    ipc.shutdown();

    log::info!("murkwalld exiting");
    exit_reason
}
