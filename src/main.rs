//! capslayout-daemon: CapsLock keyboard layout switcher
//!
//! This daemon installs a system-wide low-level keyboard hook and:
//! - Switches to the next installed keyboard layout when CapsLock is
//!   pressed on its own, swallowing the CapsLock toggle
//! - Lets CapsLock toggle normally while the configured modifier
//!   (Alt by default, `-shift` or `-ctrl`) is held
//!
//! Tray icon, About dialog and single-instance locking are left to the
//! surrounding shell; this binary only hosts the hook.

mod config;
// Only the Windows backend drives these outside of tests.
#[cfg_attr(not(windows), allow(dead_code))]
mod events;
#[cfg_attr(not(windows), allow(dead_code))]
mod hotkey;
#[cfg_attr(not(windows), allow(dead_code))]
mod layout;
#[cfg_attr(not(windows), allow(dead_code))]
mod lifecycle;
mod platform;
#[cfg_attr(not(windows), allow(dead_code))]
mod state;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "capslayout-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(
        modifier = %config.modifier,
        no_foreground = ?config.no_foreground,
        strategy = ?config.strategy,
        "configuration loaded"
    );

    run(config).await?;

    info!("capslayout-daemon stopped");

    Ok(())
}

#[cfg(windows)]
async fn run(config: Config) -> Result<()> {
    use anyhow::Context;
    use tokio::sync::broadcast;
    use tracing::warn;

    use crate::events::InterceptEvent;
    use crate::layout::LayoutRotator;
    use crate::lifecycle::ShutdownSignal;
    use crate::platform::{AsyncKeyProbe, HookListener, Win32Layouts};
    use crate::state::Interceptor;

    let shutdown = ShutdownSignal::new();

    // Interceptor (hook thread) -> main loop
    let (event_tx, mut event_rx) = broadcast::channel::<InterceptEvent>(64);

    let rotator = LayoutRotator::new(Win32Layouts, config.no_foreground, config.strategy);
    let interceptor = Interceptor::new(config.modifier, AsyncKeyProbe, rotator, event_tx);

    // Without the hook there is nothing to do, so failure here is fatal.
    let mut hook = HookListener::new();
    hook.start(Box::new(interceptor))
        .context("failed to install keyboard hook")?;

    info!(modifier = %config.modifier, "CapsLock interception active");

    tokio::select! {
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "intercept event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("intercept event stream closed");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");
    hook.stop();

    Ok(())
}

#[cfg(not(windows))]
async fn run(_config: Config) -> Result<()> {
    Err(platform::PlatformError::Unsupported.into())
}

#[cfg(windows)]
fn log_event(event: &events::InterceptEvent) {
    use crate::events::InterceptEvent;
    use tracing::{debug, warn};

    match event {
        InterceptEvent::SwitchFailed { .. } => warn!(%event, "layout switch failed"),
        InterceptEvent::SwitchSkipped { .. } | InterceptEvent::UnmatchedKeyUp => {
            debug!(%event, "intercept event")
        }
        _ => info!(%event, "intercept event"),
    }
}
