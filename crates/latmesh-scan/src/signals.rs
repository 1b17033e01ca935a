//! Interrupt handling scoped to one scan.

use crate::stop::StopSignal;
use parking_lot::Mutex;
use std::sync::OnceLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// Target of the process-wide ctrlc handler, swapped per scan.
static FALLBACK_TARGET: Mutex<Option<StopSignal>> = parking_lot::const_mutex(None);
static FALLBACK_INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

/// Routes SIGINT/SIGTERM to a [`StopSignal`] while alive.
///
/// Listens through the tokio runtime when it can. Otherwise a process-level
/// handler is pointed at the signal and the previous target is restored on
/// drop. With no target left, the handler exits the process the way the
/// default disposition would.
#[derive(Debug)]
pub struct SignalGuard {
    listener: Option<JoinHandle<()>>,
    previous: Option<Option<StopSignal>>,
}

impl SignalGuard {
    /// Must be called from within a tokio runtime.
    pub fn install(stop: StopSignal) -> Self {
        match spawn_listener(stop.clone()) {
            Ok(listener) => Self {
                listener: Some(listener),
                previous: None,
            },
            Err(err) => {
                warn!(error = %err, "runtime signal handling unavailable, using process handler");
                Self {
                    listener: None,
                    previous: install_fallback(stop),
                }
            }
        }
    }

    pub fn uses_fallback(&self) -> bool {
        self.previous.is_some()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(previous) = self.previous.take() {
            *FALLBACK_TARGET.lock() = previous;
        }
    }
}

#[cfg(unix)]
fn spawn_listener(stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("interrupt received, stopping"),
            _ = terminate.recv() => info!("terminate received, stopping"),
            _ = stop.wait() => return,
        }
        stop.trigger();
    }))
}

#[cfg(windows)]
fn spawn_listener(stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c.recv() => info!("interrupt received, stopping"),
            _ = stop.wait() => return,
        }
        stop.trigger();
    }))
}

#[cfg(not(any(unix, windows)))]
fn spawn_listener(_stop: StopSignal) -> std::io::Result<JoinHandle<()>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no runtime signal support",
    ))
}

// Exit status a shell reports for a process killed by SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

fn install_fallback(stop: StopSignal) -> Option<Option<StopSignal>> {
    let installed = FALLBACK_INSTALLED.get_or_init(|| {
        ctrlc::set_handler(|| {
            if !dispatch_interrupt() {
                // No scan owns the handler: behave like the default disposition.
                std::process::exit(INTERRUPTED_EXIT);
            }
        })
        .map_err(|err| err.to_string())
    });
    if let Err(err) = installed {
        warn!(error = %err, "failed to install interrupt handler");
        return None;
    }
    Some(FALLBACK_TARGET.lock().replace(stop))
}

/// Trigger the current fallback target. `false` when no scan holds it.
fn dispatch_interrupt() -> bool {
    match FALLBACK_TARGET.lock().as_ref() {
        Some(stop) => {
            info!("interrupt received, stopping");
            stop.trigger();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serializes tests that touch the process-wide fallback slot.
    static SLOT: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn fallback_target_is_restored_on_drop() {
        let _slot = SLOT.lock();
        let outer = StopSignal::new();
        *FALLBACK_TARGET.lock() = Some(outer.clone());

        let inner = StopSignal::new();
        let guard = SignalGuard {
            listener: None,
            previous: install_fallback(inner.clone()),
        };
        assert!(guard.uses_fallback());
        assert!(dispatch_interrupt());
        assert!(inner.is_set());
        assert!(!outer.is_set());
        drop(guard);

        assert!(dispatch_interrupt());
        assert!(outer.is_set());
        *FALLBACK_TARGET.lock() = None;
    }

    #[test]
    fn released_fallback_no_longer_swallows_interrupts() {
        let _slot = SLOT.lock();
        *FALLBACK_TARGET.lock() = None;

        let stop = StopSignal::new();
        let guard = SignalGuard {
            listener: None,
            previous: install_fallback(stop.clone()),
        };
        assert_eq!(guard.previous.as_ref().map(Option::is_some), Some(false));
        drop(guard);

        // With no target left the handler takes the default exit path.
        assert!(FALLBACK_TARGET.lock().is_none());
        assert!(!dispatch_interrupt());
        assert!(!stop.is_set());
    }

    #[tokio::test]
    async fn runtime_listener_is_used_when_available() {
        let stop = StopSignal::new();
        let guard = SignalGuard::install(stop.clone());
        assert!(!guard.uses_fallback());
        drop(guard);
        assert!(!stop.is_set());
    }
}
