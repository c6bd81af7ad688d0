// crates/admission-gate-core/src/runtime/refresher.rs
// ============================================================================
// Module: Allow-List Refresher
// Description: Background thread that refreshes the IP allow-list on an interval.
// Purpose: Keep published ranges current without blocking request handling.
// Dependencies: crate::runtime::allowlist, tracing
// ============================================================================

//! ## Overview
//! The refresher runs on a dedicated named thread so blocking fetches never
//! occupy async workers. It refreshes immediately, then waits on a stop
//! channel with the interval as the timeout. Stopping (or dropping) the
//! handle ends the loop; an in-flight refresh completes first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::runtime::allowlist::IpAllowList;

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Handle controlling a running refresher thread.
#[derive(Debug)]
pub struct RefresherHandle {
    /// Stop signal sender.
    stop: Option<mpsc::Sender<()>>,
    /// Refresher thread.
    join: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Signals the refresher to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Sends the stop signal and joins the thread.
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            warn!("ip allow-list refresher panicked");
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Spawns the refresher thread.
///
/// # Errors
///
/// Returns an I/O error when the thread cannot be spawned.
pub fn spawn_refresher(list: Arc<IpAllowList>, interval: Duration) -> io::Result<RefresherHandle> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let join = thread::Builder::new()
        .name("ag-ip-refresher".to_string())
        .spawn(move || refresher_loop(&list, interval, &stop_rx))?;
    Ok(RefresherHandle {
        stop: Some(stop_tx),
        join: Some(join),
    })
}

/// Refreshes, then sleeps on the stop channel until the next tick.
fn refresher_loop(list: &IpAllowList, interval: Duration, stop: &mpsc::Receiver<()>) {
    loop {
        let outcome = list.refresh();
        debug!(outcome = outcome.label(), "ip allow-list refresh tick");
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
