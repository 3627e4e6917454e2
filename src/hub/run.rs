//! The hub event loop.
//!
//! Fully event-driven: each iteration fires due scheduled calls, re-sets-up
//! failed remotes whose backoff expired, moves due scheduled messages onto
//! the wire, then sleeps in `select!` until a link feed, a platform event,
//! an interrupt, or the next deadline arrives. The loop never polls — with
//! nothing scheduled it sleeps until something is fed to it.
//!
//! Within one iteration the observable order is: due timers, then transport
//! events, then platform events (`biased` keeps it deterministic).

// Rust guideline compliant 2026-03

use anyhow::{Context, Result};

use super::Hub;

/// How long to sleep when nothing is time-driven. Purely an upper bound on
/// one `select!` round; the loop re-arms after any wakeup.
const IDLE_WAIT_US: u64 = 3_600_000_000;

/// Drive the hub until quit.
///
/// # Errors
///
/// Transport spawn failures are fatal and surface here; everything else is
/// contained per remote.
pub async fn run(mut hub: Hub) -> Result<()> {
    let mut feed_rx = hub.take_feed_rx().context("event loop already running")?;
    let mut platform_rx = hub
        .take_platform_rx()
        .context("event loop already running")?;

    log::info!("event loop starting ({} remotes)", hub.remote_count());

    while !hub.quitting() {
        let now = hub.now_us();
        hub.run_due_calls(now);
        hub.sweep_reconnects(now)?;
        hub.flush_due_messages(now);
        if hub.quitting() {
            break;
        }

        let wake_at = hub.deadline_instant(hub.next_deadline_us().unwrap_or(now + IDLE_WAIT_US));
        tokio::select! {
            biased;

            Some(feed) = feed_rx.recv() => {
                hub.handle_link_feed(feed);
            }

            Some(event) = platform_rx.recv() => {
                hub.handle_platform_event(event);
            }

            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::error!("interrupt handler failed: {e}");
                }
                log::info!("interrupted; shutting down");
                break;
            }

            _ = tokio::time::sleep_until(wake_at) => {
                // Deadline reached; the next pass runs whatever came due.
            }
        }
    }

    hub.shutdown();
    log::info!("event loop exiting");
    Ok(())
}
