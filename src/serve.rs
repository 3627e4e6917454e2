//! Subordinate (remote) mode: the far end of the transport.
//!
//! When the binary is started with no arguments and a non-TTY stdin — which
//! is how the master's shell transport invokes it — it speaks the wire
//! protocol on stdin/stdout and replays what it receives on the local
//! display:
//!
//! 1. The first inbound frame must be SETUP with a matching protocol
//!    version; the reply is READY and the session is up.
//! 2. Input frames (KEYEVENT, MOVEREL, CLICKEVENT, SETMOUSEPOSSCREENREL)
//!    are injected through the platform driver; SETCLIPBOARD and
//!    SETBRIGHTNESS update the local clipboard and gamma.
//! 3. GETCLIPBOARD is answered with a SETCLIPBOARD frame.
//! 4. Edge-mask transitions from the driver are forwarded as EDGEMASKCHANGE
//!    so the master can recognize gestures on this display.
//! 5. Log records are shipped as LOGMSG frames — stdout carries frames, so
//!    nothing may print there, and stderr on the far end of a batch-mode
//!    shell session is best effort at most.
//!
//! EOF on stdin means the master went away; that is the clean exit.

// Rust guideline compliant 2026-03

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::FrameCodec;
use crate::platform::{Platform, PlatformEvent};
use crate::protocol::{Message, PROTOCOL_VERSION};

/// A `log::Log` that ships records to the master as LOGMSG frames.
///
/// Records are formatted eagerly and pushed onto an unbounded channel the
/// serve loop drains; logging never blocks the caller.
#[derive(Debug)]
pub struct WireLogger {
    records: mpsc::UnboundedSender<String>,
}

impl WireLogger {
    /// Install the wire logger as the global logger.
    ///
    /// Returns the receiving end the serve loop forwards from. Must run
    /// before anything logs; fails if a logger is already set.
    pub fn install() -> Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        log::set_boxed_logger(Box::new(WireLogger { records: tx }))
            .context("install wire logger")?;
        log::set_max_level(log::LevelFilter::Info);
        Ok(rx)
    }
}

impl log::Log for WireLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = self
                .records
                .send(format!("{}: {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Run the subordinate loop over stdin/stdout until the master goes away.
///
/// # Errors
///
/// Handshake violations (wrong first frame, version mismatch) and transport
/// errors are returned; the process exits nonzero on them.
pub async fn run(
    mut platform: Box<dyn Platform>,
    mut log_rx: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    let mut inbound = FramedRead::new(tokio::io::stdin(), FrameCodec::new());
    let mut outbound = FramedWrite::new(tokio::io::stdout(), FrameCodec::new());

    let (platform_tx, mut platform_rx) = mpsc::unbounded_channel();
    platform.start(platform_tx).context("start platform driver")?;

    // Handshake: SETUP must come first.
    let first = match inbound.next().await {
        Some(frame) => frame?,
        None => bail!("transport closed before SETUP"),
    };
    match first {
        Message::Setup(setup) if setup.version == PROTOCOL_VERSION => {
            log::info!("session established ({} params)", setup.params.len());
        }
        Message::Setup(setup) => {
            bail!(
                "protocol version mismatch: master speaks {}, this side speaks {}",
                setup.version,
                PROTOCOL_VERSION
            );
        }
        other => bail!("expected SETUP, got {}", other.kind()),
    }
    outbound.send(Message::Ready).await?;

    loop {
        tokio::select! {
            frame = inbound.next() => {
                match frame {
                    None => {
                        // Master went away; nothing to report to.
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(e),
                    Some(Ok(msg)) => apply(platform.as_mut(), &mut outbound, msg).await?,
                }
            }

            Some(event) = platform_rx.recv() => {
                if let PlatformEvent::EdgeMask { old_mask, new_mask, x, y } = event {
                    outbound
                        .send(Message::EdgeMaskChange { old_mask, new_mask, x, y })
                        .await?;
                }
            }

            Some(line) = log_rx.recv() => {
                outbound.send(Message::LogMsg(line)).await?;
            }
        }
    }
}

/// Replay one inbound message through the platform driver.
async fn apply(
    platform: &mut dyn Platform,
    outbound: &mut FramedWrite<tokio::io::Stdout, FrameCodec>,
    msg: Message,
) -> Result<()> {
    match msg {
        Message::KeyEvent { keycode, press } => platform.inject_key(keycode, press),
        Message::MoveRel { dx, dy } => platform.inject_motion(dx, dy),
        Message::ClickEvent { button, press } => platform.inject_button(button, press),
        Message::SetMousePosScreenRel { x, y } => platform.set_mouse_pos_screen_rel(x, y),
        Message::SetClipboard(buf) => platform.set_clipboard(&buf),
        Message::SetBrightness(level) => platform.set_display_brightness(level),
        Message::GetClipboard => {
            let buf = platform.clipboard_text().unwrap_or_default();
            outbound.send(Message::SetClipboard(buf)).await?;
        }
        other => bail!("unexpected {} from master", other.kind()),
    }
    Ok(())
}
