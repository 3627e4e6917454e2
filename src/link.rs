//! Per-remote framed message channel.
//!
//! A [`Link`] wraps one byte-stream transport (the SSH child's stdio in
//! production, any `AsyncRead`/`AsyncWrite` pair elsewhere) in two tasks:
//!
//! - a **reader** that decodes frames and feeds them to the hub's event
//!   channel as [`LinkFeed`] records;
//! - a **writer** that drains a bounded outbound queue into the transport.
//!
//! The bounded queue is the backlog quota: a stalled peer fills it, after
//! which [`Link::enqueue`] reports overflow and the hub hard-fails that
//! remote. No other remote is affected, and the hub task itself never blocks
//! on transport I/O.
//!
//! Every link carries the generation number of the remote incarnation that
//! created it. The hub compares generations before acting on a feed record,
//! which makes events from a torn-down link inert — the failure handler can
//! run from the middle of a dispatch without use-after-teardown hazards.

// Rust guideline compliant 2026-03

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::FrameCodec;
use crate::protocol::Message;
use crate::remote::RemoteId;

/// Outbound backlog quota, in messages. A peer that stops reading for this
/// many messages is failed rather than buffered further.
pub const OUTBOUND_BACKLOG: usize = 512;

/// What a link task reported to the hub.
#[derive(Debug)]
pub enum LinkEvent {
    /// A complete frame arrived.
    Frame(Message),
    /// The transport ended: `None` for clean EOF, `Some` for an I/O or
    /// framing error.
    Closed {
        /// Description of the failure, if any.
        error: Option<String>,
    },
}

/// A link task report, tagged with its owner and incarnation.
#[derive(Debug)]
pub struct LinkFeed {
    /// The remote this link belongs to.
    pub id: RemoteId,
    /// Incarnation that created the link; stale generations are dropped.
    pub generation: u64,
    /// The report itself.
    pub event: LinkEvent,
}

/// Why an enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at quota.
    Backlog,
    /// The writer task is gone (transport already failed).
    Closed,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::Backlog => write!(f, "outbound backlog full"),
            EnqueueError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for EnqueueError {}

/// Handle to a live framed channel.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::Sender<Message>,
    generation: u64,
    reader: JoinHandle<()>,
}

impl Link {
    /// Wrap a transport in reader/writer tasks feeding `feed`.
    pub fn spawn<R, W>(
        id: RemoteId,
        generation: u64,
        reader: R,
        writer: W,
        feed: mpsc::UnboundedSender<LinkFeed>,
    ) -> Link
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::spawn_with_backlog(id, generation, reader, writer, feed, OUTBOUND_BACKLOG)
    }

    /// [`Link::spawn`] with an explicit backlog quota.
    pub fn spawn_with_backlog<R, W>(
        id: RemoteId,
        generation: u64,
        reader: R,
        writer: W,
        feed: mpsc::UnboundedSender<LinkFeed>,
        backlog: usize,
    ) -> Link
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(backlog);

        let read_feed = feed.clone();
        let reader_task = tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, FrameCodec::new());
            loop {
                let event = match frames.next().await {
                    Some(Ok(msg)) => LinkEvent::Frame(msg),
                    Some(Err(e)) => {
                        let _ = read_feed.send(LinkFeed {
                            id,
                            generation,
                            event: LinkEvent::Closed {
                                error: Some(e.to_string()),
                            },
                        });
                        return;
                    }
                    None => {
                        let _ = read_feed.send(LinkFeed {
                            id,
                            generation,
                            event: LinkEvent::Closed { error: None },
                        });
                        return;
                    }
                };
                if read_feed
                    .send(LinkFeed {
                        id,
                        generation,
                        event,
                    })
                    .is_err()
                {
                    // Hub is gone; nothing left to feed.
                    return;
                }
            }
        });

        tokio::spawn(async move {
            let mut frames = FramedWrite::new(writer, FrameCodec::new());
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = frames.send(msg).await {
                    let _ = feed.send(LinkFeed {
                        id,
                        generation,
                        event: LinkEvent::Closed {
                            error: Some(format!("write failed: {e}")),
                        },
                    });
                    return;
                }
            }
            // Outbound handle dropped: drain complete, close the transport.
        });

        Link {
            outbound,
            generation,
            reader: reader_task,
        }
    }

    /// Queue a message for transmission without blocking.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Backlog`] when the quota is exceeded,
    /// [`EnqueueError::Closed`] when the writer already died. Either way the
    /// caller fails the remote.
    pub fn enqueue(&self, msg: Message) -> Result<(), EnqueueError> {
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Backlog,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Incarnation number this link was created under.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // Stop decoding immediately; the writer exits on its own once the
        // outbound handle is gone (after draining what was already queued).
        self.reader.abort();
    }
}
