//! Pairing state machine: phase, transcript, and display identity.
//!
//! [`ChatSession`] consumes the channel's event stream and derives the
//! pairing phase:
//!
//! ```text
//! Idle ──status──▶ Waiting ◀──status "waiting"──┐
//!   │                 │                         │
//!   │              status other             Paired
//!   └──────────────────┴──── disconnect ──▶ Closed (terminal)
//! ```
//!
//! The transcript is append-only in receipt order and entries are immutable
//! once appended. Authorship ("is this mine?") and the display avatar are
//! derived per render, never stored on the entry, so an avatar change
//! applies retroactively to everything already on screen.

use tracing::{debug, info};

use crate::protocol::{ServerFrame, STATUS_WAITING};
use crate::websocket::{ChannelError, ChatChannel, SessionEvent};

/// Pairing phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connection opened, no status heard from the server yet.
    Idle,
    /// Queued for a partner; sending is disabled.
    Waiting,
    /// Partner present; sending is enabled.
    Paired,
    /// Terminal: the transport is gone. No further events are processed.
    Closed,
}

/// One transcript element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    /// An authored chat message (the author may be this client).
    User {
        author: String,
        text: String,
        avatar: Option<String>,
    },
    /// An unattributed server notice.
    System { text: String },
}

impl TranscriptEntry {
    pub fn text(&self) -> &str {
        match self {
            TranscriptEntry::User { text, .. } | TranscriptEntry::System { text } => text,
        }
    }

    /// The author identity, absent for system notices.
    pub fn author(&self) -> Option<&str> {
        match self {
            TranscriptEntry::User { author, .. } => Some(author),
            TranscriptEntry::System { .. } => None,
        }
    }
}

/// One authenticated user's live participation in the pairing service.
///
/// Owns its channel exclusively; nothing is shared across sessions.
pub struct ChatSession {
    identity: String,
    self_avatar: Option<String>,
    phase: Phase,
    transcript: Vec<TranscriptEntry>,
    channel: ChatChannel,
}

impl ChatSession {
    /// Wrap a connected channel. `identity` is the account email the API
    /// reported at login; `self_avatar` is the profile avatar if the
    /// lookup succeeded.
    pub fn new(channel: ChatChannel, identity: String, self_avatar: Option<String>) -> Self {
        Self {
            identity,
            self_avatar,
            phase: Phase::Idle,
            transcript: Vec::new(),
            channel,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The transcript so far, in receipt order.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Replace the own avatar. Takes effect on every subsequent render of
    /// self-authored entries, including ones appended before the change.
    pub fn set_self_avatar(&mut self, avatar_url: String) {
        self.self_avatar = Some(avatar_url);
    }

    /// Pull the next channel event and fold it into the session. Returns
    /// `None` once the session is closed or the channel is done.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.phase == Phase::Closed {
            return None;
        }
        let event = self.channel.next_event().await?;
        self.apply(event.clone());
        Some(event)
    }

    /// Fold one event into phase and transcript. This is the only
    /// transcript mutator: it appends at the end, never reorders or
    /// removes. Once the phase is `Closed` every event is ignored.
    pub fn apply(&mut self, event: SessionEvent) {
        if self.phase == Phase::Closed {
            return;
        }
        match event {
            SessionEvent::Disconnected => {
                info!("pairing channel disconnected");
                self.phase = Phase::Closed;
            }
            SessionEvent::Frame(ServerFrame::Status { status, message }) => {
                let next = if status == STATUS_WAITING {
                    Phase::Waiting
                } else {
                    Phase::Paired
                };
                if next != self.phase {
                    debug!(?next, "phase change ({status})");
                }
                self.phase = next;
                if let Some(text) = message {
                    self.transcript.push(TranscriptEntry::System { text });
                }
            }
            SessionEvent::Frame(ServerFrame::Broadcast {
                author,
                message,
                avatar,
            }) => {
                self.transcript.push(TranscriptEntry::User {
                    author,
                    text: message,
                    avatar,
                });
            }
            SessionEvent::Frame(ServerFrame::System { message }) => {
                self.transcript.push(TranscriptEntry::System { text: message });
            }
        }
    }

    /// Submit outbound text.
    ///
    /// Blank input, and any input while the phase is not `Paired`, is
    /// ignored without transmitting or touching the transcript (the UI
    /// surfaces this as a disabled input, not an error). Nothing is
    /// appended locally on success either: the author's own copy arrives
    /// through the server broadcast, so transcript order is always
    /// server-observed order.
    pub async fn submit(&self, text: &str) -> Result<(), ChannelError> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank submit");
            return Ok(());
        }
        if self.phase != Phase::Paired {
            debug!(phase = ?self.phase, "ignoring submit outside Paired");
            return Ok(());
        }
        self.channel.send(text).await
    }

    /// True iff the entry was authored by this session's user. Exact,
    /// case-sensitive comparison; derived per render, never stored.
    pub fn is_mine(&self, entry: &TranscriptEntry) -> bool {
        entry.author() == Some(self.identity.as_str())
    }

    /// Display avatar for a transcript entry, in priority order: the own
    /// profile avatar for own entries, then the reference the server
    /// attached to the entry, then a deterministic per-author fallback.
    /// System notices have no author and no avatar.
    pub fn resolve_avatar(&self, entry: &TranscriptEntry) -> Option<String> {
        match entry {
            TranscriptEntry::System { .. } => None,
            TranscriptEntry::User { author, avatar, .. } => {
                if self.is_mine(entry) {
                    if let Some(own) = &self.self_avatar {
                        return Some(own.clone());
                    }
                }
                avatar
                    .clone()
                    .or_else(|| Some(fallback_avatar(author)))
            }
        }
    }

    /// Tear down the channel and enter the terminal phase. Idempotent.
    pub fn close(&mut self) {
        self.channel.close();
        self.phase = Phase::Closed;
    }
}

/// Deterministic fallback avatar, stable per author: a robohash image URL
/// keyed by the author identity (path-segment encoded).
fn fallback_avatar(author: &str) -> String {
    let mut url = reqwest::Url::parse("https://robohash.org/").expect("static URL");
    url.path_segments_mut()
        .expect("https URL has path segments")
        .pop_if_empty()
        .push(&format!("{author}.png"));
    url.set_query(Some("size=80x80&set=set1"));
    url.to_string()
}
