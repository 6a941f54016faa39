//! Wire protocol for the pairing channel.
//!
//! All traffic is JSON text frames. The outbound shape carries exactly one
//! field. Inbound frames arrive in one of three shapes, classified in a
//! fixed precedence order:
//!
//! | Priority | Shape                                                       | Classified as              |
//! |----------|-------------------------------------------------------------|----------------------------|
//! | 1        | `{"status": <string>, "message"?: <string>}`                 | [`ServerFrame::Status`]    |
//! | 2        | `{"author": <string>, "message": <string>, "avatar"?: <string>}` | [`ServerFrame::Broadcast`] |
//! | 3        | `{"message": <string>}`                                      | [`ServerFrame::System`]    |
//!
//! The precedence is load-bearing: a frame carrying both `status` and
//! `message` is a status update with attached text, never a bare system
//! message. Anything that matches no shape (or carries a non-string value
//! in a recognized field) is a protocol violation; [`ServerFrame::classify`]
//! returns `None` and the caller drops the frame.

use serde::{Deserialize, Serialize};

/// Status value the server sends while the client sits in the matchmaking
/// queue. Every other status string means a partner is present.
pub const STATUS_WAITING: &str = "waiting";

/// Outbound chat message: `{"message": <text>}`, exactly one field.
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    pub message: &'a str,
}

/// Raw field bag an inbound frame deserializes into before classification.
#[derive(Deserialize)]
struct RawFrame {
    status: Option<String>,
    author: Option<String>,
    message: Option<String>,
    avatar: Option<String>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Matchmaking status update, optionally carrying display text.
    Status {
        status: String,
        message: Option<String>,
    },
    /// An authored chat message, relayed to both participants including
    /// its author.
    Broadcast {
        author: String,
        message: String,
        avatar: Option<String>,
    },
    /// Unattributed server notice.
    System { message: String },
}

impl ServerFrame {
    /// Parse and classify one inbound text frame.
    ///
    /// Returns `None` for malformed JSON, non-object payloads, non-string
    /// values in recognized fields, and shapes matching none of the three
    /// cases above.
    pub fn classify(text: &str) -> Option<ServerFrame> {
        let raw: RawFrame = serde_json::from_str(text).ok()?;
        match raw {
            RawFrame {
                status: Some(status),
                message,
                ..
            } => Some(ServerFrame::Status { status, message }),
            RawFrame {
                author: Some(author),
                message: Some(message),
                avatar,
                ..
            } => Some(ServerFrame::Broadcast {
                author,
                message,
                avatar,
            }),
            RawFrame {
                message: Some(message),
                ..
            } => Some(ServerFrame::System { message }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_with_message_classifies_as_status() {
        let frame =
            ServerFrame::classify(r#"{"status":"waiting","message":"Searching for a chat partner..."}"#)
                .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Status {
                status: "waiting".into(),
                message: Some("Searching for a chat partner...".into()),
            }
        );
    }

    #[test]
    fn bare_status_has_no_message() {
        let frame = ServerFrame::classify(r#"{"status":"paired"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Status {
                status: "paired".into(),
                message: None,
            }
        );
    }

    #[test]
    fn status_takes_precedence_over_broadcast_and_system() {
        // All four fields present: rule 1 wins, author/avatar are ignored.
        let frame = ServerFrame::classify(
            r#"{"status":"paired","author":"bob@x.com","message":"hi","avatar":"/img/bob.png"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Status {
                status: "paired".into(),
                message: Some("hi".into()),
            }
        );
    }

    #[test]
    fn author_and_message_classify_as_broadcast() {
        let frame = ServerFrame::classify(
            r#"{"author":"bob@x.com","message":"hi","avatar":"/img/bob.png"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Broadcast {
                author: "bob@x.com".into(),
                message: "hi".into(),
                avatar: Some("/img/bob.png".into()),
            }
        );
    }

    #[test]
    fn broadcast_avatar_is_optional() {
        let frame = ServerFrame::classify(r#"{"author":"bob@x.com","message":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Broadcast {
                author: "bob@x.com".into(),
                message: "hi".into(),
                avatar: None,
            }
        );
    }

    #[test]
    fn message_only_classifies_as_system() {
        let frame = ServerFrame::classify(r#"{"message":"Welcome!"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::System {
                message: "Welcome!".into(),
            }
        );
    }

    #[test]
    fn author_without_message_is_dropped() {
        assert_eq!(ServerFrame::classify(r#"{"author":"bob@x.com"}"#), None);
    }

    #[test]
    fn unrecognized_shape_is_dropped() {
        assert_eq!(ServerFrame::classify(r#"{"foo":"bar"}"#), None);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        assert_eq!(ServerFrame::classify("not json"), None);
        assert_eq!(ServerFrame::classify(r#""just a string""#), None);
        assert_eq!(ServerFrame::classify("[1,2,3]"), None);
    }

    #[test]
    fn non_string_field_values_are_dropped() {
        assert_eq!(ServerFrame::classify(r#"{"status":5}"#), None);
        assert_eq!(ServerFrame::classify(r#"{"message":{"nested":true}}"#), None);
    }

    #[test]
    fn null_status_falls_through() {
        // A null status is treated as absent, so the frame classifies by
        // its remaining fields.
        let frame = ServerFrame::classify(r#"{"status":null,"message":"Welcome!"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::System {
                message: "Welcome!".into(),
            }
        );
    }

    #[test]
    fn outbound_frame_is_a_single_field() {
        let json = serde_json::to_string(&OutboundFrame { message: "hello" }).unwrap();
        assert_eq!(json, r#"{"message":"hello"}"#);
    }
}
