//! Envelope — the wire message exchanged between clients and the hub.
//!
//! ARCHITECTURE
//! ============
//! Every frame on the relay socket is one JSON object tagged by `type`. The
//! hub never trusts the sender-supplied `from`; it stamps the registered name
//! before routing. All fields besides `type` are omitted when unused.
//!
//! DESIGN
//! ======
//! - Decoding is a pure function. Malformed JSON is a `CodecError`, which is
//!   distinct from a well-formed envelope whose `type` is not recognized
//!   (`Kind::Unknown`).
//! - A missing `type` decodes as `Kind::Unknown` so the handshake can answer
//!   it with "Must register first" instead of silently closing.

use serde::{Deserialize, Serialize};

// =============================================================================
// KIND
// =============================================================================

/// Message kind, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Register,
    ClientList,
    Private,
    CreateGroup,
    GroupList,
    JoinGroup,
    GroupMessage,
    Error,
    /// Any `type` value the hub does not route. Never sent by the server.
    #[default]
    #[serde(other)]
    Unknown,
}

// =============================================================================
// TYPES
// =============================================================================

/// One group as it appears in a `group_list` roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub creator: String,
    pub members: Vec<String>,
}

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Envelope {
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self { kind, ..Self::default() }
    }

    /// Handshake confirmation sent once a name has been claimed.
    #[must_use]
    pub fn registered(name: &str) -> Self {
        Self::new(Kind::Register).with_content(format!("Registered as {name}"))
    }

    /// Terminal handshake failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Self::new(Kind::Error) }
    }

    /// Full-replace roster of connected client names.
    #[must_use]
    pub fn client_list(clients: Vec<String>) -> Self {
        Self { clients: Some(clients), ..Self::new(Kind::ClientList) }
    }

    /// Full-replace roster of groups.
    #[must_use]
    pub fn group_list(groups: Vec<GroupInfo>) -> Self {
        Self { groups: Some(groups), ..Self::new(Kind::GroupList) }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Envelope {
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Envelope {
    /// Content when present and non-empty.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        non_empty(self.content.as_deref())
    }

    /// Recipient when present and non-empty.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        non_empty(self.to.as_deref())
    }

    /// Group name when present and non-empty.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        non_empty(self.group_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

// =============================================================================
// CODEC
// =============================================================================

/// Decode one frame payload.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if the payload is not a JSON envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode an envelope as a text frame payload.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
