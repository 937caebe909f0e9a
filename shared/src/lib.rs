//! Wire protocol shared by the poll server and its clients.
//!
//! Every WebSocket text frame carries one JSON envelope of the form
//! `{"event": <name>, "data": <payload>}`. Inbound payloads are kept as raw
//! [`Value`]s because clients are not trusted to send well-formed data; the
//! server coerces them leniently. Outbound events are strongly typed.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Maximum length, in characters, of a poll question or option text.
pub const MAX_TEXT_LEN: usize = 200;
/// Timer used when a poll is created without a usable one, in seconds.
pub const DEFAULT_TIMER_SECS: u32 = 60;
/// Text given to an option that was submitted without any.
pub const DEFAULT_OPTION_TEXT: &str = "Option";

/// Vote counts of a poll keyed by option text.
pub type Tally = BTreeMap<String, u64>;

/// Events a client sends to the server.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinChat(Value),
    ChatMessage(Value),
    KickOut(Value),
    CreatePoll(Value),
    SubmitAnswer(Value),
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decodes an inbound frame.
    ///
    /// Returns `Ok(None)` for a well-formed envelope whose event name is not
    /// part of the protocol, and an error when the frame is not an envelope.
    /// A missing `data` field decodes as `null`.
    pub fn decode(text: &str) -> Result<Option<ClientEvent>, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let event = match raw.event.as_str() {
            "joinChat" => ClientEvent::JoinChat(raw.data),
            "chatMessage" => ClientEvent::ChatMessage(raw.data),
            "kickOut" => ClientEvent::KickOut(raw.data),
            "createPoll" => ClientEvent::CreatePoll(raw.data),
            "submitAnswer" => ClientEvent::SubmitAnswer(raw.data),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Protocol name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat(_) => "joinChat",
            ClientEvent::ChatMessage(_) => "chatMessage",
            ClientEvent::KickOut(_) => "kickOut",
            ClientEvent::CreatePoll(_) => "createPoll",
            ClientEvent::SubmitAnswer(_) => "submitAnswer",
        }
    }
}

/// Events the server sends to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Distinct usernames with at least one open connection.
    ParticipantsUpdate(Vec<String>),
    /// A chat message echoed verbatim to everyone.
    ChatMessage(Value),
    /// Sent only to the connections of a kicked identity.
    KickedOut,
    PollCreated(PollCreated),
    PollResults(Tally),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<ServerEvent, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Display id of an option: whatever scalar the teacher supplied, or the
/// option's 1-based position. Keeps its JSON type on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum DisplayId {
    Number(Number),
    Flag(bool),
    Text(String),
}

impl DisplayId {
    /// 1-based position of an option submitted without an id.
    pub fn position(index: usize) -> Self {
        DisplayId::Number(Number::from(index as u64 + 1))
    }
}

/// Live broadcast of a freshly created poll. Includes the correctness flags
/// so the teacher's screen can grade answers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PollCreated {
    #[serde(rename = "_id")]
    pub id: String,
    pub question: String,
    pub options: Vec<LiveOption>,
    /// Seconds, as a JSON number; fractional and negative values pass through
    pub timer: Number,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveOption {
    pub id: DisplayId,
    pub text: String,
    pub correct: bool,
}

/// Historical read projection of a poll. Carries no correctness flags.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PollSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub question: String,
    pub options: Vec<OptionSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OptionSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub votes: u64,
}
