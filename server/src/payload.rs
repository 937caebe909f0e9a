//! Lenient decoding of client payloads.
//!
//! Clients send loosely-typed JSON. Rather than rejecting anything that does
//! not match a schema, each field is coerced: falsy or absent values become
//! "missing", numbers are accepted where strings are expected, and shapes
//! that make no sense fall back to defaults. Validation of the coerced values
//! is left to the component that consumes them.

use crate::error::ServerError;
use serde_json::{Map, Number, Value};
use shared::DisplayId;

/// A value counts as present unless it is null, false, zero or empty text.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map_or(true, |n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Number rendered the way a browser would print it: integral floats lose
/// their fraction (`4.0` -> `"4"`).
pub fn number_text(number: &Number) -> String {
    if number.is_f64() {
        if let Some(value) = number.as_f64() {
            if value == 0.0 {
                return "0".to_string();
            }
            if value.fract() == 0.0 && value.abs() < 1e21 {
                return format!("{:.0}", value);
            }
        }
    }
    number.to_string()
}

/// Present scalar rendered as text. Structured values do not count as text.
pub fn text_field(value: Option<&Value>) -> Option<String> {
    if !truthy(value) {
        return None;
    }
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number_text(number)),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Timer as a JSON number, or `None` when it converts to zero or not a number.
///
/// Numbers pass through untouched, numeric text is parsed and `true` counts
/// as one second.
pub fn timer_field(value: Option<&Value>) -> Option<Number> {
    let timer = match value? {
        Value::Number(number) => number.clone(),
        Value::String(text) => float_number(text.trim().parse::<f64>().ok()?)?,
        Value::Bool(true) => Number::from(1),
        _ => return None,
    };
    match timer.as_f64() {
        Some(seconds) if seconds != 0.0 && seconds.is_finite() => Some(timer),
        _ => None,
    }
}

fn float_number(value: f64) -> Option<Number> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}

fn display_id_field(value: Option<&Value>) -> Option<DisplayId> {
    match value? {
        Value::Number(number) => Some(DisplayId::Number(number.clone())),
        Value::String(text) => Some(DisplayId::Text(text.clone())),
        Value::Bool(flag) => Some(DisplayId::Flag(*flag)),
        _ => None,
    }
}

fn field<'a>(object: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    object.and_then(|map| map.get(key))
}

/// `joinChat` payload: the joining username, if any.
pub fn join_username(payload: &Value) -> Option<String> {
    text_field(field(payload.as_object(), "username"))
}

/// `kickOut` payload: the bare username of the target, if any.
pub fn kick_target(payload: &Value) -> Option<String> {
    text_field(Some(payload))
}

/// One option as submitted by the teacher, before defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDraft {
    pub display_id: Option<DisplayId>,
    pub text: Option<String>,
    pub correct: bool,
}

impl OptionDraft {
    fn from_value(value: &Value) -> Self {
        let object = value.as_object();
        Self {
            display_id: display_id_field(field(object, "id")),
            text: text_field(field(object, "text")),
            correct: truthy(field(object, "correct")),
        }
    }
}

/// `createPoll` payload after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePollRequest {
    pub teacher_username: String,
    pub question: String,
    pub timer: Option<Number>,
    pub options: Vec<OptionDraft>,
}

impl CreatePollRequest {
    /// Coerces a raw payload.
    ///
    /// Only a missing (null) payload is malformed. Any other non-object
    /// yields a request with every field defaulted.
    pub fn from_payload(payload: &Value) -> Result<Self, ServerError> {
        if payload.is_null() {
            return Err(ServerError::MalformedPayload("createPoll"));
        }
        let object = payload.as_object();

        let options = match field(object, "options") {
            Some(Value::Array(items)) => items.iter().map(OptionDraft::from_value).collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            teacher_username: text_field(field(object, "teacherUsername")).unwrap_or_default(),
            question: text_field(field(object, "question")).unwrap_or_default(),
            timer: timer_field(field(object, "timer")),
            options,
        })
    }
}

/// `submitAnswer` payload after coercion. Missing fields are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRequest {
    pub username: String,
    pub poll_id: String,
    pub option: String,
}

impl AnswerRequest {
    pub fn from_payload(payload: &Value) -> Self {
        let object = payload.as_object();
        Self {
            username: text_field(field(object, "username")).unwrap_or_default(),
            poll_id: text_field(field(object, "pollId")).unwrap_or_default(),
            option: text_field(field(object, "option")).unwrap_or_default(),
        }
    }
}
