//! Response envelope normalization.
//!
//! The API answers in three accepted shapes: `{ "success": true, "data": ... }`,
//! a bare array, or a bare object. They are decoded once, at the boundary,
//! into [`ApiEnvelope`] and normalized by a single function.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),
    #[error("{}", .message.as_deref().unwrap_or("request was not successful"))]
    Rejected { message: Option<String> },
    #[error("record decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiEnvelope {
    /// `{ "success": true, "data": ... }`; a missing `data` decodes as null.
    Success(Value),
    RawArray(Vec<Value>),
    RawObject(Map<String, Value>),
    /// `{ "success": false, ... }` with whatever message the server gave.
    Failed { message: Option<String> },
    /// Anything else: strings, numbers, booleans, null.
    Malformed(Value),
}

impl ApiEnvelope {
    pub fn decode(body: Value) -> Self {
        match body {
            Value::Object(mut map) => match map.get("success").and_then(Value::as_bool) {
                Some(true) => Self::Success(map.remove("data").unwrap_or(Value::Null)),
                Some(false) => Self::Failed {
                    message: extract_message(&map),
                },
                None => Self::RawObject(map),
            },
            Value::Array(items) => Self::RawArray(items),
            other => Self::Malformed(other),
        }
    }

    /// Normalize to the payload value. The three accepted shapes carrying the
    /// same payload yield the same value.
    pub fn into_payload(self) -> Result<Value, EnvelopeError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::RawArray(items) => Ok(Value::Array(items)),
            Self::RawObject(map) => Ok(Value::Object(map)),
            Self::Failed { message } => Err(EnvelopeError::Rejected { message }),
            Self::Malformed(value) => Err(EnvelopeError::UnexpectedFormat(describe(&value))),
        }
    }

    /// Normalize to a list: arrays yield their items, a single object yields
    /// one item, a null payload yields nothing.
    pub fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, EnvelopeError> {
        self.into_items()?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(EnvelopeError::from))
            .collect()
    }

    /// Like [`into_list`](Self::into_list), but rows that fail to decode are
    /// logged and dropped instead of failing the whole list.
    pub fn into_list_lossy<T: DeserializeOwned>(self) -> Result<Vec<T>, EnvelopeError> {
        let items = self.into_items()?;
        let total = items.len();
        let decoded: Vec<T> = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping undecodable row");
                    None
                }
            })
            .collect();
        if decoded.len() < total {
            tracing::debug!(kept = decoded.len(), total, "list decoded with skipped rows");
        }
        Ok(decoded)
    }

    fn into_items(self) -> Result<Vec<Value>, EnvelopeError> {
        match self.into_payload()? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            obj @ Value::Object(_) => Ok(vec![obj]),
            other => Err(EnvelopeError::UnexpectedFormat(describe(&other))),
        }
    }

    /// Normalize to one record.
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, EnvelopeError> {
        Ok(serde_json::from_value(self.into_payload()?)?)
    }
}

/// Server-supplied message from an error or rejection body: `message`, then
/// `error` (string or `{ message }`).
pub fn extract_message(map: &Map<String, Value>) -> Option<String> {
    if let Some(Value::String(msg)) = map.get("message") {
        return Some(msg.clone());
    }
    match map.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
