//! Request and response shapes of the calls Updraft makes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Long poll coordinates returned by the server refresh call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongPollServer {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub server: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ts: i64,
}

/// Parameters of one long poll request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub server: String,
    pub key: String,
    pub ts: i64,
    pub wait: u32,
    pub mode: u32,
    pub version: u32,
}

/// Body of a long poll response.
///
/// `failed` is absent on success. Failures carry no updates; codes 1 and 3
/// may carry a fresh `ts`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub failed: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub ts: Option<i64>,
    #[serde(default)]
    pub updates: Vec<Value>,
    #[serde(default)]
    pub pts: Option<i64>,
}

impl PollResponse {
    /// `0` on success.
    pub fn failure_code(&self) -> i64 {
        self.failed.unwrap_or(0)
    }
}

/// State of a callback server as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Ok,
    Wait,
    Failed,
    Unconfigured,
}

/// A registered callback server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackServer {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator_id: i64,
    pub url: String,
    #[serde(default)]
    pub secret_key: String,
    pub status: ServerStatus,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ItemList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddedServer {
    pub server_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfirmationCode {
    pub code: String,
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_opt_i64(deserializer)?.unwrap_or_default())
}

/// The group long poll sends `ts` as a string, the user long poll as a number.
fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(ts)) => Ok(Some(ts)),
        Some(Raw::Text(text)) => text.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
