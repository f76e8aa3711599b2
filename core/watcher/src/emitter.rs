//! ActivityWatch boundary.
//!
//! The session machine only talks to the [`Emitter`] trait; [`AwClient`] is the
//! production implementation over the aw-server REST API. Calls are made once;
//! retry policy is left to the server side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration: f64,
    pub data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("server returned status {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("server did not assign an id to the inserted event")]
    MissingId,
}

pub trait Emitter {
    /// Creates the bucket unless it already exists.
    fn create_bucket(&self, bucket_id: &str, event_type: &str) -> Result<(), EmitError>;

    /// Inserts `event`, or replaces the stored event when `event.id` is set.
    /// Returns the event as stored by the server.
    fn insert_event(&self, bucket_id: &str, event: &Event) -> Result<Event, EmitError>;

    fn heartbeat(&self, bucket_id: &str, event: &Event, pulsetime: f64) -> Result<(), EmitError>;
}

#[derive(Serialize)]
struct BucketRequest<'a> {
    client: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    hostname: &'a str,
}

// aw-server (Python) answers a single insert with the event object while
// aw-server-rust answers with a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum InsertResponse {
    One(Event),
    Many(Vec<Event>),
}

pub struct AwClient {
    agent: ureq::Agent,
    base_url: String,
    client_id: String,
    hostname: String,
}

impl AwClient {
    pub fn new(base_url: &str, client_id: &str, hostname: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .user_agent(concat!("aw-watcher-terminal/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            hostname: hostname.to_string(),
        }
    }

    fn bucket_url(&self, bucket_id: &str) -> String {
        format!("{}/api/0/buckets/{}", self.base_url, bucket_id)
    }

    fn post(&self, url: &str, body: String, query: &[(&str, &str)]) -> Result<String, EmitError> {
        let mut request = self
            .agent
            .post(url)
            .set("Content-Type", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }

        let response = match request.send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(EmitError::Status {
                    url: url.to_string(),
                    status,
                    body,
                });
            }
            Err(err) => {
                return Err(EmitError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                })
            }
        };

        debug!(url = %url, status = response.status(), "ActivityWatch request succeeded");
        response.into_string().map_err(|err| EmitError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

impl Emitter for AwClient {
    fn create_bucket(&self, bucket_id: &str, event_type: &str) -> Result<(), EmitError> {
        let url = self.bucket_url(bucket_id);
        let body = serde_json::to_string(&BucketRequest {
            client: &self.client_id,
            event_type,
            hostname: &self.hostname,
        })
        .map_err(EmitError::Encode)?;

        // 304 means the bucket already exists.
        self.post(&url, body, &[]).map(|_| ())
    }

    fn insert_event(&self, bucket_id: &str, event: &Event) -> Result<Event, EmitError> {
        let url = format!("{}/events", self.bucket_url(bucket_id));
        let body = serde_json::to_string(&[event]).map_err(EmitError::Encode)?;
        let text = self.post(&url, body, &[])?;

        let decoded: InsertResponse =
            serde_json::from_str(&text).map_err(|err| EmitError::Decode {
                url: url.clone(),
                message: err.to_string(),
            })?;
        match decoded {
            InsertResponse::One(event) => Ok(event),
            InsertResponse::Many(events) => {
                events.into_iter().next().ok_or_else(|| EmitError::Decode {
                    url,
                    message: "response contained no events".to_string(),
                })
            }
        }
    }

    fn heartbeat(&self, bucket_id: &str, event: &Event, pulsetime: f64) -> Result<(), EmitError> {
        let url = format!("{}/heartbeat", self.bucket_url(bucket_id));
        let body = serde_json::to_string(event).map_err(EmitError::Encode)?;
        let pulsetime = pulsetime.to_string();
        self.post(&url, body, &[("pulsetime", pulsetime.as_str())])
            .map(|_| ())
    }
}
