//! Webhook adapter (generic/Slack/Discord) for the adapter registry.
//!
//! Formats and sends one HTTP POST per invocation. Signing is not
//! implemented, matching how the rest of this codebase treats webhook
//! secrets: configured but unused until a signing scheme is chosen.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Typed outcome of one webhook send, distinguishing the classes of
/// failure the adapter layer needs to tell apart: rate limiting, a
/// non-retryable upstream rejection, and a transient/network failure.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("failed to build or send webhook request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("webhook request rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to serialize webhook payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WebhookError {
    /// HTTP status code this error carries, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            WebhookError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            WebhookError::Timeout { .. } => true,
            WebhookError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookType {
    #[default]
    Generic,
    Slack,
    Discord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub webhook_type: WebhookType,
    /// Secret for signing (not yet implemented).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

/// One rendered notification: a stage name, a message body, and
/// whatever named fields the action's template filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub title: String,
    pub message: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// Send one webhook POST. The returned error carries enough of the
/// HTTP outcome (status code, timeout-ness) for the caller to classify
/// it into a retry decision instead of treating every failure alike.
pub fn send_webhook(config: &WebhookConfig, payload: &WebhookPayload) -> Result<(), WebhookError> {
    let timeout_secs = config.timeout_secs;
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let body = match config.webhook_type {
        WebhookType::Generic => serde_json::to_string(payload)?,
        WebhookType::Slack => slack_payload(payload)?,
        WebhookType::Discord => discord_payload(payload)?,
    };

    let response = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .map_err(|err| if err.is_timeout() { WebhookError::Timeout { timeout_secs } } else { WebhookError::Transport(err) })?;

    if !response.status().is_success() {
        return Err(WebhookError::Status {
            status: response.status().as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }

    Ok(())
}

fn slack_payload(payload: &WebhookPayload) -> Result<String, WebhookError> {
    let fields: Vec<_> = payload
        .fields
        .iter()
        .map(|(k, v)| json!({"title": k, "value": v, "short": true}))
        .collect();

    let slack_json = json!({
        "attachments": [{
            "title": payload.title,
            "text": payload.message,
            "fields": fields
        }]
    });

    Ok(serde_json::to_string(&slack_json)?)
}

fn discord_payload(payload: &WebhookPayload) -> Result<String, WebhookError> {
    let fields: Vec<_> = payload
        .fields
        .iter()
        .map(|(k, v)| json!({"name": k, "value": v, "inline": true}))
        .collect();

    let discord_json = json!({
        "embeds": [{
            "title": payload.title,
            "description": payload.message,
            "fields": fields
        }]
    });

    Ok(serde_json::to_string(&discord_json)?)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tiny_http::{Response, Server};

    use super::*;

    fn with_server<F>(handler: F) -> (String, thread::JoinHandle<()>)
    where
        F: FnOnce(tiny_http::Request) + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("server");
        let addr = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let req = server.recv().expect("request");
            handler(req);
        });
        (addr, handle)
    }

    fn config(url: String) -> WebhookConfig {
        WebhookConfig { url, webhook_type: WebhookType::Generic, secret: None, timeout_secs: 5 }
    }

    fn payload() -> WebhookPayload {
        WebhookPayload { title: "t".into(), message: "m".into(), fields: BTreeMap::new() }
    }

    #[test]
    fn send_webhook_succeeds_on_2xx() {
        let (addr, handle) = with_server(|req| req.respond(Response::from_string("ok")).unwrap());
        send_webhook(&config(addr), &payload()).expect("send");
        handle.join().unwrap();
    }

    #[test]
    fn send_webhook_surfaces_status_on_rejection() {
        let (addr, handle) = with_server(|req| {
            req.respond(Response::from_string("too many requests").with_status_code(429)).unwrap()
        });
        let err = send_webhook(&config(addr), &payload()).unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        handle.join().unwrap();
    }

    #[test]
    fn generic_payload_serializes_to_flat_json() {
        let payload = WebhookPayload {
            title: "Deadline missed".into(),
            message: "Project proj-1 entered stage escalated".into(),
            fields: BTreeMap::from([("stage".to_string(), "escalated".to_string())]),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"stage\":\"escalated\""));
    }

    #[test]
    fn slack_payload_wraps_fields_in_attachment() {
        let payload = WebhookPayload {
            title: "t".into(),
            message: "m".into(),
            fields: BTreeMap::from([("a".to_string(), "b".to_string())]),
        };
        let body = slack_payload(&payload).unwrap();
        assert!(body.contains("attachments"));
        assert!(body.contains("\"a\""));
    }

    #[test]
    fn discord_payload_wraps_fields_in_embed() {
        let payload = WebhookPayload { title: "t".into(), message: "m".into(), fields: BTreeMap::new() };
        let body = discord_payload(&payload).unwrap();
        assert!(body.contains("embeds"));
    }

    #[test]
    fn webhook_config_defaults_to_generic_type() {
        let json = r#"{"url": "https://example.com/hook"}"#;
        let config: WebhookConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.webhook_type, WebhookType::Generic);
        assert_eq!(config.timeout_secs, 30);
    }
}
