//! Best-effort webhook notification
//!
//! One POST per emitted alert with body `{"alert": "<category>"}`. Each post
//! runs on its own short-lived thread so a slow endpoint never delays a scan
//! cycle. Failures are logged at debug level and dropped; there is no retry.

use super::types::AlertCategory;
use serde_json::{Value, json};
use std::time::Duration;

const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// What a webhook post announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAlert {
    Threat(AlertCategory),
    Probe,
}

impl WebhookAlert {
    pub fn key(self) -> &'static str {
        match self {
            WebhookAlert::Threat(category) => category.key(),
            WebhookAlert::Probe => "probe",
        }
    }
}

pub fn payload(alert: WebhookAlert) -> Value {
    json!({ "alert": alert.key() })
}

/// Fire and forget. Returns whether a post was started.
pub fn dispatch(url: &str, alert: WebhookAlert) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }

    let url = url.to_string();
    let body = payload(alert);
    let spawned = std::thread::Builder::new()
        .name("sentry-webhook".to_string())
        .spawn(move || {
            match ureq::post(&url).timeout(POST_TIMEOUT).send_json(body) {
                Ok(response) => log::debug!("🌐 Webhook {} -> {}", url, response.status()),
                Err(e) => log::debug!("🌐 Webhook {} failed: {}", url, e),
            }
        });

    match spawned {
        Ok(_) => true,
        Err(e) => {
            log::debug!("🌐 Could not spawn webhook thread: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        assert_eq!(
            payload(WebhookAlert::Threat(AlertCategory::Mixed)),
            json!({"alert": "mixed"})
        );
        assert_eq!(payload(WebhookAlert::Probe), json!({"alert": "probe"}));
        assert_eq!(
            payload(WebhookAlert::Threat(AlertCategory::Local)).to_string(),
            r#"{"alert":"local"}"#
        );
    }

    #[test]
    fn test_empty_url_sends_nothing() {
        assert!(!dispatch("", WebhookAlert::Probe));
        assert!(!dispatch("   ", WebhookAlert::Threat(AlertCategory::Local)));
    }
}
