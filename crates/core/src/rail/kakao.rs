use serde_json::{json, Value};

use super::Notifier;
use crate::error::NotifyError;

/// KakaoTalk "send to me" memo endpoint.
pub const MEMO_ENDPOINT: &str = "https://kapi.kakao.com/v2/api/talk/memo/default/send";

const LINK_URL: &str = "https://etk.srail.kr";

/// Pushes session results to the user's own KakaoTalk chat.
pub struct KakaoNotifier {
    access_token: String,
    endpoint: String,
}

impl KakaoNotifier {
    /// Notifier authenticated with a KakaoTalk user access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            endpoint: MEMO_ENDPOINT.to_string(),
        }
    }

    /// Override the memo endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn memo_template(message: &str) -> Value {
    json!({
        "object_type": "text",
        "text": message,
        "link": {
            "web_url": LINK_URL,
            "mobile_web_url": LINK_URL,
        },
    })
}

impl Notifier for KakaoNotifier {
    fn send(&self, message: &str) -> Result<(), NotifyError> {
        // The blocking client must not be created or dropped on an async runtime thread.
        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .form(&[("template_object", memo_template(message).to_string())])
            .send()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
