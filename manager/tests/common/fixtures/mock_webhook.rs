//! Mock mail relay for testing email job delivery
//!
//! This simulates the webhook that turns email payloads into mail, so tests
//! can verify what the email work unit posts.

use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockMailRelay {
    pub server: MockServer,
}

impl MockMailRelay {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Accept every delivery
    pub async fn mock_success(&self) {
        Mock::given(method("POST"))
            .and(path("/mail"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Reject every delivery with `status_code`
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/mail"))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/mail", self.server.uri())
    }

    /// JSON bodies of every request received so far
    pub async fn received_payloads(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|req| req.body_json::<Value>().ok())
            .collect()
    }
}
