//! Chat server client
//!
//! Thin reqwest wrapper around the Solus conversation endpoint. A chat
//! exchange sends `{text, user_id, conversation_id}` and receives
//! `{response, conversation_id, action}`; the optional action is forwarded
//! to the dispatch bridge by the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Agent tool-calling can run long server-side, so the client waits well past
// normal HTTP timeouts before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from the chat server client
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {body}")]
    Http { status: u16, body: String },
}

/// Chat request payload
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub text: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Device action requested by the server alongside a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}

/// Chat response payload
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(rename = "response")]
    pub response_text: String,
    pub conversation_id: String,
    #[serde(default)]
    pub action: Option<ServerAction>,
}

/// Client for the Solus chat server
#[derive(Debug, Clone)]
pub struct SolusClient {
    client: reqwest::Client,
    base_url: String,
}

impl SolusClient {
    /// Create a client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send one chat turn
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Network`] when the server is unreachable and
    /// [`ChatError::Http`] for non-success status codes.
    pub async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!(%url, text_len = request.text.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| ChatError::Network(format!("invalid response body: {e}")))
    }

    /// Probe the server health endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the server is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), ChatError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChatError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_conversation_id() {
        let request = ChatRequest {
            text: "hello".to_string(),
            user_id: "solus_abc".to_string(),
            conversation_id: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["text"], "hello");
        assert!(json.get("conversation_id").is_none());
    }

    #[test]
    fn request_includes_conversation_id_when_set() {
        let request = ChatRequest {
            text: "hello".to_string(),
            user_id: "solus_abc".to_string(),
            conversation_id: Some("conv-7".to_string()),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["conversation_id"], "conv-7");
    }

    #[test]
    fn reply_parses_with_action() {
        let raw = r#"{
            "response": "Added milk to your list.",
            "conversation_id": "conv-7",
            "action": {"type": "todo_add", "params": {"task": "milk"}}
        }"#;
        let reply: ChatReply = serde_json::from_str(raw).expect("parse");
        assert_eq!(reply.response_text, "Added milk to your list.");
        assert_eq!(reply.conversation_id, "conv-7");
        let action = reply.action.expect("action");
        assert_eq!(action.kind, "todo_add");
        assert_eq!(action.params["task"], "milk");
    }

    #[test]
    fn reply_parses_without_action() {
        let raw = r#"{"response": "Hi!", "conversation_id": "conv-1"}"#;
        let reply: ChatReply = serde_json::from_str(raw).expect("parse");
        assert!(reply.action.is_none());
    }
}
