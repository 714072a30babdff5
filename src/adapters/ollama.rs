//! Ollama chat adapter for the advisory oracle.
//!
//! `POST {oracle_url}/api/chat` with a system + user message pair and
//! `stream: false`; the reply text is `message.content`.

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::app::ports::OraclePort;
use crate::config::SupervisorConfig;
use crate::error::OracleError;

#[derive(Deserialize)]
struct ChatReply {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct OllamaOracle {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaOracle {
    pub fn new(config: &SupervisorConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(config.oracle_timeout())
            .build()
            .map_err(|e| OracleError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.oracle_url.trim_end_matches('/').to_string(),
            model: config.oracle_model.clone(),
        })
    }
}

fn classify(e: &reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Unavailable(e.to_string())
    }
}

impl OraclePort for OllamaOracle {
    fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "stream": false
        });

        let resp = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| classify(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let reply: ChatReply = resp.json().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout
            } else {
                OracleError::Malformed(format!("unexpected chat reply: {e}"))
            }
        })?;
        Ok(reply.message.content)
    }
}
