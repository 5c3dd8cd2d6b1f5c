use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::llm_client::{Generator, UpstreamError};

enum Reply {
    Text(String),
    Fail(UpstreamError),
    Hang,
}

/// Upstream stand-in that counts calls.
pub struct StubGenerator {
    reply: Reply,
    calls: AtomicU32,
}

impl StubGenerator {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
        }
    }

    pub fn valid_suggestions() -> Vec<String> {
        vec![
            "Your exclusive spring picks".to_string(),
            "Fresh arrivals picked for you".to_string(),
            "Unlock your spring look today".to_string(),
        ]
    }

    pub fn valid() -> Self {
        let reply = serde_json::json!({
            "suggestions": Self::valid_suggestions(),
            "insight": "Lead with the benefit and keep it personal."
        });
        Self::with(Reply::Text(reply.to_string()))
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Reply::Text(text.to_string()))
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self::with(Reply::Fail(err))
    }

    pub fn hanging() -> Self {
        Self::with(Reply::Hang)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(err) => Err(err.clone()),
            Reply::Hang => std::future::pending().await,
        }
    }
}
