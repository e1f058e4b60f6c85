// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-backed reply provider.
//!
//! One attempt per call; the intelligence agent owns the retry/backoff
//! schedule and the canned fallback. The provider key rides in the
//! Authorization header and is never logged.

use std::time::Duration;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::providers::{ProviderFuture, Reply, ReplyContext};

/// Remote LLM reply endpoint.
pub struct HttpReply {
    client: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    reply: String,
}

impl HttpReply {
    pub fn new(endpoint: String, key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, endpoint, key }
    }

    async fn request(&self, context: &ReplyContext) -> Result<String, PipelineError> {
        let mut req = self.client.post(&self.endpoint).json(context);
        if let Some(ref key) = self.key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::TransientProvider(format!("reply transport: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::TransientProvider(format!(
                "reply endpoint returned {}",
                resp.status()
            )));
        }

        let body: ReplyBody = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(format!("malformed reply body: {e}")))?;

        if body.reply.trim().is_empty() {
            return Err(PipelineError::ContractViolation("empty reply text".into()));
        }
        Ok(body.reply)
    }
}

impl Reply for HttpReply {
    fn generate(&self, context: ReplyContext) -> ProviderFuture<'_, String> {
        Box::pin(async move { self.request(&context).await })
    }
}
