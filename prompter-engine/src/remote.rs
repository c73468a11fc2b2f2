//! Remote content API client.
//!
//! The remote store is a flat key → string map: `GET content_endpoint`
//! returns the whole map as one JSON object; `POST save_endpoint` accepts
//! `{ "changes": [{ "field_name": ..., "field_value": ... }] }`. No
//! pagination, no ETags, no version field.
//!
//! The network seam is the [`ContentSource`] trait so schedulers and tests
//! can swap in fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;

use prompter_core::config::EngineConfig;
use prompter_core::types::{FieldChange, FieldName};

use crate::error::EngineError;

/// Something the scheduler can fetch content from and push saves to.
pub trait ContentSource: Send {
    fn fetch_content(&self) -> Result<BTreeMap<FieldName, String>, EngineError>;
    fn push_save(&self, changes: &[FieldChange]) -> Result<(), EngineError>;
}

/// HTTP implementation of [`ContentSource`].
pub struct RemoteClient {
    agent: ureq::Agent,
    content_endpoint: String,
    save_endpoint: String,
}

impl RemoteClient {
    pub fn new(config: &EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.save_timeout_ms))
            .build();
        Self {
            agent,
            content_endpoint: config.content_endpoint.clone(),
            save_endpoint: config.save_endpoint.clone(),
        }
    }
}

impl ContentSource for RemoteClient {
    fn fetch_content(&self) -> Result<BTreeMap<FieldName, String>, EngineError> {
        let response = self
            .agent
            .get(&self.content_endpoint)
            .call()
            .map_err(|err| EngineError::Network(err.to_string()))?;

        let fields: BTreeMap<String, String> = response
            .into_json()
            .map_err(|err| EngineError::Network(format!("invalid content payload: {err}")))?;

        Ok(fields
            .into_iter()
            .map(|(name, value)| (FieldName::from(name), value))
            .collect())
    }

    fn push_save(&self, changes: &[FieldChange]) -> Result<(), EngineError> {
        self.agent
            .post(&self.save_endpoint)
            .send_json(json!({ "changes": changes }))
            .map_err(|err| EngineError::Network(err.to_string()))?;
        Ok(())
    }
}
