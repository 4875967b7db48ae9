//! Agent configuration snapshots and their fingerprints
//!
//! A snapshot is every builder setting that changes how the agent answers.
//! Two snapshots that serialize to the same canonical JSON share a
//! fingerprint, so re-renders and reordered document selections do not
//! trigger a new preview.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Composite of the agent tunables shown in the builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSnapshot {
    /// Domain expertise toggle
    #[serde(default)]
    pub domain_enabled: bool,

    /// Persona selector (e.g. "sales_rep")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Selected knowledge document ids, kept sorted ascending
    #[serde(default)]
    pub document_ids: BTreeSet<u64>,

    /// Web search toggle
    #[serde(default)]
    pub web_search: bool,

    /// Sites web search is restricted to
    #[serde(default)]
    pub site_whitelist: Vec<String>,

    /// Grounding mode (e.g. "strict", "blended")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_mode: Option<String>,

    /// Expertise level (e.g. "expert")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expertise_level: Option<String>,

    /// Freeform additional context
    #[serde(default)]
    pub additional_context: String,

    /// Persona override text
    #[serde(default)]
    pub persona_override: String,

    /// Domain category (e.g. "real_estate")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_category: Option<String>,
}

impl ConfigurationSnapshot {
    /// Canonical JSON used for equality and fingerprinting
    ///
    /// Field order is fixed by the struct and document ids serialize in
    /// ascending order.
    pub fn canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Hex SHA-256 of the canonical JSON
    pub fn fingerprint(&self) -> Result<String> {
        let digest = Sha256::digest(self.canonical_json()?.as_bytes());
        Ok(hex::encode(digest))
    }

    /// Number of knowledge documents selected
    pub fn document_count(&self) -> usize {
        self.document_ids.len()
    }

    /// Select documents, ignoring order and duplicates
    pub fn with_documents(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.document_ids = ids.into_iter().collect();
        self
    }

    /// Set the persona
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Synthetic prompt the preview sends on the operator's behalf
    pub fn preview_prompt(&self) -> String {
        let persona = self
            .persona
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("default");

        let mut prompt = format!("You are previewing this agent with the \"{}\" persona", persona);

        if self.domain_enabled {
            if let Some(category) = self.domain_category.as_deref().filter(|c| !c.is_empty()) {
                prompt.push_str(&format!(" specialised in {}", category));
            }
            if let Some(level) = self.expertise_level.as_deref().filter(|l| !l.is_empty()) {
                prompt.push_str(&format!(" at {} level", level));
            }
        }

        let count = self.document_count();
        let sources = if count == 1 { "source" } else { "sources" };
        prompt.push_str(&format!(", grounded in {} curated {}", count, sources));

        if self.web_search {
            prompt.push_str(" with web search enabled");
        }

        prompt.push_str(". Introduce yourself in two or three sentences and explain how you can help.");
        prompt
    }
}
