//! Model presets: sampling parameters plus a system prompt.

use crate::core::{RecordPayload, Result, StoreError};
use crate::manager::RecordManager;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type PresetManager = RecordManager<PresetPayload>;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetPayload {
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub random_seed: i64,
    pub min_length: u32,
    /// Zero means no explicit limit.
    pub max_new_tokens: u32,
}

impl Default for PresetPayload {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            random_seed: 42,
            min_length: 0,
            max_new_tokens: 0,
        }
    }
}

impl PresetPayload {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("temperature {} outside [0, 2]", self.temperature));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(format!("top_p {} outside [0, 1]", self.top_p));
        }
        if self.max_new_tokens != 0 && self.min_length > self.max_new_tokens {
            return Err("min_length exceeds max_new_tokens".to_string());
        }
        Ok(())
    }
}

impl RecordPayload for PresetPayload {
    const KIND: &'static str = "preset";
    const FILE_EXTENSION: &'static str = "json";
    const DEFAULT_NAME: &'static str = "default";

    fn blank() -> Self {
        PresetPayload::default()
    }

    fn seed() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            ..Self::default()
        }
    }
}

impl RecordManager<PresetPayload> {
    /// Discards unsaved edits of the selected preset.
    pub fn reset_current(&self) -> bool {
        self.revert_current()
    }

    /// Writes the selected preset to `path`, e.g. for sharing.
    pub async fn export_current(&self, path: &Path) -> Result<()> {
        let name = self
            .current_name()
            .ok_or_else(|| StoreError::NotFound("<current>".to_string()))?;
        self.export(&name, path).await
    }
}
