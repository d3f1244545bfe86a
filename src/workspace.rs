use crate::chat::ChatManager;
use crate::config::WorkspaceConfig;
use crate::core::{Result, StoreError};
use crate::manager::SelectionListener;
use crate::preset::PresetManager;
use std::sync::Arc;
use tracing::info;

/// Owns the chat and preset stores of one data directory.
///
/// Construct once at startup and pass by reference; there is no global instance.
pub struct Workspace {
    config: WorkspaceConfig,
    chats: ChatManager,
    presets: PresetManager,
}

impl Workspace {
    pub async fn open(config: WorkspaceConfig) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        let (chats, presets) = futures::try_join!(
            ChatManager::open(config.chat_store()),
            PresetManager::open(config.preset_store()),
        )?;
        info!(
            root = %config.root().display(),
            chats = chats.len(),
            presets = presets.len(),
            "workspace opened"
        );
        Ok(Self {
            config,
            chats,
            presets,
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn chats(&self) -> &ChatManager {
        &self.chats
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    /// True only if both stores write to disk.
    pub fn is_persistent(&self) -> bool {
        self.chats.is_persistent() && self.presets.is_persistent()
    }

    pub fn set_selection_listener(&self, listener: Arc<dyn SelectionListener>) {
        self.chats.set_selection_listener(Arc::clone(&listener));
        self.presets.set_selection_listener(listener);
    }

    pub async fn flush(&self) -> Result<()> {
        let (chats, presets) = futures::join!(self.chats.flush(), self.presets.flush());
        chats.and(presets)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (chats, presets) = futures::join!(self.chats.shutdown(), self.presets.shutdown());
        chats.and(presets)
    }
}
