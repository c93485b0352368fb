use std::sync::Arc;

use folio_config::{ConfigError, HistoryConfig};
use folio_state::{EditorState, Plugin, PluginKey, PluginState, Transaction};
use uuid::Uuid;

use crate::history::{HistoryState, Settings};

const HISTORY_KEY_ID: Uuid = Uuid::from_u128(0x6c1f_2a9e_0d4b_4f7a_9e35_b8c0_12d4_7a61);
const CLOSE_HISTORY_KEY_ID: Uuid = Uuid::from_u128(0x3b8e_71c4_5a2d_4e90_8f16_d07a_c3e5_29b4);

/// Key of the history plugin's state field and of the metadata it puts on
/// undo and redo transactions.
pub fn history_key() -> PluginKey {
    PluginKey::with_id("history", HISTORY_KEY_ID)
}

pub(crate) fn close_history_key() -> PluginKey {
    PluginKey::with_id("closeHistory", CLOSE_HISTORY_KEY_ID)
}

/// Tracks changes so they can be undone and redone.
pub struct History {
    key: PluginKey,
    settings: Settings,
}

impl History {
    /// Fails with [`ConfigError::InvalidValue`] when `config` doesn't
    /// validate, e.g. for a depth of zero.
    pub fn new(config: HistoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: HistoryConfig) -> Self {
        Self {
            key: history_key(),
            settings: Settings {
                config,
                preserve_items: false,
            },
        }
    }

    /// Keep undone items around as position maps. Needed when another
    /// plugin rebases local changes over remote ones.
    pub fn preserve_items(mut self, preserve: bool) -> Self {
        self.settings.preserve_items = preserve;
        self
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.settings.config
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_valid_config(HistoryConfig::default())
    }
}

impl Plugin for History {
    fn key(&self) -> &PluginKey {
        &self.key
    }

    fn init(&self, _state: &EditorState) -> Option<PluginState> {
        Some(Arc::new(HistoryState::new(self.settings)))
    }

    fn apply(&self, tr: &Transaction, value: &PluginState, old_state: &EditorState, _new_state: &EditorState) -> PluginState {
        match (**value).downcast_ref::<HistoryState>() {
            Some(history) => Arc::new(history.apply_transaction(old_state, tr)),
            None => Arc::clone(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_depth_is_rejected() {
        let config = HistoryConfig {
            depth: 0,
            ..HistoryConfig::default()
        };
        assert!(matches!(
            History::new(config),
            Err(ConfigError::InvalidValue { field: "depth", .. })
        ));
    }

    #[test]
    fn test_valid_config_is_kept() {
        let config = HistoryConfig {
            depth: 3,
            new_group_delay: 100,
        };
        let history = History::new(config).unwrap();
        assert_eq!(history.config(), &config);
        assert_eq!(History::default().config(), &HistoryConfig::default());
    }
}
