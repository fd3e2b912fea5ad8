use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{EditorError, Result};

/// Host-supplied editor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Keep inline content directly under the root instead of wrapping it in blocks.
    pub allow_inline_at_root: bool,
    /// Block used to wrap stray inline content and to fill an empty document.
    pub default_block: SmolStr,
    /// Classes toggled only for rendering (hover, selection highlights).
    /// Changes limited to these never reach history.
    pub rendering_only_classes: Vec<SmolStr>,
    /// Oldest steps are dropped beyond this many.
    pub max_history_steps: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            allow_inline_at_root: false,
            default_block: SmolStr::new_static("p"),
            rendering_only_classes: vec![
                SmolStr::new_static("is-selected"),
                SmolStr::new_static("is-hovered"),
            ],
            max_history_steps: 100,
        }
    }
}

impl EditorConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(EditorError::InvalidConfig)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_block.is_empty() {
            return Err(EditorError::Configuration(
                "default_block must name an element".into(),
            ));
        }
        if self.max_history_steps == 0 {
            return Err(EditorError::Configuration(
                "max_history_steps must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
