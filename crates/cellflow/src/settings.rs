//! Engine settings persistence.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/cellflow/settings.json
//! - Linux: ~/.config/cellflow/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\cellflow\settings.json

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of downstream cells listed individually in a dependency panel.
pub const DEFAULT_DOWNSTREAM_DISPLAY_LIMIT: usize = 3;

/// How input prompts are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// `In [n]:`
    #[default]
    Classical,
    /// `In [n]:` followed by a `...:` marker per additional source line
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Ask the backend to abort queued work after an error, unless a run says otherwise
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,

    /// How many downstream identities a dependency panel lists individually
    #[serde(default = "default_downstream_display_limit")]
    pub downstream_display_limit: usize,

    #[serde(default)]
    pub prompt_style: PromptStyle,
}

fn default_stop_on_error() -> bool {
    true
}

fn default_downstream_display_limit() -> usize {
    DEFAULT_DOWNSTREAM_DISPLAY_LIMIT
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            downstream_display_limit: DEFAULT_DOWNSTREAM_DISPLAY_LIMIT,
            prompt_style: PromptStyle::Classical,
        }
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cellflow")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist
pub fn load_settings() -> EngineSettings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> EngineSettings {
    if !path.exists() {
        return EngineSettings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("[settings] Ignoring unparsable {:?}: {}", path, e);
            EngineSettings::default()
        }),
        Err(e) => {
            warn!("[settings] Failed to read {:?}: {}", path, e);
            EngineSettings::default()
        }
    }
}

/// Save settings to disk
pub fn save_settings(settings: &EngineSettings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &EngineSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
