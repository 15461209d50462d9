// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use crate::texture_params::FilterMode;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextureSettings {
    /// Sampler uniform set by the full-screen render path.
    pub sampler_uniform: String,
    /// Flip decoded images so the first file row lands at the bottom of the texture.
    pub flip_vertically: bool,
    pub default_mag_filter: FilterMode,
    pub default_min_filter: FilterMode,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            sampler_uniform: String::from("tex"),
            flip_vertically: false,
            default_mag_filter: FilterMode::Linear,
            default_min_filter: FilterMode::Linear,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deserialization Error: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Serialization Error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl TextureSettings {
    /// Loads settings from a specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let settings: TextureSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Saves settings to a specified file path, ensuring the directory exists.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
