//! Profile loading and validation.

use std::path::Path;

use kiln_cache::CacheMode;
use kiln_common::GfxIpVersion;

use crate::error::ConfigError;
use crate::types::Profile;

/// File name of the tool profile.
pub const PROFILE_FILE: &str = "kiln.toml";

/// Loads and validates `<dir>/kiln.toml`.
pub fn load_profile(dir: &Path) -> Result<Profile, ConfigError> {
    let content = std::fs::read_to_string(dir.join(PROFILE_FILE))?;
    load_profile_from_str(&content)
}

/// Parses and validates a profile from a string.
pub fn load_profile_from_str(content: &str) -> Result<Profile, ConfigError> {
    let profile: Profile =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_profile(&profile)?;
    Ok(profile)
}

fn validate_profile(profile: &Profile) -> Result<(), ConfigError> {
    if let Some(gfxip) = &profile.compiler.gfxip {
        gfxip
            .parse::<GfxIpVersion>()
            .map_err(|e| ConfigError::ValidationError(format!("compiler.gfxip: {e}")))?;
    }
    if let Some(mode) = profile.cache.mode {
        CacheMode::try_from(mode)
            .map_err(|e| ConfigError::ValidationError(format!("cache.mode: {e}")))?;
    }
    if let Some(bad) = profile.compiler.options.iter().find(|o| !o.starts_with('-')) {
        return Err(ConfigError::ValidationError(format!(
            "compiler.options: '{bad}' does not start with '-'"
        )));
    }
    Ok(())
}

impl Profile {
    /// The configured GPU target, if any.
    pub fn gfxip(&self) -> Option<GfxIpVersion> {
        self.compiler.gfxip.as_deref().and_then(|s| s.parse().ok())
    }

    /// Option strings implied by the profile, without the client name.
    ///
    /// Cache settings come after the explicit options so they win.
    pub fn option_strings(&self) -> Vec<String> {
        let mut options = self.compiler.options.clone();
        if let Some(mode) = self.cache.mode {
            options.push(format!("-shader-cache-mode={mode}"));
        }
        if let Some(dir) = &self.cache.dir {
            options.push(format!("-shader-cache-file-dir={}", dir.display()));
        }
        options
    }
}
