//! Compiler construction shared by the build commands.
//!
//! Target and option strings are resolved in order: the optional `kiln.toml`
//! profile first, then `--gfxip` / `--option` from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_common::GfxIpVersion;
use kiln_compiler::{Compiler, ReferenceBackend};
use kiln_config::loader::PROFILE_FILE;
use kiln_config::Profile;

use crate::{CliError, GlobalArgs};

/// Client name passed as the first option string.
pub const CLIENT_NAME: &str = "kiln";

/// Target used when neither the profile nor the command line names one.
pub const DEFAULT_GFXIP: GfxIpVersion = GfxIpVersion::new(10, 3, 0);

/// Loads the profile from `--config`, or from the working directory if it
/// holds a `kiln.toml`.
pub fn load_profile(global: &GlobalArgs) -> Result<Option<Profile>, CliError> {
    let dir = match &global.config {
        Some(dir) => dir.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            if !cwd.join(PROFILE_FILE).is_file() {
                return Ok(None);
            }
            cwd
        }
    };
    let profile = kiln_config::load_profile(&dir)
        .map_err(|e| format!("{}: {e}", dir.join(PROFILE_FILE).display()))?;
    log::debug!("loaded profile from {}", dir.display());
    Ok(Some(profile))
}

/// Resolves the GPU target: `--gfxip`, then the profile, then the default.
pub fn resolve_gfxip(
    global: &GlobalArgs,
    profile: Option<&Profile>,
) -> Result<GfxIpVersion, CliError> {
    if let Some(text) = &global.gfxip {
        return Ok(text.parse()?);
    }
    Ok(profile.and_then(Profile::gfxip).unwrap_or(DEFAULT_GFXIP))
}

/// Full option string list: client name, profile options, command-line options.
pub fn option_strings(global: &GlobalArgs, profile: Option<&Profile>) -> Vec<String> {
    let mut args = vec![CLIENT_NAME.to_string()];
    if let Some(profile) = profile {
        args.extend(profile.option_strings());
    }
    args.extend(global.options.iter().cloned());
    args
}

/// Creates a compiler instance backed by the reference backend.
pub fn open_compiler(global: &GlobalArgs) -> Result<Compiler, CliError> {
    let profile = load_profile(global)?;
    let gfxip = resolve_gfxip(global, profile.as_ref())?;
    let args = option_strings(global, profile.as_ref());
    let compiler = Compiler::new(gfxip, &args, Arc::new(ReferenceBackend::new()))?;
    Ok(compiler)
}

/// Reads an input file, naming the path in the error.
pub fn read_input(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()).into())
}

/// Writes an output file, creating its parent directory.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    Ok(())
}

/// Default output path: the input with its extension replaced.
pub fn default_output(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}
