//! LLVM-style compiler option strings.

use std::path::PathBuf;

use kiln_cache::CacheMode;

use crate::error::ConfigError;

/// Typed view of a compiler option set.
///
/// The raw strings are kept because the cache key policy hashes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// The strings as given, including the client name.
    pub args: Vec<String>,
    /// Directory for pipeline dumps.
    pub pipeline_dump_dir: PathBuf,
    /// Write pipeline dumps.
    pub enable_pipeline_dump: bool,
    /// Directory for the on-disk shader cache.
    pub shader_cache_file_dir: PathBuf,
    /// Shader cache mode.
    pub shader_cache_mode: CacheMode,
    /// Client executable name.
    pub executable_name: String,
    /// Run the SPIR-V optimizer before translation.
    pub enable_spirv_opt: bool,
    /// Use shadow descriptor tables.
    pub enable_shadow_desc: bool,
    /// High half of the shadow descriptor table address.
    pub shadow_desc_table_ptr_high: u32,
    /// Let the backend choose loop unroll counts dynamically.
    pub enable_dynamic_loop_unroll: bool,
    /// Fixed loop unroll count; 0 leaves the choice to the pass pipeline.
    pub force_loop_unroll_count: u32,
    /// Translate and lower shader modules at module build time.
    pub enable_shader_module_opt: bool,
    /// Skip loop-invariant code motion.
    pub disable_licm: bool,
    /// Subgroup size reported to shaders.
    pub subgroup_size: u32,
    /// Strip debug instructions before hashing and caching modules.
    pub trim_debug_info: bool,
    /// Cache fragment and non-fragment halves of graphics pipelines separately.
    pub enable_per_stage_cache: bool,
    /// Print verbose build information.
    pub enable_outs: bool,
    /// Print verbose error information.
    pub enable_errs: bool,
    /// File receiving debug output.
    pub log_file_dbgs: PathBuf,
    /// File receiving verbose output.
    pub log_file_outs: PathBuf,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            args: vec!["kiln".to_string()],
            pipeline_dump_dir: PathBuf::new(),
            enable_pipeline_dump: false,
            shader_cache_file_dir: PathBuf::new(),
            shader_cache_mode: CacheMode::Runtime,
            executable_name: "kiln".to_string(),
            enable_spirv_opt: false,
            enable_shadow_desc: true,
            shadow_desc_table_ptr_high: 2,
            enable_dynamic_loop_unroll: false,
            force_loop_unroll_count: 0,
            enable_shader_module_opt: false,
            disable_licm: false,
            subgroup_size: 64,
            trim_debug_info: true,
            enable_per_stage_cache: true,
            enable_outs: false,
            enable_errs: false,
            log_file_dbgs: PathBuf::new(),
            log_file_outs: PathBuf::new(),
        }
    }
}

fn parse_bool(option: &str, value: Option<&str>) -> Result<bool, ConfigError> {
    match value {
        None | Some("1") | Some("true") => Ok(true),
        Some("0") | Some("false") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_u32(option: &str, value: Option<&str>) -> Result<u32, ConfigError> {
    let value = value.unwrap_or("");
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: "expected an unsigned integer".to_string(),
    })
}

fn require<'a>(option: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    value.ok_or_else(|| ConfigError::InvalidValue {
        option: option.to_string(),
        value: String::new(),
        reason: "a value is required".to_string(),
    })
}

impl CompilerOptions {
    /// Parses an option set. The first string is the client name.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut options = Self {
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            ..Self::default()
        };
        if options.args.is_empty() {
            options.args.push("kiln".to_string());
        }

        for arg in args.iter().skip(1) {
            options.apply(arg.as_ref())?;
        }
        Ok(options)
    }

    fn apply(&mut self, arg: &str) -> Result<(), ConfigError> {
        let body = arg.trim_start_matches('-');
        if body.len() == arg.len() {
            return Err(ConfigError::UnknownOption(arg.to_string()));
        }
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };

        match name {
            "pipeline-dump-dir" => self.pipeline_dump_dir = require(name, value)?.into(),
            "enable-pipeline-dump" => self.enable_pipeline_dump = parse_bool(name, value)?,
            "shader-cache-file-dir" => self.shader_cache_file_dir = require(name, value)?.into(),
            "shader-cache-mode" => {
                let raw = parse_u32(name, value)?;
                self.shader_cache_mode =
                    CacheMode::try_from(raw).map_err(|e| ConfigError::InvalidValue {
                        option: name.to_string(),
                        value: raw.to_string(),
                        reason: e.to_string(),
                    })?;
            }
            "executable-name" => self.executable_name = require(name, value)?.to_string(),
            "enable-spirv-opt" => self.enable_spirv_opt = parse_bool(name, value)?,
            "enable-shadow-desc" => self.enable_shadow_desc = parse_bool(name, value)?,
            "shadow-desc-table-ptr-high" => {
                self.shadow_desc_table_ptr_high = parse_u32(name, value)?
            }
            "enable-dynamic-loop-unroll" => {
                self.enable_dynamic_loop_unroll = parse_bool(name, value)?
            }
            "force-loop-unroll-count" => self.force_loop_unroll_count = parse_u32(name, value)?,
            "enable-shader-module-opt" => self.enable_shader_module_opt = parse_bool(name, value)?,
            "disable-licm" => self.disable_licm = parse_bool(name, value)?,
            "subgroup-size" => self.subgroup_size = parse_u32(name, value)?,
            "trim-debug-info" => self.trim_debug_info = parse_bool(name, value)?,
            "enable-per-stage-cache" => self.enable_per_stage_cache = parse_bool(name, value)?,
            "enable-outs" => self.enable_outs = parse_bool(name, value)?,
            "enable-errs" => self.enable_errs = parse_bool(name, value)?,
            "log-file-dbgs" => self.log_file_dbgs = require(name, value)?.into(),
            "log-file-outs" => self.log_file_outs = require(name, value)?.into(),
            _ => return Err(ConfigError::UnknownOption(arg.to_string())),
        }
        Ok(())
    }

    /// The client name (first option string).
    pub fn client_name(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("kiln")
    }

    /// Returns `true` if this option set redirects verbose or error output.
    pub fn redirects_output(&self) -> bool {
        self.enable_outs || self.enable_errs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_options() {
        let options = CompilerOptions::parse(&["amdvlk"]).unwrap();
        assert_eq!(options.client_name(), "amdvlk");
        assert_eq!(options.shader_cache_mode, CacheMode::Runtime);
        assert_eq!(options.subgroup_size, 64);
        assert!(options.trim_debug_info);
        assert!(options.enable_per_stage_cache);
        assert!(!options.redirects_output());
    }

    #[test]
    fn bool_forms() {
        let options = CompilerOptions::parse(&[
            "kiln",
            "-enable-outs",
            "-trim-debug-info=0",
            "-enable-per-stage-cache=false",
            "--disable-licm=true",
        ])
        .unwrap();
        assert!(options.enable_outs);
        assert!(!options.trim_debug_info);
        assert!(!options.enable_per_stage_cache);
        assert!(options.disable_licm);
        assert!(options.redirects_output());
    }

    #[test]
    fn valued_options() {
        let options = CompilerOptions::parse(&[
            "kiln",
            "-shader-cache-mode=4",
            "-shader-cache-file-dir=/var/cache/kiln",
            "-subgroup-size=32",
            "-executable-name=game",
        ])
        .unwrap();
        assert_eq!(options.shader_cache_mode, CacheMode::OnDiskReadOnly);
        assert_eq!(options.shader_cache_file_dir, PathBuf::from("/var/cache/kiln"));
        assert_eq!(options.subgroup_size, 32);
        assert_eq!(options.executable_name, "game");
    }

    #[test]
    fn unknown_option_fails() {
        let err = CompilerOptions::parse(&["kiln", "-frobnicate"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(ref o) if o == "-frobnicate"));
        let err = CompilerOptions::parse(&["kiln", "subgroup-size=32"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(_)));
    }

    #[test]
    fn bad_values_fail() {
        assert!(matches!(
            CompilerOptions::parse(&["kiln", "-subgroup-size=wide"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CompilerOptions::parse(&["kiln", "-enable-outs=maybe"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CompilerOptions::parse(&["kiln", "-shader-cache-mode=9"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CompilerOptions::parse(&["kiln", "-pipeline-dump-dir"]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_args_get_default_client() {
        let options = CompilerOptions::parse::<&str>(&[]).unwrap();
        assert_eq!(options.args, vec!["kiln".to_string()]);
    }
}
