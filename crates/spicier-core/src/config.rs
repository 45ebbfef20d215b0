//! Process and external tool configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the batch simulator binary.
pub const SIMULATOR_ENV: &str = "SPICIER_NGSPICE";
/// Environment variable overriding the behavioral-model compiler binary.
pub const MODEL_COMPILER_ENV: &str = "SPICIER_OPENVAF";

const DEFAULT_SIMULATOR: &str = "ngspice";
const DEFAULT_MODEL_COMPILER: &str = "openvaf";

/// Locations of the external tools.
///
/// Bare command names are resolved through `PATH` when the process starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Batch circuit simulator (ngspice).
    pub simulator: PathBuf,
    /// Verilog-A compiler producing OSDI model libraries (OpenVAF).
    pub model_compiler: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            simulator: PathBuf::from(DEFAULT_SIMULATOR),
            model_compiler: PathBuf::from(DEFAULT_MODEL_COMPILER),
        }
    }
}

impl ToolPaths {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key).map(PathBuf::from))
    }

    /// Defaults with overrides taken from `lookup`, for callers that keep
    /// their own environment snapshot.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let defaults = Self::default();
        Self {
            simulator: lookup(SIMULATOR_ENV)
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(defaults.simulator),
            model_compiler: lookup(MODEL_COMPILER_ENV)
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(defaults.model_compiler),
        }
    }

    pub fn with_simulator(mut self, path: impl Into<PathBuf>) -> Self {
        self.simulator = path.into();
        self
    }

    pub fn with_model_compiler(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_compiler = path.into();
        self
    }
}

/// Process configuration supplied alongside a netlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Directories searched, in order, for relative include and library paths
    /// after the netlist's own directory.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    #[serde(default)]
    pub tools: ToolPaths,
}

impl ProcessConfig {
    /// Configuration with tool paths taken from the environment.
    pub fn from_env() -> Self {
        Self {
            include_paths: Vec::new(),
            tools: ToolPaths::from_env(),
        }
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Directory relative paths in a netlist are resolved against.
    pub fn base_dir(source: Option<&Path>) -> Option<PathBuf> {
        source
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tools() {
        let tools = ToolPaths::default();
        assert_eq!(tools.simulator, PathBuf::from("ngspice"));
        assert_eq!(tools.model_compiler, PathBuf::from("openvaf"));
    }

    #[test]
    fn test_lookup_overrides() {
        let tools = ToolPaths::from_lookup(|key| match key {
            SIMULATOR_ENV => Some(PathBuf::from("/opt/ngspice/bin/ngspice")),
            MODEL_COMPILER_ENV => Some(PathBuf::new()),
            _ => None,
        });
        assert_eq!(tools.simulator, PathBuf::from("/opt/ngspice/bin/ngspice"));
        // Empty override falls back to the default.
        assert_eq!(tools.model_compiler, PathBuf::from("openvaf"));
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(
            ProcessConfig::base_dir(Some(Path::new("/work/amp/top.cir"))),
            Some(PathBuf::from("/work/amp"))
        );
        assert_eq!(ProcessConfig::base_dir(Some(Path::new("top.cir"))), None);
        assert_eq!(ProcessConfig::base_dir(None), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ProcessConfig =
            serde_json::from_str(r#"{"include_paths": ["/pdk/models"]}"#).unwrap();
        assert_eq!(config.include_paths, vec![PathBuf::from("/pdk/models")]);
        assert_eq!(config.tools, ToolPaths::default());
    }
}
