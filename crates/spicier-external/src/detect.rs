//! Model capability detection.
//!
//! Decides, from netlist text alone, whether every device model a netlist
//! uses can be evaluated by the in-process engine. Anything the scan cannot
//! prove native is routed to the external simulator: an include that cannot
//! be resolved or read is never assumed safe.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use spicier_core::ProcessConfig;
use spicier_core::netlist::{
    LogicalLine, logical_lines, parse_include, parse_model_card, split_tokens, unquote,
};

use crate::paths::{is_model_library, is_model_source, resolve_include};

/// Default number of bytes read from each included file.
pub const DEFAULT_SCAN_BUDGET: u64 = 5 * 1024 * 1024;

/// MOSFET `LEVEL` at and above which models are evaluated externally.
pub const DEFAULT_LEVEL_THRESHOLD: f64 = 70.0;

/// Model types the in-process device catalog evaluates.
pub const BUILTIN_MODEL_TYPES: &[&str] = &[
    "r", "res", "c", "cap", "l", "ind", "d", "npn", "pnp", "njf", "pjf", "nmos", "pmos", "nmf",
    "pmf", "sw", "csw", "urc", "ltra", "txl", "cpl", "vdmos",
];

/// Compact-model families that are only available as compiled behavioral
/// models. Matched as prefixes of the lower-cased `.model` type.
pub const ADVANCED_MODEL_FAMILIES: &[&str] = &[
    "bsimcmg", "bsimimg", "bsimsoi", "bsimbulk", "bsim6", "hisim", "psp", "vbic", "hicum",
    "mextram", "ekv", "asmhemt", "mvsg", "r2_cmc", "l_utsoi",
];

/// Tunables for the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Bytes read from each included file before giving up on the rest.
    pub scan_budget: u64,
    /// MOSFET level threshold.
    pub level_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scan_budget: DEFAULT_SCAN_BUDGET,
            level_threshold: DEFAULT_LEVEL_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    pub fn with_scan_budget(mut self, bytes: u64) -> Self {
        self.scan_budget = bytes;
        self
    }

    pub fn with_level_threshold(mut self, level: f64) -> Self {
        self.level_threshold = level;
        self
    }
}

/// Why a netlist needs the external simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalReason {
    /// A `pre_osdi` directive loads a compiled model library.
    PreloadDirective { line: usize },
    /// A `.model` card names an advanced compact-model family.
    AdvancedModel {
        line: usize,
        model: String,
        model_type: String,
    },
    /// A MOSFET `.model` card uses a level at or above the threshold.
    MosfetLevel {
        line: usize,
        model: String,
        level: f64,
    },
    /// An include targets a model library or behavioral source.
    ModelArtifact { line: usize, path: String },
    /// An include could not be resolved to a file.
    UnresolvedInclude { line: usize, path: String },
    /// A resolved include could not be read.
    UnreadableInclude { path: PathBuf, message: String },
    /// The reason was found inside an included file.
    Included {
        file: PathBuf,
        reason: Box<ExternalReason>,
    },
}

impl fmt::Display for ExternalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalReason::PreloadDirective { line } => {
                write!(f, "line {line}: pre_osdi model library")
            }
            ExternalReason::AdvancedModel {
                line,
                model,
                model_type,
            } => write!(f, "line {line}: model {model} uses {model_type}"),
            ExternalReason::MosfetLevel { line, model, level } => {
                write!(f, "line {line}: model {model} is MOSFET level {level}")
            }
            ExternalReason::ModelArtifact { line, path } => {
                write!(f, "line {line}: includes model artifact {path}")
            }
            ExternalReason::UnresolvedInclude { line, path } => {
                write!(f, "line {line}: cannot resolve include {path}")
            }
            ExternalReason::UnreadableInclude { path, message } => {
                write!(f, "cannot read include {}: {message}", path.display())
            }
            ExternalReason::Included { file, reason } => {
                write!(f, "{}: {reason}", file.display())
            }
        }
    }
}

/// Routing decision for a netlist.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSupport {
    /// Every model is evaluated in-process.
    Native,
    /// At least one model needs the external simulator.
    External(ExternalReason),
}

impl ModelSupport {
    pub fn is_external(&self) -> bool {
        matches!(self, ModelSupport::External(_))
    }
}

/// Whether a netlist must run on the external simulator.
pub fn requires_external(netlist: &str, source: Option<&Path>, process: &ProcessConfig) -> bool {
    detect_model_support(netlist, source, process, &DetectorConfig::default()).is_external()
}

/// Scan a netlist and report whether, and why, it needs the external simulator.
///
/// Lines are visited in file order, the first line included. Includes that
/// are not model artifacts are resolved and scanned for the same markers,
/// recursively: nested includes resolve against the including file's
/// directory, then the include paths. Each file is read at most once and
/// only up to the scan budget.
pub fn detect_model_support(
    netlist: &str,
    source: Option<&Path>,
    process: &ProcessConfig,
    config: &DetectorConfig,
) -> ModelSupport {
    let base_dir = ProcessConfig::base_dir(source);
    let mut scan = IncludeScan {
        process,
        config,
        scanned: HashSet::new(),
    };

    match scan.lines(&logical_lines(netlist), base_dir.as_deref()) {
        Some(reason) => ModelSupport::External(reason),
        None => ModelSupport::Native,
    }
}

/// Walk state shared across a netlist and the files it includes.
struct IncludeScan<'a> {
    process: &'a ProcessConfig,
    config: &'a DetectorConfig,
    scanned: HashSet<PathBuf>,
}

impl IncludeScan<'_> {
    fn lines(
        &mut self,
        lines: &[LogicalLine],
        base_dir: Option<&Path>,
    ) -> Option<ExternalReason> {
        for line in lines {
            if let Some(reason) = scan_line(line, self.config) {
                return Some(reason);
            }

            let Some(include) = parse_include(&line.text) else {
                continue;
            };
            let Some(path) =
                resolve_include(&include.path, base_dir, &self.process.include_paths)
            else {
                warn!(
                    "routing external: include `{}` on line {} cannot be resolved",
                    include.path, line.number
                );
                return Some(ExternalReason::UnresolvedInclude {
                    line: line.number,
                    path: include.path,
                });
            };
            if !self.scanned.insert(path.clone()) {
                continue;
            }

            if let Some(reason) = self.file(&path) {
                return Some(reason);
            }
        }
        None
    }

    fn file(&mut self, path: &Path) -> Option<ExternalReason> {
        let text = match read_bounded(path, self.config.scan_budget) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "routing external: include {} is unreadable: {}",
                    path.display(),
                    e
                );
                return Some(ExternalReason::UnreadableInclude {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        debug!("scanning include {} ({} bytes)", path.display(), text.len());

        self.lines(&logical_lines(&text), path.parent())
            .map(|reason| ExternalReason::Included {
                file: path.to_path_buf(),
                reason: Box::new(reason),
            })
    }
}

fn read_bounded(path: &Path, budget: u64) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    File::open(path)?.take(budget).read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Check one logical line for markers that force external routing.
fn scan_line(line: &LogicalLine, config: &DetectorConfig) -> Option<ExternalReason> {
    if is_preload_directive(&line.text) {
        return Some(ExternalReason::PreloadDirective { line: line.number });
    }

    if let Some(card) = parse_model_card(&line.text) {
        if is_advanced_model_type(&card.model_type) {
            return Some(ExternalReason::AdvancedModel {
                line: line.number,
                model: card.name,
                model_type: card.model_type,
            });
        }
        let is_mosfet = matches!(card.model_type.as_str(), "nmos" | "pmos");
        return card
            .level
            .filter(|level| is_mosfet && *level >= config.level_threshold)
            .map(|level| ExternalReason::MosfetLevel {
                line: line.number,
                model: card.name,
                level,
            });
    }

    let include = parse_include(&line.text)?;
    (is_model_library(&include.path) || is_model_source(&include.path)).then(|| {
        ExternalReason::ModelArtifact {
            line: line.number,
            path: include.path,
        }
    })
}

/// `.pre_osdi path` or, inside a control block, `pre_osdi path`.
pub fn is_preload_directive(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|t| t.eq_ignore_ascii_case(".pre_osdi") || t.eq_ignore_ascii_case("pre_osdi"))
}

/// Path argument of a preload directive.
pub fn preload_path(line: &str) -> Option<String> {
    if !is_preload_directive(line) {
        return None;
    }
    split_tokens(line).get(1).map(|t| unquote(t).to_string())
}

/// Whether a lower-cased model type is an advanced compact-model family.
pub fn is_advanced_model_type(model_type: &str) -> bool {
    ADVANCED_MODEL_FAMILIES
        .iter()
        .any(|family| model_type.starts_with(family))
}

/// Whether a lower-cased model type is evaluated by the in-process catalog.
pub fn is_builtin_model_type(model_type: &str) -> bool {
    BUILTIN_MODEL_TYPES.contains(&model_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn detect(netlist: &str) -> ModelSupport {
        detect_model_support(netlist, None, &ProcessConfig::default(), &DetectorConfig::default())
    }

    #[test]
    fn test_mosfet_level_threshold() {
        let high = "amp\nM1 d g 0 0 M1\n.model M1 NMOS LEVEL=70\n.end\n";
        assert_eq!(
            detect(high),
            ModelSupport::External(ExternalReason::MosfetLevel {
                line: 3,
                model: "M1".to_string(),
                level: 70.0
            })
        );

        let low = "amp\nM1 d g 0 0 M1\n.model M1 NMOS LEVEL=1\n.end\n";
        assert_eq!(detect(low), ModelSupport::Native);

        let custom = DetectorConfig::default().with_level_threshold(49.0);
        let bsim3 = "amp\n.model n1 nmos level=49\n";
        assert!(detect_model_support(bsim3, None, &ProcessConfig::default(), &custom).is_external());
    }

    #[test]
    fn test_preload_directive_always_external() {
        let netlist = "t\nR1 1 0 1k\n.pre_osdi \"x.osdi\"\n.op\n";
        assert!(matches!(
            detect(netlist),
            ModelSupport::External(ExternalReason::PreloadDirective { line: 3 })
        ));

        let in_control = "t\nR1 1 0 1k\n.control\npre_osdi models/x.osdi\n.endc\n";
        assert!(detect(in_control).is_external());
    }

    #[test]
    fn test_advanced_model_family() {
        let netlist = "t\n.model nfin bsimcmg (version=110)\n";
        assert!(matches!(
            detect(netlist),
            ModelSupport::External(ExternalReason::AdvancedModel { ref model_type, .. })
                if model_type == "bsimcmg"
        ));
    }

    #[test]
    fn test_comments_are_ignored() {
        let netlist = "t\n* .model c nmos level=80\nR1 1 0 1k ; .pre_osdi x\n";
        assert_eq!(detect(netlist), ModelSupport::Native);
    }

    #[test]
    fn test_first_line_is_scanned() {
        let netlist = ".pre_osdi \"x.osdi\"\nR1 1 0 1k\n.op\n";
        assert_eq!(
            detect(netlist),
            ModelSupport::External(ExternalReason::PreloadDirective { line: 1 })
        );

        let netlist = ".model title nmos level=72\nM1 d g 0 0 title\n";
        assert!(matches!(
            detect(netlist),
            ModelSupport::External(ExternalReason::MosfetLevel { line: 1, .. })
        ));
    }

    #[test]
    fn test_unresolvable_include_is_external() {
        let netlist = "t\n.include missing_models.lib\n";
        assert!(matches!(
            detect(netlist),
            ModelSupport::External(ExternalReason::UnresolvedInclude { line: 2, .. })
        ));
        assert!(requires_external(netlist, None, &ProcessConfig::default()));
    }

    #[test]
    fn test_artifact_include_is_external_without_resolution() {
        assert!(matches!(
            detect("t\n.include \"hicum.va\"\n"),
            ModelSupport::External(ExternalReason::ModelArtifact { .. })
        ));
        assert!(detect("t\n.inc lib/bsimcmg.osdi\n").is_external());
    }

    #[test]
    fn test_included_file_is_scanned() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("safe.lib"), "* diodes\n.model dx D(is=1e-14)\n").unwrap();
        fs::write(
            dir.path().join("pdk.lib"),
            "* pdk\n.lib tt\n.model nch nmos\n+ level=72\n.endl\n",
        )
        .unwrap();
        let source = dir.path().join("top.cir");

        let netlist = "t\n.include safe.lib\nD1 a 0 dx\n";
        let support = detect_model_support(
            netlist,
            Some(&source),
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        assert_eq!(support, ModelSupport::Native);

        let netlist = "t\n.lib pdk.lib tt\n";
        let support = detect_model_support(
            netlist,
            Some(&source),
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        match support {
            ModelSupport::External(ExternalReason::Included { file, reason }) => {
                assert_eq!(file.file_name().unwrap(), "pdk.lib");
                assert!(matches!(*reason, ExternalReason::MosfetLevel { line: 3, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_nested_include_is_resolved_and_scanned() {
        let dir = TempDir::new().unwrap();
        let pdk = dir.path().join("pdk");
        fs::create_dir_all(&pdk).unwrap();
        fs::write(dir.path().join("wrapper.lib"), "* wrapper\n.include pdk/corners.lib\n").unwrap();
        fs::write(pdk.join("corners.lib"), "* corners\n.include devices.lib\n").unwrap();
        fs::write(pdk.join("devices.lib"), "* devices\n.model nch nmos level=72\n").unwrap();
        let source = dir.path().join("top.cir");

        let support = detect_model_support(
            "t\n.include wrapper.lib\n",
            Some(&source),
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        let reason = match support {
            ModelSupport::External(ExternalReason::Included { file, reason }) => {
                assert_eq!(file.file_name().unwrap(), "wrapper.lib");
                reason
            }
            other => panic!("unexpected {other:?}"),
        };
        match *reason {
            ExternalReason::Included { file, reason } => {
                assert_eq!(file.file_name().unwrap(), "corners.lib");
                assert!(matches!(
                    *reason,
                    ExternalReason::Included { ref file, .. }
                        if file.file_name().unwrap() == "devices.lib"
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_nested_include_is_external() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("wrapper.lib"),
            "* wrapper\n.include does_not_exist.lib\n",
        )
        .unwrap();
        let source = dir.path().join("top.cir");

        let support = detect_model_support(
            "t\n.include wrapper.lib\n",
            Some(&source),
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        match support {
            ModelSupport::External(ExternalReason::Included { file, reason }) => {
                assert_eq!(file.file_name().unwrap(), "wrapper.lib");
                assert_eq!(
                    *reason,
                    ExternalReason::UnresolvedInclude {
                        line: 2,
                        path: "does_not_exist.lib".to_string()
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_include_cycles_terminate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.lib"), "* a\n.include b.lib\n").unwrap();
        fs::write(dir.path().join("b.lib"), "* b\n.include a.lib\n.model dx d\n").unwrap();
        let source = dir.path().join("top.cir");

        let support = detect_model_support(
            "t\n.include a.lib\n",
            Some(&source),
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        assert_eq!(support, ModelSupport::Native);
    }

    #[test]
    fn test_include_paths_are_searched() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("models.inc"), ".model q1 vbic\n").unwrap();
        let process = ProcessConfig::default().with_include_path(dir.path());
        let support = detect_model_support(
            "t\n.include models.inc\n",
            None,
            &process,
            &DetectorConfig::default(),
        );
        assert!(support.is_external());
    }

    #[test]
    fn test_scan_budget_limits_include_reads() {
        let dir = TempDir::new().unwrap();
        let mut text = String::from("* big\n");
        text.push_str(&"* padding line\n".repeat(100));
        text.push_str(".model n1 nmos level=72\n");
        fs::write(dir.path().join("big.lib"), text).unwrap();

        let process = ProcessConfig::default().with_include_path(dir.path());
        let config = DetectorConfig::default().with_scan_budget(64);
        let support = detect_model_support("t\n.include big.lib\n", None, &process, &config);
        assert_eq!(support, ModelSupport::Native);
    }

    #[test]
    fn test_preload_path() {
        assert_eq!(
            preload_path(".pre_osdi \"lib/a b.osdi\"").as_deref(),
            Some("lib/a b.osdi")
        );
        assert_eq!(preload_path("pre_osdi x.osdi").as_deref(), Some("x.osdi"));
        assert_eq!(preload_path(".include x.osdi"), None);
    }
}
