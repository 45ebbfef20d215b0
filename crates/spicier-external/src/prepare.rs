//! Netlist rewriting for the external simulator.
//!
//! The prepared netlist is self-contained: include paths are absolute,
//! behavioral models are compiled and preloaded, and a generated control
//! block runs the analysis and writes an ASCII rawfile to a known path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use spicier_core::netlist::{
    LogicalLine, logical_lines, parse_include, parse_model_card, split_title, split_tokens,
};
use spicier_core::{AnalysisRequest, ProcessConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::compile::ModelCompiler;
use crate::detect::{is_builtin_model_type, is_preload_directive, preload_path};
use crate::error::{Error, Result};
use crate::paths::{is_model_library, is_model_source, resolve_include};
use crate::runner::DEFAULT_POLL_INTERVAL;

/// Names of the files written into the preparation workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    pub netlist_name: String,
    pub output_name: String,
    /// Supervisor poll interval for compiler runs.
    pub poll_interval: Duration,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            netlist_name: "netlist.cir".to_string(),
            output_name: "output.raw".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PrepareOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// A rewritten netlist ready for the external simulator.
///
/// Every path is absolute. Dropping the value deletes the workspace holding
/// the netlist, compiled models and result file.
#[derive(Debug)]
pub struct PreparedExternalNetlist {
    pub netlist_path: PathBuf,
    pub output_path: PathBuf,
    /// Directory the simulator runs in.
    pub working_directory: PathBuf,
    /// Analysis the netlist runs. `None` means the default operating point.
    pub analysis: Option<AnalysisRequest>,
    /// Model libraries loaded by the control block.
    pub preloads: Vec<PathBuf>,
    /// Text written to `netlist_path`.
    pub netlist: String,
    workspace: TempDir,
}

impl PreparedExternalNetlist {
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }
}

/// Rewrite `netlist` into a self-contained netlist in a fresh workspace.
///
/// When `request` is given it replaces every analysis directive in the
/// netlist; otherwise the first analysis directive in file order is kept as
/// the resolved analysis.
pub async fn prepare(
    netlist: &str,
    source: Option<&Path>,
    process: &ProcessConfig,
    request: Option<&AnalysisRequest>,
    options: &PrepareOptions,
    cancel: &CancellationToken,
) -> Result<PreparedExternalNetlist> {
    let base_dir = ProcessConfig::base_dir(source);
    let resolve = |raw: &str, directive: &str, line: usize| {
        resolve_include(raw, base_dir.as_deref(), &process.include_paths).ok_or_else(|| {
            Error::PathResolution {
                directive: directive.to_string(),
                path: raw.to_string(),
                line,
            }
        })
    };

    let (title, body) = split_title(netlist);
    let lines: Vec<LogicalLine> = logical_lines(body)
        .into_iter()
        .map(|mut l| {
            l.number += 1;
            l
        })
        .collect();

    // Preloads may sit inside control blocks that are dropped below.
    let mut preloads = Vec::new();
    for line in &lines {
        if let Some(raw) = preload_path(&line.text) {
            preloads.push(resolve(&raw, "pre_osdi", line.number)?);
        }
    }

    let behavioral = behavioral_model_names(&lines);
    let analysis = match request {
        Some(r) => Some(r.clone()),
        None => AnalysisRequest::first_in_netlist(body),
    };

    let mut out_lines = Vec::with_capacity(lines.len() + 1);
    let mut sources = Vec::new();
    let mut in_control = false;
    for line in &lines {
        let directive = line.directive();
        match directive.as_deref() {
            Some(".control") => {
                in_control = true;
                continue;
            }
            Some(".endc") => {
                in_control = false;
                continue;
            }
            Some(".end") => continue,
            _ => {}
        }
        if in_control || is_preload_directive(&line.text) {
            continue;
        }
        if request.is_some() && AnalysisRequest::is_analysis_directive(&line.text) {
            continue;
        }

        if let Some(include) = parse_include(&line.text) {
            let directive = directive.unwrap_or_default();
            let resolved = resolve(&include.path, &directive, line.number)?;
            if is_model_library(&include.path) {
                preloads.push(resolved);
            } else if is_model_source(&include.path) {
                sources.push(resolved);
            } else {
                out_lines.push(include.with_path(&resolved.to_string_lossy()));
            }
            continue;
        }

        out_lines.push(rewrite_instance(line, &behavioral));
    }

    if let Some(r) = request {
        out_lines.push(r.to_directive());
    } else if analysis.is_none() {
        out_lines.push(AnalysisRequest::OperatingPoint.to_directive());
    }

    let workspace = tempfile::Builder::new().prefix("spicier-ext-").tempdir()?;
    let compiler = ModelCompiler::new(&process.tools).with_poll_interval(options.poll_interval);
    for (i, src) in sources.iter().enumerate() {
        let work_dir = workspace.path().join(format!("va{i}"));
        preloads.push(compiler.compile(src, &work_dir, cancel).await?);
    }

    let netlist_path = workspace.path().join(&options.netlist_name);
    let output_path = workspace.path().join(&options.output_name);
    let working_directory = base_dir
        .map(|d| std::path::absolute(&d).unwrap_or(d))
        .unwrap_or_else(|| workspace.path().to_path_buf());

    let mut text = format!("* {}\n", title.trim());
    for line in &out_lines {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str(&control_block(&preloads, &output_path));
    text.push_str(".end\n");

    std::fs::write(&netlist_path, &text)?;
    info!(
        "prepared external netlist {} ({} preloads, {} compiled)",
        netlist_path.display(),
        preloads.len(),
        sources.len()
    );
    debug!("prepared netlist:\n{}", text);

    Ok(PreparedExternalNetlist {
        netlist_path,
        output_path,
        working_directory,
        analysis,
        preloads,
        netlist: text,
        workspace,
    })
}

/// Lower-cased names of `.model` cards whose type is not a built-in primitive.
fn behavioral_model_names(lines: &[LogicalLine]) -> HashSet<String> {
    lines
        .iter()
        .filter_map(|l| parse_model_card(&l.text))
        .filter(|card| !is_builtin_model_type(&card.model_type))
        .map(|card| card.name.to_ascii_lowercase())
        .collect()
}

/// `M` instances of behavioral models become `N` instances.
fn rewrite_instance(line: &LogicalLine, behavioral: &HashSet<String>) -> String {
    if line.element_prefix() != Some('m') || behavioral.is_empty() {
        return line.text.clone();
    }
    let tokens = split_tokens(&line.text);
    let uses_behavioral =
        model_reference(&tokens).is_some_and(|t| behavioral.contains(&t.to_ascii_lowercase()));
    if uses_behavioral {
        format!("N{}", &line.text[1..])
    } else {
        line.text.clone()
    }
}

/// Model token of an `M` instance.
///
/// The model is the last token after the nodes and before the first
/// parameter (`w=1u` or `w = 1u`); a trailing `off` flag is skipped.
/// Terminal counts vary between behavioral devices, so nodes are never
/// compared.
fn model_reference(tokens: &[String]) -> Option<&String> {
    let mut end = tokens
        .iter()
        .position(|t| t.contains('='))
        .unwrap_or(tokens.len());
    if end > 0 && end < tokens.len() && tokens[end].starts_with('=') {
        end -= 1;
    }
    tokens[..end]
        .iter()
        .skip(2)
        .rev()
        .find(|t| !t.eq_ignore_ascii_case("off"))
}

fn control_block(preloads: &[PathBuf], output: &Path) -> String {
    let mut block = String::from(".control\nset filetype=ascii\nset noaskquit\nset nomoremode\n");
    for lib in preloads {
        block.push_str(&format!("pre_osdi {}\n", quote_path(lib)));
    }
    block.push_str("run\n");
    block.push_str(&format!("write {}\n", quote_path(output)));
    block.push_str("quit\n.endc\n");
    block
}

fn quote_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.chars().any(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s.into_owned()
    }
}
