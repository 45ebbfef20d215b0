//! spicier CLI tool.
//!
//! Routing checks, external simulator runs and raw file inspection.

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Deserialize;
use spicier::{
    AnalysisRequest, CancellationToken, DetectorConfig, ExternalJob, ModelSupport,
    PrepareOptions, ProcessConfig, detect_model_support, is_model_compiler_available,
    is_simulator_available, parse_raw_file, prepare, simulate, simulator_version,
};

use crate::output::View;

#[derive(Parser)]
#[command(name = "spicier")]
#[command(about = "Route, prepare and run SPICE netlists on the external simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether a netlist needs the external simulator
    Check {
        netlist: PathBuf,

        #[command(flatten)]
        process: ProcessArgs,

        /// Output the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the netlist as it would be handed to the external simulator
    Prepare {
        netlist: PathBuf,

        #[command(flatten)]
        process: ProcessArgs,

        /// Analysis directive replacing the netlist's own, e.g. ".tran 1u 1m"
        #[arg(short, long)]
        analysis: Option<String>,

        /// Write the netlist here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a netlist on the external simulator and print the result
    Run {
        netlist: PathBuf,

        #[command(flatten)]
        process: ProcessArgs,

        /// Analysis directive replacing the netlist's own, e.g. ".tran 1u 1m"
        #[arg(short, long)]
        analysis: Option<String>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Parse an ngspice raw file and print it
    Raw {
        file: PathBuf,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Check which external tools can be started
    Tools {
        #[command(flatten)]
        process: ProcessArgs,
    },
}

#[derive(Args)]
struct ProcessArgs {
    /// Extra include search directory (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Simulator binary (overrides SPICIER_NGSPICE)
    #[arg(long)]
    ngspice: Option<PathBuf>,

    /// Verilog-A compiler binary (overrides SPICIER_OPENVAF)
    #[arg(long)]
    openvaf: Option<PathBuf>,

    /// JSON settings file with `process`, `detector` and `prepare` sections
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct ViewArgs {
    /// Variables to print (repeatable; default all)
    #[arg(short, long = "var")]
    var: Vec<String>,

    /// Decimate to at most this many points
    #[arg(long)]
    max_points: Option<usize>,

    /// Lower sweep bound of the decimated window
    #[arg(long, requires = "max_points")]
    from: Option<f64>,

    /// Upper sweep bound of the decimated window
    #[arg(long, requires = "max_points")]
    to: Option<f64>,

    /// Output the waveform as JSON
    #[arg(long)]
    json: bool,
}

impl From<ViewArgs> for View {
    fn from(args: ViewArgs) -> Self {
        View {
            variables: args.var,
            max_points: args.max_points,
            from: args.from,
            to: args.to,
            json: args.json,
        }
    }
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    process: Option<ProcessConfig>,
    detector: DetectorConfig,
    prepare: PrepareOptions,
}

impl ProcessArgs {
    fn load(&self) -> Result<(ProcessConfig, Settings)> {
        let settings: Settings = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => Settings::default(),
        };

        let mut process = settings
            .process
            .clone()
            .unwrap_or_else(ProcessConfig::from_env);
        process.include_paths.extend(self.include.iter().cloned());
        if let Some(ngspice) = &self.ngspice {
            process.tools.simulator = ngspice.clone();
        }
        if let Some(openvaf) = &self.openvaf {
            process.tools.model_compiler = openvaf.clone();
        }
        Ok((process, settings))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check {
            netlist,
            process,
            json,
        } => cmd_check(&netlist, &process, json),
        Commands::Prepare {
            netlist,
            process,
            analysis,
            output,
        } => cmd_prepare(&netlist, &process, analysis.as_deref(), output.as_deref()).await,
        Commands::Run {
            netlist,
            process,
            analysis,
            view,
        } => cmd_run(&netlist, &process, analysis.as_deref(), view.into()).await,
        Commands::Raw { file, view } => cmd_raw(&file, view.into()),
        Commands::Tools { process } => cmd_tools(&process),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_netlist(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading netlist {}", path.display()))
}

fn parse_analysis(directive: Option<&str>) -> Result<Option<AnalysisRequest>> {
    let Some(directive) = directive else {
        return Ok(None);
    };
    let request = AnalysisRequest::parse_directive(directive)
        .with_context(|| format!("invalid analysis `{}`", directive))?;
    match request {
        Some(request) => {
            request.validate()?;
            Ok(Some(request))
        }
        None => bail!("`{}` is not an analysis directive", directive),
    }
}

fn cmd_check(path: &Path, args: &ProcessArgs, json: bool) -> Result<ExitCode> {
    let netlist = read_netlist(path)?;
    let (process, settings) = args.load()?;
    let support = detect_model_support(&netlist, Some(path), &process, &settings.detector);

    if json {
        let value = match &support {
            ModelSupport::Native => serde_json::json!({ "route": "in_process" }),
            ModelSupport::External(reason) => serde_json::json!({
                "route": "external",
                "reason": reason.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &support {
            ModelSupport::Native => println!("in-process: every model is supported natively"),
            ModelSupport::External(reason) => println!("external: {}", reason),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_prepare(
    path: &Path,
    args: &ProcessArgs,
    analysis: Option<&str>,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let netlist = read_netlist(path)?;
    let (process, settings) = args.load()?;
    let request = parse_analysis(analysis)?;
    let cancel = CancellationToken::new();

    let prepared = prepare(
        &netlist,
        Some(path),
        &process,
        request.as_ref(),
        &settings.prepare,
        &cancel,
    )
    .await?;

    if !prepared.preloads.is_empty() {
        info!(
            "{} model libraries preloaded; compiled ones are removed on exit",
            prepared.preloads.len()
        );
    }
    match output {
        Some(out) => {
            std::fs::write(out, &prepared.netlist)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Prepared netlist written to {}", out.display());
        }
        None => print!("{}", prepared.netlist),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(
    path: &Path,
    args: &ProcessArgs,
    analysis: Option<&str>,
    view: View,
) -> Result<ExitCode> {
    let netlist = read_netlist(path)?;
    let (process, settings) = args.load()?;
    let request = parse_analysis(analysis)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling simulation");
                cancel.cancel();
            }
        })
    };

    let job = ExternalJob::new(&netlist, &process)
        .with_source(Some(path))
        .with_request(request.as_ref())
        .with_poll_interval(settings.prepare.poll_interval);
    let result = simulate(job, &cancel, |stage| info!("{}", stage)).await;
    interrupt.abort();

    let waveform = result.context("external simulation failed")?;
    output::emit(waveform, &view)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_raw(path: &Path, view: View) -> Result<ExitCode> {
    let waveform = parse_raw_file(path, None)
        .with_context(|| format!("reading raw file {}", path.display()))?;
    output::emit(waveform, &view)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_tools(args: &ProcessArgs) -> Result<ExitCode> {
    let (process, _) = args.load()?;
    let tools = &process.tools;

    let simulator_ok = is_simulator_available(tools);
    if simulator_ok {
        match simulator_version(tools) {
            Ok(version) => println!("simulator: {} ({})", tools.simulator.display(), version),
            Err(e) => println!(
                "simulator: {} (version check failed: {})",
                tools.simulator.display(),
                e
            ),
        }
    } else {
        println!("simulator: {} not found", tools.simulator.display());
    }

    if is_model_compiler_available(tools) {
        println!("model compiler: {}", tools.model_compiler.display());
    } else {
        println!(
            "model compiler: {} not found (Verilog-A sources cannot be compiled)",
            tools.model_compiler.display()
        );
    }

    Ok(if simulator_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
