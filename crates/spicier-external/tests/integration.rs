//! Integration tests for spicier-external.
//!
//! Subprocess behavior is exercised with small shell scripts standing in for
//! ngspice and OpenVAF. The last test needs a real ngspice.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use spicier_core::{AnalysisKind, AnalysisRequest, ProcessConfig, QuantityKind, ToolPaths};
use spicier_external::{
    CancellationToken, Error, ExternalJob, PrepareOptions, ProcessRunner, Stage,
    is_simulator_available, prepare, simulate,
};
use tempfile::TempDir;

const RC_NETLIST: &str = "RC lowpass\nV1 in 0 PULSE(0 5 0 1n 1n 1u 2u)\nR1 in out 1k\nC1 out 0 1n\n.tran 1u 2u\n.end\n";

#[cfg(unix)]
fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A simulator that writes a three-point transient rawfile to the path
/// named by the netlist's `write` command.
#[cfg(unix)]
fn fake_ngspice(dir: &Path) -> PathBuf {
    fake_tool(
        dir,
        "ngspice",
        r#"out=$(sed -n 's/^write //p' "$2")
cat > "$out" <<'EOF'
Title: rc lowpass
Plotname: Transient Analysis
Flags: real
No. Variables: 3
No. Points: 3
Variables:
 0 time time
 1 v(in) voltage
 2 v(out) voltage
Values:
 0 0.0
 5.0
 0.0
 1 1e-6
 5.0
 3.16
 2 2e-6
 0.0
 4.32
EOF
echo "Simulation complete""#,
    )
}

#[cfg(unix)]
fn process_with(simulator: PathBuf, compiler: Option<PathBuf>) -> ProcessConfig {
    let mut tools = ToolPaths::default().with_simulator(simulator);
    if let Some(compiler) = compiler {
        tools = tools.with_model_compiler(compiler);
    }
    ProcessConfig::default().with_tools(tools)
}

#[cfg(unix)]
#[tokio::test]
async fn test_simulate_end_to_end_with_fake_simulator() {
    let tools = TempDir::new().unwrap();
    let process = process_with(fake_ngspice(tools.path()), None);
    let cancel = CancellationToken::new();

    let mut stages = Vec::new();
    let job = ExternalJob::new(RC_NETLIST, &process).with_poll_interval(Duration::from_millis(10));
    let waveform = simulate(job, &cancel, |stage| stages.push(stage))
        .await
        .unwrap();

    assert_eq!(stages, vec![Stage::Preparing, Stage::Running, Stage::Parsing]);
    assert_eq!(waveform.analysis, Some(AnalysisKind::Transient));
    assert_eq!(waveform.sweep.kind, QuantityKind::Time);
    assert_eq!(waveform.sweep_values, vec![0.0, 1e-6, 2e-6]);
    let out = waveform.find_variable("v(out)").unwrap().index;
    assert_eq!(waveform.real_column(out), Some(vec![0.0, 3.16, 4.32]));
}

#[cfg(unix)]
#[tokio::test]
async fn test_nonzero_exit_carries_output() {
    let tools = TempDir::new().unwrap();
    let sim = fake_tool(
        tools.path(),
        "ngspice",
        "echo 'Error: unknown subcircuit x1' >&2\nexit 1",
    );
    let process = process_with(sim, None);
    let cancel = CancellationToken::new();

    let err = simulate(ExternalJob::new(RC_NETLIST, &process), &cancel, |_| {})
        .await
        .unwrap_err();
    match err {
        Error::ProcessFailed { status, output } => {
            assert_eq!(status.code(), Some(1));
            assert!(output.contains("unknown subcircuit x1"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_clean_exit_without_output_is_an_error() {
    let tools = TempDir::new().unwrap();
    let sim = fake_tool(tools.path(), "ngspice", "echo 'no simulations run'\nexit 0");
    let process = process_with(sim, None);
    let cancel = CancellationToken::new();

    let err = simulate(ExternalJob::new(RC_NETLIST, &process), &cancel, |_| {})
        .await
        .unwrap_err();
    match err {
        Error::ProcessMissingOutput { expected, output } => {
            assert_eq!(expected.file_name().unwrap(), "output.raw");
            assert!(output.contains("no simulations run"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancellation_kills_simulator() {
    let tools = TempDir::new().unwrap();
    let sim = fake_tool(tools.path(), "ngspice", "exec sleep 30");
    let process = process_with(sim, None);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = simulate(ExternalJob::new(RC_NETLIST, &process), &cancel, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancelled_before_start_never_spawns() {
    let work = TempDir::new().unwrap();
    let marker = work.path().join("ran");
    let sim = fake_tool(
        work.path(),
        "ngspice",
        &format!("touch '{}'", marker.display()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let netlist = work.path().join("n.cir");
    std::fs::write(&netlist, RC_NETLIST).unwrap();
    let runner = ProcessRunner::new(&ToolPaths::default().with_simulator(sim));
    let err = runner
        .run(&netlist, &work.path().join("out.raw"), work.path(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_missing_simulator_binary() {
    let process = ProcessConfig::default().with_tools(
        ToolPaths::default().with_simulator("/nonexistent/spicier-test/ngspice"),
    );
    let cancel = CancellationToken::new();
    let err = simulate(ExternalJob::new(RC_NETLIST, &process), &cancel, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_verilog_a_source_is_compiled_in_workspace() {
    let tools = TempDir::new().unwrap();
    let compiler = fake_tool(
        tools.path(),
        "openvaf",
        "stem=\"${1%.va}\"\nprintf 'osdi' > \"$stem.osdi\"",
    );
    let design = TempDir::new().unwrap();
    std::fs::write(design.path().join("diode_va.va"), "module diode_va; endmodule\n").unwrap();
    let source = design.path().join("top.cir");

    let netlist = "va diode\n.include diode_va.va\n.model dmod diode_va\nM1 a 0 dmod\nV1 a 0 1\n";
    let process = process_with(PathBuf::from("ngspice"), Some(compiler));
    let prepared = prepare(
        netlist,
        Some(&source),
        &process,
        Some(&AnalysisRequest::OperatingPoint),
        &PrepareOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(prepared.preloads.len(), 1);
    let lib = &prepared.preloads[0];
    assert!(lib.starts_with(prepared.workspace()));
    assert_eq!(lib.file_name().unwrap(), "diode_va.osdi");
    assert_eq!(std::fs::read_to_string(lib).unwrap(), "osdi");
    // The caller's directory is left untouched.
    assert!(!design.path().join("diode_va.osdi").exists());

    assert!(prepared.netlist.contains("N1 a 0 dmod\n"));
    assert!(prepared.netlist.contains(&format!("pre_osdi {}\n", lib.display())));
    assert!(prepared.netlist.contains(".op\n"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_compiler_failure_reports_tool_output() {
    let tools = TempDir::new().unwrap();
    let compiler = fake_tool(
        tools.path(),
        "openvaf",
        "echo 'error: unexpected token endmodule' >&2\nexit 2",
    );
    let design = TempDir::new().unwrap();
    std::fs::write(design.path().join("bad.va"), "module bad\n").unwrap();

    let process = process_with(PathBuf::from("ngspice"), Some(compiler));
    let err = prepare(
        "t\n.include bad.va\n",
        Some(&design.path().join("top.cir")),
        &process,
        None,
        &PrepareOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        Error::CompilerFailed {
            source_file,
            status,
            output,
        } => {
            assert_eq!(source_file, design.path().join("bad.va"));
            assert_eq!(status.code(), Some(2));
            assert!(output.contains("unexpected token endmodule"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_compiler_without_artifact_is_an_error() {
    let tools = TempDir::new().unwrap();
    let compiler = fake_tool(tools.path(), "openvaf", "echo 'nothing to do'");
    let design = TempDir::new().unwrap();
    std::fs::write(design.path().join("empty.va"), "").unwrap();

    let process = process_with(PathBuf::from("ngspice"), Some(compiler));
    let err = prepare(
        "t\n.include empty.va\n",
        Some(&design.path().join("top.cir")),
        &process,
        None,
        &PrepareOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        Error::CompilerMissingOutput {
            expected, output, ..
        } => {
            assert_eq!(expected.file_name().unwrap(), "empty.osdi");
            assert!(output.contains("nothing to do"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires ngspice"]
async fn test_real_ngspice_voltage_divider() {
    let process = ProcessConfig::from_env();
    if !is_simulator_available(&process.tools) {
        eprintln!("ngspice not available, skipping test");
        return;
    }

    let netlist = "Voltage Divider\nV1 1 0 DC 10\nR1 1 2 1k\nR2 2 0 1k\n.op\n.end\n";
    let cancel = CancellationToken::new();
    let waveform = simulate(ExternalJob::new(netlist, &process), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(waveform.analysis, Some(AnalysisKind::OperatingPoint));
    let v2 = waveform.find_variable("v(2)").unwrap().index;
    let value = waveform.magnitude_at(0, v2).unwrap();
    assert!((value - 5.0).abs() < 1e-6, "V(2) should be 5V, got {value}");
}
