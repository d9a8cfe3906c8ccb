use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use serde_json::json;

const DEFINITION: &str = r#"
root:
  use: app
  short: Demo application
  version: 2.0.0
  persistent_flags:
    - name: config
      shorthand: c
      usage: config file
      filename_extensions: [yaml, yml]
  commands:
    - use: deploy <env>
      aliases: [ship]
      short: Deploy the application
      runnable: true
      args: { exact: 1 }
      valid_args: ["staging\tPre-production", "production"]
      flags:
        - name: replicas
          shorthand: r
          type: int
          default: 2
        - name: strategy
          values: ["rolling\tOne at a time", "recreate"]
    - use: status
      short: Show status
      runnable: true
      fail: cluster unreachable
      silence_usage: true
    - use: release
      short: Cut a release
      runnable: true
      flags:
        - name: tag
          required: true
"#;

fn write_definition(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("tree.yaml");
    fs::write(&path, yaml).expect("failed to write definition");
    path
}

/// Runs the binary against `definition` with `args` after `--`.
fn run(definition: &Path, args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_cmdtree"))
        .arg("--definition")
        .arg(definition)
        .arg("--")
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run cmdtree")
}

fn run_default(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let definition = write_definition(dir.path(), DEFINITION);
    run(&definition, args)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[test]
fn runnable_command_prints_invocation_summary() {
    let output = run_default(&["ship", "--replicas", "3", "-c", "prod.yaml", "staging"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("summary should be JSON");
    assert_eq!(
        summary,
        json!({
            "command": "app deploy",
            "called_as": "ship",
            "args": ["staging"],
            "flags": { "config": "prod.yaml", "replicas": 3 }
        })
    );
}

#[test]
fn argument_count_error_prints_usage() {
    let output = run_default(&["deploy"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Error: accepts 1 arg(s), received 0\n"), "stderr: {err}");
    assert!(err.contains("Usage:\n  app deploy <env> [flags]"), "stderr: {err}");
    assert!(err.contains("Aliases:\n  deploy, ship"), "stderr: {err}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn failing_run_reports_error_without_usage() {
    let output = run_default(&["status"]);
    assert!(!output.status.success());

    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["command"], "app status");
    assert_eq!(summary["flags"], json!({}));

    let err = stderr(&output);
    assert!(err.contains("Error: cluster unreachable\n"), "stderr: {err}");
    assert!(!err.contains("Usage:"), "stderr: {err}");
}

#[test]
fn unknown_command_suggests_closest_name() {
    let output = run_default(&["deploi"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Error: unknown command \"deploi\" for \"app\""), "stderr: {err}");
    assert!(err.contains("Did you mean this?\n\tdeploy\n"), "stderr: {err}");
    assert!(err.contains("Run 'app --help' for usage."), "stderr: {err}");
}

#[test]
fn missing_required_flag_fails() {
    let output = run_default(&["release"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error: required flag(s) \"tag\" not set"));

    let output = run_default(&["release", "--tag", "v1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["flags"], json!({ "tag": "v1" }));
}

#[test]
fn help_and_version_flags() {
    let output = run_default(&["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.starts_with("Demo application\n\nUsage:\n  app [command]\n"), "help: {help}");
    assert!(help.contains("  deploy      Deploy the application\n"), "help: {help}");
    assert!(help.contains("  help        Help about any command\n"), "help: {help}");

    let output = run_default(&["--version"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "app version 2.0.0\n");
}

#[test]
fn help_command_shows_topic() {
    let output = run_default(&["help", "deploy"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.starts_with("Deploy the application\n\nUsage:\n  app deploy <env> [flags]\n"), "help: {help}");
}

// ---------------------------------------------------------------------------
// Completion requests
// ---------------------------------------------------------------------------

#[test]
fn complete_subcommands_with_descriptions() {
    let output = run_default(&["__complete", ""]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "deploy\tDeploy the application\n\
         status\tShow status\n\
         release\tCut a release\n\
         help\tHelp about any command\n\
         :4\n"
    );
    assert!(stderr(&output).contains("Completion ended with directive: ShellCompDirectiveNoFileComp"));
}

#[test]
fn complete_valid_args_without_descriptions() {
    let output = run_default(&["__complete", "deploy", ""]);
    assert_eq!(stdout(&output), "staging\tPre-production\nproduction\n:4\n");

    let output = run_default(&["__completeNoDesc", "deploy", "st"]);
    assert_eq!(stdout(&output), "staging\n:4\n");
}

#[test]
fn complete_flag_values() {
    let output = run_default(&["__complete", "deploy", "--strategy", ""]);
    assert_eq!(stdout(&output), "rolling\tOne at a time\nrecreate\n:4\n");

    let output = run_default(&["__complete", "deploy", "--config", ""]);
    assert_eq!(stdout(&output), "yaml\nyml\n:8\n");
}

#[test]
fn complete_flag_names() {
    let output = run_default(&["__complete", "deploy", "--re"]);
    assert_eq!(stdout(&output), "--replicas\n:4\n");
}

// ---------------------------------------------------------------------------
// Definition errors
// ---------------------------------------------------------------------------

#[test]
fn invalid_definition_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let definition = write_definition(
        dir.path(),
        "root:\n  use: app\n  flags:\n    - name: port\n      type: int\n      default: high\n",
    );
    let output = run(&definition, &[]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.starts_with("error: invalid default for flag 'port'"), "stderr: {err}");
}

#[test]
fn missing_definition_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&dir.path().join("absent.yaml"), &["anything"]);
    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("error: I/O error:"));
}

#[test]
fn settings_block_enables_prefix_matching() {
    let dir = tempfile::tempdir().unwrap();
    let definition = write_definition(
        dir.path(),
        r#"
settings:
  prefix_matching: true
root:
  use: app
  commands:
    - use: deploy
      runnable: true
    - use: describe
      runnable: true
"#,
    );

    let output = run(&definition, &["dep"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(summary["command"], "app deploy");
    assert_eq!(summary["called_as"], "deploy");

    let output = run(&definition, &["de"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("ambiguous command \"de\" for \"app\"; could be deploy, describe"), "stderr: {err}");
}
