//! In-process coverage of the CLI runtime against a scripted fake daemon.


use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result};
use dockstat_client::test_support::{FakeDaemon, RecordedRequest, Reply};
use dockstat_config::{Config, DaemonSocket};
use tempfile::TempDir;

use crate::{AppError, ConfigLoader, IoStreams, run_with_loader};

pub(super) const VERSION_BODY: &str = r#"{"Version":"24.0.7","ApiVersion":"1.43","GitCommit":"311b9ff","GoVersion":"go1.20.10","Os":"linux","Arch":"amd64","KernelVersion":"6.5.0-14-generic"}"#;

pub(super) const LISTING_BODY: &str = r#"[{"Id":"aaaaaaaaaaaaaaaa","Names":["/web"],"Image":"nginx:1.25","Created":1709633730,"Status":"Up 2 hours","State":"running"},{"Id":"bbbbbbbbbbbbbbbb","Names":["/db"],"Image":"postgres:16","Created":1709633000,"Status":"Exited (0) 1 hour ago","State":"exited"}]"#;

/// A config loader that returns a fixed configuration for tests.
pub(super) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(super) const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// A config loader that fails the test if configuration is requested.
struct PanickingLoader;

impl ConfigLoader for PanickingLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        panic!("usage errors must be reported before configuration loads");
    }
}

/// CLI state, daemon instance and captured output for one test.
#[derive(Default)]
pub(super) struct TestWorld {
    pub config: Config,
    pub daemon: Option<FakeDaemon>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<ExitCode>,
    pub requests: Vec<RecordedRequest>,
    pub missing_socket_dir: Option<TempDir>,
}

impl TestWorld {
    pub fn start_daemon(&mut self, replies: Vec<Reply>) -> Result<()> {
        self.start_daemon_sessions(vec![replies])
    }

    pub fn start_daemon_sessions(&mut self, sessions: Vec<Vec<Reply>>) -> Result<()> {
        let daemon = FakeDaemon::spawn_sessions(sessions)?;
        self.config.daemon_socket = DaemonSocket::new(daemon.socket_path());
        self.daemon = Some(daemon);
        Ok(())
    }

    pub fn point_at_missing_socket(&mut self) -> Result<()> {
        let dir = TempDir::new().context("create socket directory")?;
        let socket = dir.path().join("absent.sock");
        let path = socket.to_str().context("utf8 socket path")?;
        self.config.daemon_socket = DaemonSocket::new(path);
        self.missing_socket_dir = Some(dir);
        Ok(())
    }

    pub fn run(&mut self, command: &str) -> Result<()> {
        self.stdout.clear();
        self.stderr.clear();
        let loader = StaticConfigLoader::new(self.config.clone());
        let exit = {
            let mut io = IoStreams::new(&mut self.stdout, &mut self.stderr, false);
            run_with_loader(build_args(command), &mut io, &loader)
        };
        self.exit_code = Some(exit);
        if let Some(daemon) = self.daemon.as_mut() {
            self.requests = daemon.finish()?;
        }
        Ok(())
    }

    pub fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).context("stdout utf8")
    }

    pub fn stderr_text(&self) -> Result<String> {
        String::from_utf8(self.stderr.clone()).context("stderr utf8")
    }

    pub fn request_lines(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|request| format!("{} {}", request.method, request.path))
            .collect()
    }
}

pub(super) fn build_args(command: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("dockstat")];
    args.extend(
        command
            .trim()
            .trim_matches('"')
            .split_whitespace()
            .map(OsString::from),
    );
    args
}

fn run_captured<L: ConfigLoader>(command: &str, loader: &L) -> (ExitCode, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = {
        let mut io = IoStreams::new(&mut stdout, &mut stderr, false);
        run_with_loader(build_args(command), &mut io, loader)
    };
    (
        exit,
        String::from_utf8(stdout).expect("stdout utf8"),
        String::from_utf8(stderr).expect("stderr utf8"),
    )
}

#[test]
fn usage_errors_skip_configuration_loading() {
    let (exit, stdout, stderr) = run_captured("inspect", &PanickingLoader);
    assert_eq!(exit, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    assert!(stderr.contains("<ID>"), "unexpected stderr: {stderr}");
}

#[test]
fn help_goes_to_stdout_and_succeeds() {
    let (exit, stdout, stderr) = run_captured("--help", &PanickingLoader);
    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(stdout.contains("Usage: dockstat"), "unexpected stdout: {stdout}");
    assert!(stdout.contains("unpause"));
    assert!(stderr.is_empty());
}

#[test]
fn version_command_renders_human_fields() {
    let mut world = TestWorld::default();
    world
        .start_daemon(vec![Reply::json(200, VERSION_BODY)])
        .expect("start daemon");
    world.run("--output human version").expect("run command");

    assert_eq!(world.exit_code, Some(ExitCode::SUCCESS));
    let stdout = world.stdout_text().expect("stdout");
    assert!(stdout.contains("Version:      24.0.7"), "unexpected stdout: {stdout}");
    assert!(stdout.contains("Kernel:       6.5.0-14-generic"));
    assert_eq!(world.request_lines(), ["GET /version"]);
}

#[test]
fn redirected_output_defaults_to_json() {
    let mut world = TestWorld::default();
    world
        .start_daemon(vec![Reply::json(200, VERSION_BODY)])
        .expect("start daemon");
    world.run("version").expect("run command");

    let stdout = world.stdout_text().expect("stdout");
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("json output");
    assert_eq!(value.get("Version").and_then(|v| v.as_str()), Some("24.0.7"));
}

#[test]
fn conflicting_removal_reports_the_daemon_message() {
    let mut world = TestWorld::default();
    world
        .start_daemon(vec![Reply::json(
            409,
            r#"{"message":"You cannot remove a running container"}"#,
        )])
        .expect("start daemon");
    world.run("rm web").expect("run command");

    assert_eq!(world.exit_code, Some(ExitCode::FAILURE));
    let stderr = world.stderr_text().expect("stderr");
    assert!(stderr.starts_with("rm failed:"), "unexpected stderr: {stderr}");
    assert!(stderr.contains("You cannot remove a running container"));
    assert_eq!(world.request_lines(), ["DELETE /containers/web"]);
}

#[test]
fn config_flags_before_the_command_are_not_parsed_as_commands() {
    let mut world = TestWorld::default();
    world
        .start_daemon(vec![Reply::json(200, "[]")])
        .expect("start daemon");
    world
        .run("--log-filter=warn --output json ps")
        .expect("run command");

    assert_eq!(world.exit_code, Some(ExitCode::SUCCESS));
    assert_eq!(world.stdout_text().expect("stdout"), "[]\n");
}

#[test]
fn watch_reports_a_failed_final_refresh() {
    let mut world = TestWorld::default();
    world
        .start_daemon(vec![
            Reply::json(200, LISTING_BODY),
            Reply::json(500, r#"{"message":"daemon is shutting down"}"#),
        ])
        .expect("start daemon");
    world
        .run("--output json watch --count 2")
        .expect("run command");

    assert_eq!(world.exit_code, Some(ExitCode::FAILURE));
    assert_eq!(world.stdout_text().expect("stdout").lines().count(), 1);
    let stderr = world.stderr_text().expect("stderr");
    assert!(stderr.starts_with("watch failed:"), "unexpected stderr: {stderr}");
    assert!(stderr.contains("daemon is shutting down"));
}
