//! Behavioural steps for supervisor configuration loading.
#![allow(
    clippy::expect_used,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args,
    reason = "simplify test failure output"
)]

use cucumber::{World, given, then, when};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use plugmy_supervisor::config::Config;

#[derive(Debug, Default, World)]
pub struct ConfigWorld {
    dir: Option<TempDir>,
    path: Option<PathBuf>,
    result: Option<Result<Config, ortho_config::OrthoError>>,
}

impl ConfigWorld {
    fn write(&mut self, contents: &str) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("supervisor.toml");
        fs::write(&path, contents).expect("write file");
        self.dir = Some(dir);
        self.path = Some(path);
    }

    fn loaded(&mut self) -> Config {
        match self.result.take() {
            Some(Ok(cfg)) => {
                self.result = Some(Ok(cfg.clone()));
                cfg
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}

#[given(regex = r"^a configuration file setting the daemon port to (\d+)$")]
fn config_file_with_port(world: &mut ConfigWorld, port: u16) {
    world.write(&format!("daemon_port = {port}"));
}

#[given(regex = r"^a configuration file allowing (\d+) restarts$")]
fn config_file_with_restarts(world: &mut ConfigWorld, max: usize) {
    world.write(&format!("max_restarts = {max}"));
}

#[given("a configuration file that is not TOML")]
fn config_file_not_toml(world: &mut ConfigWorld) {
    world.write("daemon_port = = 4000");
}

#[given("a missing configuration file")]
fn missing_configuration_file(world: &mut ConfigWorld) {
    world.path = Some(PathBuf::from("/nonexistent/nowhere.toml"));
}

#[when("the config is loaded")]
fn load_config(world: &mut ConfigWorld) {
    let path = world.path.as_ref().expect("path set");
    world.result = Some(Config::from_file(path));
}

#[then(regex = r"^the daemon port is (\d+)$")]
fn daemon_port_is(world: &mut ConfigWorld, expected: u16) {
    assert_eq!(world.loaded().daemon_port, expected);
}

#[then(regex = r"^at most (\d+) restarts are attempted$")]
fn max_restarts_is(world: &mut ConfigWorld, expected: usize) {
    assert_eq!(world.loaded().max_restarts, expected);
}

#[then("the daemon is started without its tray icon")]
fn daemon_args_are_default(world: &mut ConfigWorld) {
    assert_eq!(world.loaded().daemon_args, vec!["--no-tray".to_owned()]);
}

#[then("config loading fails")]
fn config_loading_fails(world: &mut ConfigWorld) {
    match world.result.take() {
        Some(Err(_)) => {}
        other => panic!("expected error, got {other:?}"),
    }
}
