//! Behavioural steps for the daemon lifecycle: startup policy, start at
//! login and update hand-over.
#![allow(
    clippy::expect_used,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args,
    reason = "simplify test failure output"
)]

use cucumber::{World, given, then, when};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

use plugmy_supervisor::config::Config;
use plugmy_supervisor::orchestrator::{Availability, Supervisor};
use plugmy_supervisor::process::ProcessState;
use test_support::daemon::TestConfig;
use test_support::scripts::{fake_launchctl, launch_count, launchctl_calls, long_running_daemon};
use test_support::status::{healthy_daemon, port_of};
use test_support::{temp_config, wait_until};

/// Keeps the mock daemon alive for the scenario.
struct MockDaemon(#[expect(dead_code, reason = "held for its lifetime")] MockServer);

impl std::fmt::Debug for MockDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockDaemon")
    }
}

#[derive(Debug, Default, World)]
pub struct SupervisorWorld {
    dir: Option<TempDir>,
    test_config: Option<TestConfig>,
    server: Option<MockDaemon>,
    supervisor: Option<Supervisor>,
    availability: Option<Availability>,
    auto_start: Vec<bool>,
    installer_runs: Arc<AtomicUsize>,
    state_at_install: Option<ProcessState>,
}

impl SupervisorWorld {
    fn dir(&self) -> &TempDir {
        self.dir.as_ref().expect("environment prepared")
    }

    fn config(&self) -> Config {
        Config::from(self.test_config.as_ref().expect("environment prepared"))
    }

    fn supervisor(&mut self) -> &Supervisor {
        if self.supervisor.is_none() {
            self.supervisor = Some(Supervisor::from_config(&self.config()).expect("build supervisor"));
        }
        self.supervisor.as_ref().expect("supervisor built")
    }

    fn descriptor_exists(&self) -> bool {
        self.config().descriptor_path().exists()
    }
}

#[given("a clean supervisor environment")]
fn clean_environment(world: &mut SupervisorWorld) {
    let dir = TempDir::new().expect("create temp dir");
    fake_launchctl(dir.path());
    world.test_config = Some(temp_config(&dir));
    world.dir = Some(dir);
}

#[given("the daemon is already answering")]
async fn daemon_answering(world: &mut SupervisorWorld) {
    let server = healthy_daemon().await;
    let cfg = world.test_config.take().expect("environment prepared");
    world.test_config = Some(cfg.with_port(port_of(&server)));
    world.server = Some(MockDaemon(server));
}

#[given("the daemon binary is installed")]
fn binary_installed(world: &mut SupervisorWorld) {
    let binary = long_running_daemon(world.dir().path());
    let cfg = world.test_config.take().expect("environment prepared");
    world.test_config = Some(cfg.with_binary(binary));
}

#[given("the daemon binary is missing")]
fn binary_missing(world: &mut SupervisorWorld) {
    assert!(
        !world
            .test_config
            .as_ref()
            .expect("environment prepared")
            .daemon_binary
            .exists()
    );
}

#[given("the login agent is registered")]
async fn agent_registered(world: &mut SupervisorWorld) {
    let enabled = world
        .supervisor()
        .toggle_auto_start()
        .await
        .expect("register agent");
    assert!(enabled);
    // Installing alone does not talk to launchd.
    assert!(launchctl_calls(world.dir().path()).is_empty());
}

#[given("the daemon runs as a supervised subprocess")]
async fn supervised_subprocess(world: &mut SupervisorWorld) {
    binary_installed(world);
    supervisor_starts(world).await;
    assert_eq!(world.availability, Some(Availability::Subprocess));
}

#[when("the supervisor starts")]
async fn supervisor_starts(world: &mut SupervisorWorld) {
    let availability = world.supervisor().startup().await;
    world.availability = Some(availability);
}

#[when("the supervisor shuts down")]
async fn supervisor_shuts_down(world: &mut SupervisorWorld) {
    world.supervisor().shutdown().await;
}

#[when("start at login is toggled")]
async fn toggle_auto_start(world: &mut SupervisorWorld) {
    let enabled = world
        .supervisor()
        .toggle_auto_start()
        .await
        .expect("toggle auto start");
    world.auto_start.push(enabled);
}

#[when("an update prepares to install")]
async fn update_prepares(world: &mut SupervisorWorld) {
    let runs = Arc::clone(&world.installer_runs);
    let supervisor = world.supervisor();
    let process = supervisor.process().clone();
    let state = supervisor
        .prepare_for_install(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            process.state()
        })
        .await;
    world.state_at_install = Some(state);
}

#[then(regex = r#"^the daemon is reported as "(.+)"$"#)]
fn reported_as(world: &mut SupervisorWorld, expected: String) {
    let availability = world.availability.expect("supervisor started");
    let actual = match availability {
        Availability::AlreadyRunning => "already running",
        Availability::ServiceManaged { .. } => "managed by launchd",
        Availability::Subprocess => "a subprocess",
        Availability::MonitorOnly => "unavailable",
    };
    assert_eq!(actual, expected);
}

#[then("no subprocess is launched")]
async fn no_subprocess(world: &mut SupervisorWorld) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launch_count(world.dir().path()), 0);
    assert!(!world.supervisor().process().is_managing_subprocess());
}

#[then("exactly one subprocess is launched")]
async fn one_subprocess(world: &mut SupervisorWorld) {
    let dir = world.dir().path().to_path_buf();
    assert!(wait_until(Duration::from_secs(2), || launch_count(&dir) == 1).await);
    assert!(world.supervisor().process().is_managing_subprocess());
}

#[then("no subprocess remains")]
fn no_subprocess_remains(world: &mut SupervisorWorld) {
    assert!(!world.supervisor().process().is_managing_subprocess());
}

#[then(regex = r"^launchd is asked to bootstrap the agent (\d+) times?$")]
fn bootstrapped_n_times(world: &mut SupervisorWorld, expected: usize) {
    let bootstraps = launchctl_calls(world.dir().path())
        .iter()
        .filter(|call| call.starts_with("bootstrap "))
        .count();
    assert_eq!(bootstraps, expected);
}

#[then("launchd is not contacted")]
fn launchd_not_contacted(world: &mut SupervisorWorld) {
    assert!(launchctl_calls(world.dir().path()).is_empty());
}

#[then("the agent is booted out")]
fn agent_booted_out(world: &mut SupervisorWorld) {
    let calls = launchctl_calls(world.dir().path());
    assert!(calls.iter().any(|call| call.starts_with("bootout ")));
}

#[then(regex = r"^the login agent is (registered|not registered)$")]
fn agent_state(world: &mut SupervisorWorld, state: String) {
    assert_eq!(world.descriptor_exists(), state == "registered");
}

#[then(regex = r"^the toggles report (on|off) then (on|off)$")]
fn toggles_report(world: &mut SupervisorWorld, first: String, second: String) {
    assert_eq!(world.auto_start, vec![first == "on", second == "on"]);
}

#[then("the installer runs once, with no daemon subprocess left")]
fn installer_runs_once(world: &mut SupervisorWorld) {
    assert_eq!(world.installer_runs.load(Ordering::SeqCst), 1);
    assert!(matches!(
        world.state_at_install,
        Some(ProcessState::Idle | ProcessState::StoppedByRequest)
    ));
    assert!(!world.supervisor().process().is_managing_subprocess());
}
