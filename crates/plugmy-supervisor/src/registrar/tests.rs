//! Tests for the login agent registrar.

use super::*;
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::{TempDir, tempdir};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Bootstrap(PathBuf),
    Bootout(PathBuf),
}

/// Records calls and optionally fails them.
#[derive(Default)]
struct RecordingManager {
    calls: Mutex<Vec<Call>>,
    fail: bool,
}

impl RecordingManager {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock calls").clone()
    }

    fn outcome(&self, action: &'static str) -> std::result::Result<(), ServiceManagerError> {
        if self.fail {
            Err(ServiceManagerError::Failed {
                action,
                code: Some(5),
                stderr: "Input/output error".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ServiceManager for RecordingManager {
    async fn bootstrap(&self, descriptor: &Path) -> std::result::Result<(), ServiceManagerError> {
        self.calls
            .lock()
            .expect("lock calls")
            .push(Call::Bootstrap(descriptor.to_path_buf()));
        self.outcome("bootstrap")
    }

    async fn bootout(&self, descriptor: &Path) -> std::result::Result<(), ServiceManagerError> {
        self.calls
            .lock()
            .expect("lock calls")
            .push(Call::Bootout(descriptor.to_path_buf()));
        self.outcome("bootout")
    }
}

struct Fixture {
    dir: TempDir,
    binary: Arc<Mutex<PathBuf>>,
    manager: Arc<RecordingManager>,
    registrar: ServiceRegistrar,
}

impl Fixture {
    fn new() -> Self {
        Self::with_manager(RecordingManager::default())
    }

    fn with_manager(manager: RecordingManager) -> Self {
        let dir = tempdir().expect("tempdir");
        let binary = Arc::new(Mutex::new(dir.path().join("v1/plug-my-ai")));
        let manager = Arc::new(manager);
        let locator = {
            let binary = Arc::clone(&binary);
            Arc::new(move || binary.lock().expect("lock binary").clone())
        };
        let registrar = ServiceRegistrar::new(
            dir.path().join("LaunchAgents/ai.plugmy.daemon.plist"),
            DescriptorTemplate::new("ai.plugmy.daemon", vec!["--no-tray".into()], "/tmp", "plug-my-ai"),
            locator,
            Arc::clone(&manager) as Arc<dyn ServiceManager>,
        );
        Self {
            dir,
            binary,
            manager,
            registrar,
        }
    }

    fn move_binary(&self, to: &str) -> PathBuf {
        let path = self.dir.path().join(to);
        *self.binary.lock().expect("lock binary") = path.clone();
        path
    }

    fn descriptor_contents(&self) -> String {
        std::fs::read_to_string(self.registrar.descriptor_path()).expect("read descriptor")
    }
}

#[tokio::test]
async fn install_creates_agent_directory_and_descriptor() {
    let f = Fixture::new();
    assert!(!f.registrar.is_registered());

    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");

    assert!(f.registrar.is_registered());
    assert!(f.descriptor_contents().contains("v1/plug-my-ai"));
    assert!(f.manager.calls().is_empty());
}

#[tokio::test]
async fn install_overwrites_previous_descriptor() {
    let f = Fixture::new();
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("first install");
    f.move_binary("v2/plug-my-ai");
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("second install");

    let contents = f.descriptor_contents();
    assert!(contents.contains("v2/plug-my-ai"));
    assert!(!contents.contains("v1/plug-my-ai"));
}

#[tokio::test]
async fn install_reports_unwritable_location() {
    let f = Fixture::new();
    // A regular file where the agent directory should be.
    std::fs::write(f.dir.path().join("LaunchAgents"), b"").expect("write blocker");

    let err = f
        .registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect_err("install should fail");

    assert!(matches!(err, RegistrarError::Persistence { .. }));
    assert!(!f.registrar.is_registered());
}

#[tokio::test]
async fn install_refuses_binary_path_with_control_character() {
    let f = Fixture::new();
    f.move_binary("v1/plug\u{1}my-ai");

    let err = f
        .registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect_err("install should fail");

    assert!(matches!(
        err,
        RegistrarError::Encoding {
            source: DescriptorError::IllegalCharacter { .. },
            ..
        }
    ));
    assert!(!f.registrar.is_registered());
    assert!(!f.dir.path().join("LaunchAgents").exists());
}

#[tokio::test]
async fn remove_boots_out_then_deletes() {
    let f = Fixture::new();
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");

    f.registrar.remove().await.expect("remove");

    assert!(!f.registrar.is_registered());
    assert_eq!(
        f.manager.calls(),
        vec![Call::Bootout(f.registrar.descriptor_path().to_path_buf())]
    );
}

#[tokio::test]
async fn remove_deletes_even_when_bootout_fails() {
    let f = Fixture::with_manager(RecordingManager::failing());
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");

    f.registrar.remove().await.expect("remove");

    assert!(!f.registrar.is_registered());
}

#[tokio::test]
async fn remove_without_descriptor_is_ok() {
    let f = Fixture::new();
    f.registrar.remove().await.expect("remove");
    assert!(!f.registrar.is_registered());
}

#[tokio::test]
async fn bootout_only_preserves_descriptor() {
    let f = Fixture::new();
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");

    f.registrar.bootout_only().await;

    assert!(f.registrar.is_registered());
    assert_eq!(
        f.manager.calls(),
        vec![Call::Bootout(f.registrar.descriptor_path().to_path_buf())]
    );
}

#[tokio::test]
async fn bootout_only_is_noop_when_unregistered() {
    let f = Fixture::new();
    f.registrar.bootout_only().await;
    assert!(f.manager.calls().is_empty());
    assert!(!f.registrar.is_registered());
}

#[tokio::test]
async fn bootstrap_is_noop_when_unregistered() {
    let f = Fixture::new();

    let bootstrapped = f
        .registrar
        .bootstrap_if_registered()
        .await
        .expect("bootstrap");

    assert!(!bootstrapped);
    assert!(!f.registrar.is_registered());
    assert!(f.manager.calls().is_empty());
}

#[tokio::test]
async fn bootstrap_repairs_descriptor_for_moved_binary() {
    let f = Fixture::new();
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");
    let moved = f.move_binary("Applications/plug-my-ai");

    let bootstrapped = f
        .registrar
        .bootstrap_if_registered()
        .await
        .expect("bootstrap");

    assert!(bootstrapped);
    assert!(f.descriptor_contents().contains(&*moved.to_string_lossy()));
    assert_eq!(
        f.manager.calls(),
        vec![Call::Bootstrap(f.registrar.descriptor_path().to_path_buf())]
    );
}

#[tokio::test]
async fn bootstrap_failure_is_swallowed() {
    let f = Fixture::with_manager(RecordingManager::failing());
    f.registrar
        .install(&f.registrar.current_descriptor())
        .await
        .expect("install");

    let bootstrapped = f
        .registrar
        .bootstrap_if_registered()
        .await
        .expect("bootstrap failure is not an error");

    assert!(bootstrapped);
    assert!(f.registrar.is_registered());
}

#[tokio::test]
async fn toggle_twice_restores_registration() {
    let f = Fixture::new();

    assert!(f.registrar.toggle().await.expect("first toggle"));
    assert!(f.registrar.is_registered());
    assert!(!f.registrar.toggle().await.expect("second toggle"));
    assert!(!f.registrar.is_registered());
}

#[tokio::test]
async fn toggle_reads_registration_from_disk() {
    let f = Fixture::new();
    f.registrar.toggle().await.expect("install via toggle");
    // Removed behind the registrar's back.
    std::fs::remove_file(f.registrar.descriptor_path()).expect("delete descriptor");

    assert!(f.registrar.toggle().await.expect("toggle"));
    assert!(f.registrar.is_registered());
}
