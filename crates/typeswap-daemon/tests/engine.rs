use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use typeswap_core::storage::{CredentialStore, ImportSummary, ShortcutStore};
use typeswap_core::{
    Config, CredentialEntry, MemoryStore, MockPlatform, Platform, Result, Service, ShortcutEntry,
    TypeswapError,
};
use typeswap_daemon::{AppContext, Engine, PipelineEvent, PipelinePhase};

const WAIT: Duration = Duration::from_secs(3);

fn quick_config() -> Config {
    Config {
        min_replacement_interval_ms: 0,
        clipboard_base_delay_ms: 0,
        settle_delay_ms: 0,
        backspace_delay_ms: 0,
        paste_delay_ms: 0,
        queue_poll_interval_ms: 10,
        unhealthy_backoff_ms: 10,
        error_backoff_ms: 0,
        restart_pause_ms: 0,
        join_timeout_ms: 1000,
        ..Config::default()
    }
}

fn engine_with(store: Arc<MemoryStore>, mock: Arc<MockPlatform>, config: Config) -> Engine {
    let ctx = AppContext::new(config, store, mock as Arc<dyn Platform>);
    Engine::new(ctx).unwrap()
}

fn signature_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_shortcuts([("sig", "Best regards")]).unwrap())
}

fn wait_for_event(
    events: &Receiver<PipelineEvent>,
    wanted: impl Fn(&PipelineEvent) -> bool,
) -> PipelineEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if wanted(&event) => return event,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn is_replaced(event: &PipelineEvent) -> bool {
    matches!(event, PipelineEvent::Replaced { .. })
}

#[test]
fn typed_shortcut_is_replaced_in_place() {
    let mock = Arc::new(MockPlatform::with_clipboard("my clipboard"));
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();

    engine.start().unwrap();
    assert!(engine.is_running());
    assert_eq!(engine.phase(), PipelinePhase::Running);
    assert_eq!(
        events.recv_timeout(WAIT).unwrap(),
        PipelineEvent::StatusChanged { running: true }
    );

    mock.type_text("Thanks, sig ");
    let event = wait_for_event(&events, is_replaced);
    assert_eq!(
        event,
        PipelineEvent::Replaced {
            typed: "sig".to_string(),
            replacement: "Best regards".to_string(),
        }
    );
    assert_eq!(mock.document(), "Thanks, Best regards");
    assert_eq!(mock.clipboard().as_deref(), Some("my clipboard"));
    assert!(engine.state().last_successful_replacement.is_some());

    engine.stop();
}

#[test]
fn empty_clipboard_stays_empty() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();
    engine.start().unwrap();

    mock.type_text("sig ");
    wait_for_event(&events, is_replaced);
    assert_eq!(mock.pasted(), vec!["Best regards".to_string()]);
    assert_eq!(mock.clipboard(), None);
}

#[test]
fn observers_are_notified_of_replacements() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let (tx, rx) = crossbeam_channel::unbounded();
    engine.on_event(move |event| {
        if let PipelineEvent::Replaced { typed, .. } = event {
            let _ = tx.send(typed.clone());
        }
    });

    engine.start().unwrap();
    mock.type_text("sig ");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "sig");
}

#[test]
fn start_fails_without_definitions() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(Arc::new(MemoryStore::new()), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();

    let err = engine.start().unwrap_err();
    assert!(err.is_startup());
    assert!(!engine.is_running());
    assert_eq!(engine.phase(), PipelinePhase::Stopped);
    assert!(!mock.is_hooked());
    assert!(events.try_recv().is_err());
}

#[test]
fn hook_failure_leaves_pipeline_stopped() {
    let mock = Arc::new(MockPlatform::new());
    mock.fail_hook(Some("accessibility permission denied"));
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());

    let err = engine.start().unwrap_err();
    assert!(matches!(err, TypeswapError::Startup(_)));
    assert!(!engine.is_running());
    assert_eq!(engine.phase(), PipelinePhase::Stopped);

    mock.fail_hook(None);
    engine.start().unwrap();
    assert!(mock.is_hooked());
}

#[test]
fn stop_is_idempotent() {
    let mock = Arc::new(MockPlatform::new().with_foreground_thread(42));
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();

    engine.stop();
    engine.start().unwrap();
    // The worker attaches itself, since it is the thread injecting keys.
    wait_until(|| mock.attached_thread() == Some(42));
    let (injector, _) = mock.attachment().unwrap();
    assert_ne!(injector, mock.current_thread_id());

    engine.stop();
    engine.stop();
    assert!(!mock.is_hooked());
    assert_eq!(mock.attached_thread(), None);
    assert_eq!(engine.phase(), PipelinePhase::Stopped);

    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            PipelineEvent::StatusChanged { running: true },
            PipelineEvent::StatusChanged { running: false },
        ]
    );
}

#[test]
fn keys_are_ignored_after_stop() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    engine.start().unwrap();
    engine.stop();

    assert!(!mock.press(typeswap_core::KeyInput::Char('s')));
    mock.type_text("ig ");
    thread::sleep(Duration::from_millis(50));
    assert!(mock.pasted().is_empty());
}

#[test]
fn credentials_rotate_between_uses() {
    let store = signature_store();
    store.add_service("netflix", "Netflix", "@nf").unwrap();
    for content in ["first@example.com", "second@example.com"] {
        store.add_credential("netflix", content).unwrap();
    }
    let mock = Arc::new(MockPlatform::new());
    let config = Config {
        pin_credentials: false,
        ..quick_config()
    };
    let engine = engine_with(store, Arc::clone(&mock), config);
    let events = engine.subscribe();
    engine.start().unwrap();

    for _ in 0..3 {
        mock.type_text("@nf ");
        wait_for_event(&events, is_replaced);
        wait_until(|| !engine.state().is_replacing);
    }
    assert_eq!(
        mock.pasted(),
        vec![
            "first@example.com".to_string(),
            "second@example.com".to_string(),
            "first@example.com".to_string(),
        ]
    );
}

#[test]
fn saved_shortcut_is_live_without_restart() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();
    engine.start().unwrap();

    engine.save_shortcut("omw", "On my way!").unwrap();
    mock.type_text("omw ");
    wait_for_event(&events, is_replaced);
    assert_eq!(mock.document(), "On my way!");
    assert!(events.try_iter().all(|e| is_replaced(&e)));
}

#[test]
fn reload_with_restart_cycles_status() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();
    engine.start().unwrap();

    engine.reload_replacements(true).unwrap();
    assert!(engine.is_running());
    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            PipelineEvent::StatusChanged { running: true },
            PipelineEvent::StatusChanged { running: false },
            PipelineEvent::StatusChanged { running: true },
        ]
    );
}

#[test]
fn recovery_reloads_definitions() {
    let store = signature_store();
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(Arc::clone(&store), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();
    engine.start().unwrap();

    store.save_shortcut("brb", "be right back").unwrap();
    engine.recover().unwrap();
    assert!(engine.state().service_healthy);
    assert_eq!(engine.phase(), PipelinePhase::Running);

    mock.type_text("brb ");
    wait_for_event(&events, is_replaced);
    assert_eq!(mock.document(), "be right back");
}

/// Store whose shortcut listing can be made to fail.
struct FlakyStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl ShortcutStore for FlakyStore {
    fn get_shortcuts(&self) -> Result<HashMap<String, String>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TypeswapError::Store("database is locked".to_string()));
        }
        self.inner.get_shortcuts()
    }

    fn list_shortcuts(&self) -> Result<Vec<ShortcutEntry>> {
        self.inner.list_shortcuts()
    }

    fn shortcut(&self, keyword: &str) -> Result<Option<ShortcutEntry>> {
        self.inner.shortcut(keyword)
    }

    fn save_shortcut(&self, keyword: &str, replacement: &str) -> Result<()> {
        self.inner.save_shortcut(keyword, replacement)
    }

    fn delete_shortcut(&self, keyword: &str) -> Result<()> {
        self.inner.delete_shortcut(keyword)
    }
}

impl CredentialStore for FlakyStore {
    fn credential_keywords(&self) -> Result<Vec<String>> {
        self.inner.credential_keywords()
    }

    fn get_next_credential(&self, keyword: &str) -> Result<Option<String>> {
        self.inner.get_next_credential(keyword)
    }

    fn services(&self) -> Result<Vec<Service>> {
        self.inner.services()
    }

    fn add_service(&self, code: &str, name: &str, shortcut: &str) -> Result<Service> {
        self.inner.add_service(code, name, shortcut)
    }

    fn add_credential(&self, service_code: &str, content: &str) -> Result<CredentialEntry> {
        self.inner.add_credential(service_code, content)
    }

    fn import_credentials(&self, service_code: &str, contents: &[String]) -> Result<ImportSummary> {
        self.inner.import_credentials(service_code, contents)
    }

    fn credentials(&self, service_code: &str) -> Result<Vec<CredentialEntry>> {
        self.inner.credentials(service_code)
    }

    fn reset_credential_usage(&self, service_code: Option<&str>) -> Result<usize> {
        self.inner.reset_credential_usage(service_code)
    }
}

#[test]
fn failed_recovery_and_restart_report_stopped() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::with_shortcuts([("sig", "Best regards")]).unwrap(),
        broken: AtomicBool::new(false),
    });
    let mock = Arc::new(MockPlatform::new());
    let ctx = AppContext::new(quick_config(), Arc::clone(&store) as _, mock as Arc<dyn Platform>);
    let engine = Engine::new(ctx).unwrap();
    let events = engine.subscribe();
    engine.start().unwrap();

    store.broken.store(true, Ordering::SeqCst);
    assert!(engine.recover().is_err());
    assert!(!engine.is_running());
    assert_eq!(engine.phase(), PipelinePhase::Stopped);

    // The stop for the restart is the last word when the start fails.
    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            PipelineEvent::StatusChanged { running: true },
            PipelineEvent::StatusChanged { running: false },
        ]
    );

    store.broken.store(false, Ordering::SeqCst);
    engine.start().unwrap();
    assert!(engine.is_running());
}

#[test]
fn repeated_failures_do_not_kill_the_worker() {
    let mock = Arc::new(MockPlatform::new());
    let engine = engine_with(signature_store(), Arc::clone(&mock), quick_config());
    let events = engine.subscribe();
    engine.start().unwrap();

    // Enough failures to cross the consecutive-error threshold; the worker
    // recovers and the next attempt goes through.
    mock.fail_injections(4);
    let mut replaced = false;
    for _ in 0..40 {
        wait_until(|| !engine.state().is_replacing);
        mock.type_text("sig ");
        thread::sleep(Duration::from_millis(50));
        if events.try_iter().any(|e| is_replaced(&e)) {
            replaced = true;
            break;
        }
    }

    assert!(replaced);
    assert!(engine.is_running());
    assert!(engine.state().service_healthy);
}

#[test]
fn edits_from_another_process_go_live_after_reload() {
    use typeswap_core::JsonStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(JsonStore::open(&path).unwrap());
    store.save_shortcut("sig", "Best regards").unwrap();

    let mock = Arc::new(MockPlatform::new());
    let ctx = AppContext::new(
        quick_config(),
        Arc::clone(&store) as Arc<dyn typeswap_core::Store>,
        Arc::clone(&mock) as Arc<dyn Platform>,
    );
    let engine = Engine::new(ctx).unwrap();
    let events = engine.subscribe();
    engine.start().unwrap();

    let editor = JsonStore::open(&path).unwrap();
    editor.save_shortcut("addr", "221B Baker Street").unwrap();
    assert!(store.take_external_changes().unwrap());

    engine.reload_replacements(false).unwrap();
    mock.type_text("addr ");
    wait_for_event(&events, is_replaced);
    assert_eq!(mock.document(), "221B Baker Street");

    engine.stop();
}

#[test]
fn supervisor_recovers_an_idle_pipeline() {
    let store = signature_store();
    let mock = Arc::new(MockPlatform::new().with_foreground_thread(42));
    let config = Config {
        health_check_interval_secs: 1,
        ..quick_config()
    };
    let engine = engine_with(Arc::clone(&store), Arc::clone(&mock), config);
    let events = engine.subscribe();
    engine.start().unwrap();
    wait_until(|| mock.attached_thread() == Some(42));
    let attachment = mock.attachment();

    // Saved behind the engine's back, so only a recovery pass reloads it.
    store.save_shortcut("brb", "be right back").unwrap();

    let deadline = Instant::now() + Duration::from_secs(8);
    let mut replaced = false;
    while !replaced && Instant::now() < deadline {
        mock.type_text("brb ");
        replaced = matches!(
            events.recv_timeout(Duration::from_millis(250)),
            Ok(PipelineEvent::Replaced { ref typed, .. }) if typed == "brb"
        );
    }

    assert!(replaced);
    assert!(engine.is_running());
    assert!(engine.state().service_healthy);
    // Recovery runs on the supervisor thread but re-attaches the worker.
    assert_eq!(mock.attachment(), attachment);
}
