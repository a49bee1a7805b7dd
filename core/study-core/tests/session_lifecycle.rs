mod support;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use study_core::{
    ActiveSession, DurableMedium, FileMedium, MemoryMedium, RemoteError, SessionManager,
    SessionPhase, StorageConfig, StudyConfig, StudyEngine, SystemClock, SESSION_STORAGE_KEY,
};
use support::ScriptedApi;
use tempfile::TempDir;
use tokio::sync::Notify;

fn manager_over(medium: Arc<dyn DurableMedium>, api: Arc<ScriptedApi>) -> SessionManager {
    SessionManager::new(medium, api)
}

#[tokio::test]
async fn start_activates_and_persists() {
    let medium = Arc::new(MemoryMedium::new());
    let api = ScriptedApi::new();
    let manager = manager_over(medium.clone(), api.clone());

    let session = manager.start(5).await.unwrap().unwrap();

    assert_eq!(session.material_id, 5);
    assert_eq!(
        session.start_time,
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    );
    assert_eq!(manager.phase(), SessionPhase::Active);
    assert_eq!(manager.active_session(), Some(session));
    assert!(medium.get(SESSION_STORAGE_KEY).unwrap().is_some());
}

#[tokio::test]
async fn second_start_is_ignored_while_active() {
    let api = ScriptedApi::new();
    let manager = manager_over(Arc::new(MemoryMedium::new()), api.clone());

    manager.start(5).await.unwrap();
    let second = manager.start(7).await.unwrap();

    assert_eq!(second, None);
    assert_eq!(api.starts(), 1);
    assert_eq!(manager.active_session().unwrap().material_id, 5);
}

#[tokio::test]
async fn failed_start_returns_to_idle_and_can_retry() {
    let medium = Arc::new(MemoryMedium::new());
    let api = ScriptedApi::new();
    api.fail_start(true);
    let manager = manager_over(medium.clone(), api.clone());

    let err = manager.start(5).await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 400, .. }));
    assert_eq!(manager.phase(), SessionPhase::Idle);
    assert!(!manager.is_starting());
    assert!(medium.is_empty());

    api.fail_start(false);
    assert!(manager.start(5).await.unwrap().is_some());
    assert_eq!(api.starts(), 2);
}

#[tokio::test]
async fn end_clears_memory_and_storage() {
    let medium = Arc::new(MemoryMedium::new());
    let api = ScriptedApi::new();
    let manager = manager_over(medium.clone(), api.clone());
    let started = manager.start(5).await.unwrap().unwrap();

    let ended = manager.end().await.unwrap().unwrap();

    assert_eq!(ended.id, started.id);
    assert_eq!(ended.material_id, 5);
    assert_eq!(ended.duration_minutes, Some(25));
    assert!(ended.end_time.is_some());
    assert_eq!(manager.phase(), SessionPhase::Idle);
    assert_eq!(medium.get(SESSION_STORAGE_KEY).unwrap(), None);
    assert_eq!(api.ends(), 1);
}

#[tokio::test]
async fn end_without_session_makes_no_call() {
    let api = ScriptedApi::new();
    let manager = manager_over(Arc::new(MemoryMedium::new()), api.clone());

    assert_eq!(manager.end().await.unwrap(), None);
    assert_eq!(api.ends(), 0);
}

#[tokio::test]
async fn failed_end_keeps_session_active() {
    let medium = Arc::new(MemoryMedium::new());
    let api = ScriptedApi::new();
    let manager = manager_over(medium.clone(), api.clone());
    let started = manager.start(5).await.unwrap().unwrap();
    api.fail_end(true);

    assert!(matches!(
        manager.end().await,
        Err(RemoteError::Transport(_))
    ));
    assert_eq!(manager.phase(), SessionPhase::Active);
    assert!(!manager.is_ending());
    assert_eq!(manager.active_session(), Some(started));
    assert!(medium.get(SESSION_STORAGE_KEY).unwrap().is_some());

    api.fail_end(false);
    assert!(manager.end().await.unwrap().is_some());
    assert_eq!(manager.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn requests_during_start_are_ignored() {
    let gate = Arc::new(Notify::new());
    let api = ScriptedApi::gated(gate.clone());
    let manager = manager_over(Arc::new(MemoryMedium::new()), api.clone());
    let mut observed = manager.subscribe();

    let observer = async {
        observed.wait_for(|state| state.starting).await.unwrap();
        assert_eq!(manager.phase(), SessionPhase::Starting);
        assert!(manager.is_starting());
        assert_eq!(manager.start(7).await.unwrap(), None);
        assert_eq!(manager.end().await.unwrap(), None);
        gate.notify_one();
    };
    let (started, ()) = tokio::join!(manager.start(5), observer);

    assert_eq!(started.unwrap().unwrap().material_id, 5);
    assert_eq!(api.starts(), 1);
    assert!(!manager.is_starting());
}

#[tokio::test]
async fn requests_during_end_are_ignored() {
    let gate = Arc::new(Notify::new());
    let api = ScriptedApi::gated_end(gate.clone());
    let medium = Arc::new(MemoryMedium::new());
    let manager = manager_over(medium.clone(), api.clone());
    manager.set_active(Some(ActiveSession {
        id: 41,
        user_id: 1,
        material_id: 5,
        start_time: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        end_time: None,
        duration_minutes: None,
    }));
    let mut observed = manager.subscribe();

    let observer = async {
        observed.wait_for(|state| state.ending).await.unwrap();
        assert_eq!(manager.phase(), SessionPhase::Ending);
        assert!(manager.is_ending());
        assert_eq!(manager.start(7).await.unwrap(), None);
        assert_eq!(manager.end().await.unwrap(), None);
        gate.notify_one();
    };
    let (ended, ()) = tokio::join!(manager.end(), observer);

    assert_eq!(ended.unwrap().map(|session| session.id), Some(41));
    assert_eq!(api.ends(), 1);
    assert_eq!(api.starts(), 0);
    assert!(!manager.is_ending());
    assert_eq!(manager.phase(), SessionPhase::Idle);
    assert_eq!(medium.get(SESSION_STORAGE_KEY).unwrap(), None);
}

#[tokio::test]
async fn storage_fault_does_not_block_start() {
    let medium = Arc::new(MemoryMedium::new());
    medium.set_available(false);
    let manager = manager_over(medium, ScriptedApi::new());

    let session = manager.start(3).await.unwrap();

    assert!(session.is_some());
    assert_eq!(manager.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn subscribers_see_each_transition() {
    let manager = manager_over(Arc::new(MemoryMedium::new()), ScriptedApi::new());
    let mut observed = manager.subscribe();
    assert_eq!(observed.borrow_and_update().phase(), SessionPhase::Idle);

    manager.start(5).await.unwrap();
    assert!(observed.has_changed().unwrap());
    assert_eq!(observed.borrow_and_update().phase(), SessionPhase::Active);

    manager.end().await.unwrap();
    assert_eq!(observed.borrow_and_update().phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn fresh_engine_rehydrates_without_remote_call() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());

    let first_api = ScriptedApi::new();
    let first = StudyEngine::init(
        storage.clone(),
        StudyConfig::default(),
        Arc::new(FileMedium::new(storage.store_dir())),
        first_api.clone(),
        Arc::new(SystemClock),
    );
    let started = first.sessions().start(5).await.unwrap().unwrap();
    drop(first);

    let second_api = ScriptedApi::new();
    let second = StudyEngine::init(
        storage.clone(),
        StudyConfig::default(),
        Arc::new(FileMedium::new(storage.store_dir())),
        second_api.clone(),
        Arc::new(SystemClock),
    );

    assert_eq!(second.sessions().active_session(), Some(started));
    assert_eq!(second.sessions().phase(), SessionPhase::Active);
    assert_eq!(second_api.starts(), 0);
    assert_eq!(second_api.ends(), 0);
}

#[tokio::test]
async fn rehydrated_session_can_be_ended() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let medium = Arc::new(FileMedium::new(storage.store_dir()));

    manager_over(medium.clone(), ScriptedApi::new())
        .start(9)
        .await
        .unwrap();

    let api = ScriptedApi::new();
    let resumed = manager_over(medium.clone(), api.clone());
    assert_eq!(resumed.rehydrate().map(|s| s.material_id), Some(9));

    resumed.end().await.unwrap();
    assert_eq!(api.ends(), 1);
    assert_eq!(medium.get(SESSION_STORAGE_KEY).unwrap(), None);
}

#[test]
fn unreadable_session_file_is_removed_on_rehydrate() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let store = storage.store_dir();
    std::fs::create_dir_all(&store).unwrap();
    let path = store.join(format!("{}.json", SESSION_STORAGE_KEY));
    std::fs::write(&path, [0xff, 0xfe, b'{']).unwrap();

    let api = ScriptedApi::new();
    let manager = manager_over(Arc::new(FileMedium::new(store)), api.clone());

    assert_eq!(manager.rehydrate(), None);
    assert_eq!(manager.phase(), SessionPhase::Idle);
    assert!(!path.exists());
    assert_eq!(api.starts(), 0);
}

#[tokio::test]
async fn wiped_storage_rehydrates_idle() {
    let medium = Arc::new(MemoryMedium::new());
    manager_over(medium.clone(), ScriptedApi::new())
        .start(5)
        .await
        .unwrap();
    medium.wipe();

    let resumed = manager_over(medium, ScriptedApi::new());
    assert_eq!(resumed.rehydrate(), None);
    assert_eq!(resumed.phase(), SessionPhase::Idle);
}
