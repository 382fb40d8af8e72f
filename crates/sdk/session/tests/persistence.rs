use std::sync::Arc;

use alloy_primitives::B256;
use beam_core::{
    ApiCall, ChainId, MockApi, OperationAction, OperationStatus, PlayerOperation, Session,
    SignatureRequest,
};
use beam_session::{
    ChainConfig, FileStorage, MessageEvent, OverlayControls, OverlayHandle, OverlayKind,
    PopupBlocked, PopupRequest, PopupWindow, SdkConfig, SessionError, SessionManager,
    SessionState, StorageService, WindowHost,
};
use chrono::{Duration, Utc};
use tokio::sync::broadcast;

const ENTITY: &str = "player-1";
const CHAIN: u64 = 13337;

/// Host for environments without any window: every popup is blocked and
/// overlays draw nothing.
struct HeadlessHost {
    sender: broadcast::Sender<MessageEvent>,
}

struct NoOverlay;

impl OverlayHandle for NoOverlay {
    fn remove(&self) {}
}

impl WindowHost for HeadlessHost {
    fn open_popup(&self, request: &PopupRequest) -> Result<Box<dyn PopupWindow>, PopupBlocked> {
        Err(PopupBlocked(request.url.clone()))
    }

    fn show_overlay(&self, _kind: OverlayKind, _controls: OverlayControls) -> Box<dyn OverlayHandle> {
        Box::new(NoOverlay)
    }

    fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.sender.subscribe()
    }
}

fn manager(dir: &std::path::Path, api: &MockApi) -> SessionManager {
    let (sender, _) = broadcast::channel(8);
    let config = SdkConfig::new(vec![ChainConfig::new(ChainId::BeamTestnet, "pk")])
        .expect("testnet config should be valid");

    SessionManager::builder()
        .config(config)
        .storage(StorageService::new(
            FileStorage::new(dir).expect("storage dir should be created"),
        ))
        .window_host(Arc::new(HeadlessHost { sender }))
        .api(Arc::new(api.clone()))
        .build()
        .expect("manager should build")
}

fn one_hour_session(address: String) -> Session {
    let now = Utc::now();
    Session {
        id: "session-1".into(),
        is_active: true,
        session_address: address,
        start_time: Some(now - Duration::minutes(1)),
        end_time: Some(now + Duration::hours(1)),
    }
}

/// Key and session survive a restart on the same storage directory, and
/// signing after the restart stays local.
#[tokio::test]
async fn test_session_survives_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let api = MockApi::new("https://identity.beta.onbeam.com");

    // ================================================================
    // First run: key generated, session delegated remotely
    // ================================================================
    let first = manager(dir.path(), &api);
    let initial = first
        .get_active_session_and_keys(ENTITY, CHAIN)
        .await
        .expect("resolve should succeed");
    assert!(initial.session.is_none());
    assert_eq!(first.session_state(), SessionState::KeyOnly);

    api.insert_session(one_hour_session(initial.key.address().to_string()));
    let session = first
        .get_active_session(ENTITY, CHAIN)
        .await
        .expect("remote session should be found");
    drop(first);

    // ================================================================
    // Second run: the service is unreachable, the cache still answers
    // ================================================================
    api.clear_sessions();
    api.fail_on("get_active_session");

    let second = manager(dir.path(), &api);
    assert_eq!(second.session_state(), SessionState::SessionActive);

    let cached = second
        .get_active_session(ENTITY, CHAIN)
        .await
        .expect("cached session should be used");
    assert_eq!(cached.id, session.id);
    assert_eq!(cached.session_address, session.session_address);

    api.insert_operation(PlayerOperation {
        id: "op-1".into(),
        status: OperationStatus::Pending,
        url: None,
        actions: vec![OperationAction {
            id: "action-0".into(),
            signature: Some(SignatureRequest {
                hash: B256::repeat_byte(9).to_string(),
                signature: None,
                data: None,
                kind: None,
            }),
        }],
        transactions: Vec::new(),
    });

    let signed = second
        .sign_operation(ENTITY, "op-1", CHAIN, false)
        .await
        .expect("session signing should succeed");
    assert_eq!(signed.status, OperationStatus::Signed);
    assert!(signed.actions[0].signature.as_ref().unwrap().signature.is_some());

    // ================================================================
    // Clearing removes everything from disk
    // ================================================================
    second.clear_session().expect("clear should succeed");
    drop(second);

    let third = manager(dir.path(), &api);
    assert_eq!(third.session_state(), SessionState::NoKey);
}

#[tokio::test]
async fn test_create_session_without_screen_is_not_confirmed() {
    let dir = tempfile::tempdir().expect("temp dir");
    let api = MockApi::new("https://identity.beta.onbeam.com");
    let manager = manager(dir.path(), &api);

    let result = manager.create_session(ENTITY, CHAIN).await;

    assert!(matches!(result, Err(SessionError::SessionNotConfirmed)));
    assert_eq!(
        api.count(|call| matches!(call, ApiCall::CreateSessionRequest { .. })),
        1
    );
}
