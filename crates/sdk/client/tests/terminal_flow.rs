//! Session flows through the terminal window host.

use std::sync::Arc;

use beam_client::{BeamClient, TerminalInput, TerminalWindowHost, parse_line};
use beam_core::{ChainId, MockApi, MockRpcTransport, RpcTransport};
use beam_session::{ChainConfig, ChainEnvironment, SdkConfig, SessionError, SessionState};
use serde_json::json;

const AUTH: &str = "https://identity.beta.onbeam.com";
const ENTITY: &str = "player-1";
const CHAIN: u64 = 13337;

fn client(api: &MockApi, host: &TerminalWindowHost) -> BeamClient {
    BeamClient::builder()
        .config(SdkConfig::new(vec![ChainConfig::new(ChainId::BeamTestnet, "pk")]).unwrap())
        .window_host(Arc::new(host.clone()))
        .api(Arc::new(api.clone()))
        .rpc_factory(|_: &ChainEnvironment| -> Arc<dyn RpcTransport> {
            Arc::new(MockRpcTransport::new(CHAIN))
        })
        .build()
        .unwrap()
}

async fn wait_for_listener(host: &TerminalWindowHost) {
    while host.listener_count() == 0 {
        tokio::task::yield_now().await;
    }
}

fn confirmation_line(origin: &str, message_type: &str) -> String {
    json!({
        "origin": origin,
        "data": {
            "eventType": "beam_confirmation",
            "messageType": message_type,
            "payload": null
        }
    })
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn test_create_session_confirmed_from_stdin_line() {
    let api = MockApi::new(AUTH);
    api.issue_sessions_on_request(true);
    let host = TerminalWindowHost::new();
    let client = client(&api, &host);
    client.open_popup(None).unwrap();

    let (result, _) = tokio::join!(client.create_session(ENTITY, CHAIN), async {
        wait_for_listener(&host).await;
        // Lines from other origins are ignored.
        host.deliver(parse_line(&confirmation_line(
            "https://evil.example",
            "request_session_rejected",
        )));
        host.deliver(parse_line(&confirmation_line(AUTH, "request_session_confirmed")));
    });

    let session = result.unwrap();
    assert_eq!(session.session_address, client.signing_address().unwrap());
    assert_eq!(client.session_state(), SessionState::SessionActive);
}

#[tokio::test(start_paused = true)]
async fn test_empty_line_dismisses_session_request() {
    let api = MockApi::new(AUTH);
    let host = TerminalWindowHost::new();
    let client = client(&api, &host);
    client.open_popup(None).unwrap();

    let (result, _) = tokio::join!(client.create_session(ENTITY, CHAIN), async {
        wait_for_listener(&host).await;
        host.deliver(TerminalInput::Close);
    });

    assert!(matches!(result, Err(SessionError::SessionNotConfirmed)));
    assert!(!host.is_window_open());
}
