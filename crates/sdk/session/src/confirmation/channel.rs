//! Popup/overlay lifecycle and the message handshake.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use super::messages::{
    Confirmation, ConfirmationEnvelope, ConnectionMessage, ConnectionResult, FlowMessage,
    OperationMessage, SessionMessage, interpret,
};
use super::window::{
    MessageEvent, OverlayHandle, OverlayKind, PopupRequest, PopupSize, PopupWindow, WindowHost,
};
use crate::config::{ConfigHandle, ConfirmationConfig};
use crate::error::ConfirmationError;

struct OverlayState {
    kind: OverlayKind,
    /// `None` when this overlay kind is disabled; the overlay still counts as open.
    handle: Option<Box<dyn OverlayHandle>>,
}

#[derive(Default)]
struct ChannelState {
    window: Option<Box<dyn PopupWindow>>,
    overlay: Option<OverlayState>,
    overlay_closed: bool,
    current_url: Option<String>,
    popup_size: Option<PopupSize>,
}

struct ChannelInner {
    host: Arc<dyn WindowHost>,
    config: ConfigHandle,
    settings: ConfirmationConfig,
    state: Mutex<ChannelState>,
}

impl ChannelInner {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_popup(&self, url: &str, size: PopupSize) -> Option<Box<dyn PopupWindow>> {
        let request = PopupRequest {
            url: url.to_string(),
            title: self.settings.popup_title.clone(),
            size,
        };
        match self.host.open_popup(&request) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn show_overlay(self: &Arc<Self>, kind: OverlayKind) -> OverlayState {
        let handle = self.settings.overlay.allows(kind).then(|| {
            self.host.show_overlay(
                kind,
                OverlayControls {
                    inner: Arc::downgrade(self),
                },
            )
        });
        OverlayState { kind, handle }
    }

    /// Close the popup and remove the overlay.
    fn teardown(&self) {
        let (window, overlay) = {
            let mut state = self.lock();
            (state.window.take(), state.overlay.take())
        };

        if let Some(window) = window {
            window.close();
        }
        if let Some(handle) = overlay.and_then(|overlay| overlay.handle) {
            handle.remove();
        }
    }

    /// Whether the user closed the popup or dismissed the overlay.
    fn dismissed(&self) -> bool {
        let mut state = self.lock();
        let window_closed = state.window.as_ref().is_some_and(|window| window.is_closed());

        if window_closed || state.overlay_closed {
            state.overlay_closed = false;
            state.window = None;
            return true;
        }
        false
    }
}

/// Handed to the host along with an overlay it draws.
///
/// Holds only a weak reference, so a forgotten overlay does not keep the
/// channel alive.
#[derive(Clone)]
pub struct OverlayControls {
    inner: Weak<ChannelInner>,
}

impl OverlayControls {
    /// Reopen the popup at the current URL, e.g. after the user allowed popups.
    pub fn try_again(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let (url, size, stale_window, stale_overlay) = {
            let mut state = inner.lock();
            let Some(url) = state.current_url.clone() else {
                return;
            };
            let size = state.popup_size.unwrap_or(inner.settings.popup_size);
            (url, size, state.window.take(), state.overlay.take())
        };

        if let Some(window) = stale_window {
            window.close();
        }
        if let Some(handle) = stale_overlay.and_then(|overlay| overlay.handle) {
            handle.remove();
        }

        let window = inner.open_popup(&url, size);
        let kind = if window.is_some() {
            OverlayKind::Generic
        } else {
            OverlayKind::Blocked
        };
        let overlay = inner.show_overlay(kind);

        let mut state = inner.lock();
        state.window = window;
        state.overlay = Some(overlay);
        debug!("Popup reopened at {}", url);
    }

    /// The user dismissed the overlay: tear everything down and let any
    /// pending handshake resolve as dismissed.
    pub fn dismiss(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        inner.lock().overlay_closed = true;
        inner.teardown();
        debug!("Overlay dismissed");
    }
}

/// Single popup + overlay pair per channel, and the handshakes that run in it.
///
/// Cloning shares the popup state.
#[derive(Clone)]
pub struct ConfirmationChannel {
    inner: Arc<ChannelInner>,
}

impl ConfirmationChannel {
    pub fn new(host: Arc<dyn WindowHost>, config: ConfigHandle) -> Self {
        let settings = config
            .snapshot()
            .map(|config| config.confirmation)
            .unwrap_or_default();
        Self::with_settings(host, config, settings)
    }

    pub fn with_settings(
        host: Arc<dyn WindowHost>,
        config: ConfigHandle,
        settings: ConfirmationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                host,
                config,
                settings,
                state: Mutex::new(ChannelState::default()),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.settings.poll_interval
    }

    /// Whether a popup or overlay is currently open.
    pub fn is_open(&self) -> bool {
        let state = self.inner.lock();
        state.window.is_some() || state.overlay.is_some()
    }

    /// URL the popup shows (or would show, if blocked).
    pub fn current_url(&self) -> Option<String> {
        self.inner.lock().current_url.clone()
    }

    /// Pre-open the popup on the loading page. If the host blocks it, a
    /// blocked overlay with "try again" is shown instead. No-op while a popup
    /// and overlay are already open.
    pub fn loading(&self, size: Option<PopupSize>) -> Result<(), ConfirmationError> {
        let auth_url = self.inner.config.auth_url()?;
        let url = format!("{auth_url}/loading");
        let size = size.unwrap_or(self.inner.settings.popup_size);

        let (stale_window, stale_overlay) = {
            let mut state = self.inner.lock();
            if state.window.is_some() && state.overlay.is_some() {
                return Ok(());
            }
            state.current_url = Some(url.clone());
            state.popup_size = Some(size);
            (state.window.take(), state.overlay.take())
        };

        if let Some(window) = stale_window {
            window.close();
        }
        if let Some(handle) = stale_overlay.and_then(|overlay| overlay.handle) {
            handle.remove();
        }

        let window = self.inner.open_popup(&url, size);
        let kind = if window.is_some() {
            OverlayKind::Generic
        } else {
            OverlayKind::Blocked
        };
        let overlay = self.inner.show_overlay(kind);
        debug!("Confirmation screen opened ({:?} overlay)", overlay.kind);

        let mut state = self.inner.lock();
        state.window = window;
        state.overlay = Some(overlay);
        state.overlay_closed = false;

        Ok(())
    }

    /// Close the popup and remove the overlay. No-op when nothing is open.
    pub fn close_window(&self) {
        self.inner.teardown();
    }

    pub async fn request_connection(
        &self,
        url: &str,
    ) -> Result<Confirmation<ConnectionResult>, ConfirmationError> {
        self.handshake::<ConnectionMessage>(url).await
    }

    pub async fn request_session(&self, url: &str) -> Result<Confirmation<()>, ConfirmationError> {
        self.handshake::<SessionMessage>(url).await
    }

    pub async fn sign_operation(&self, url: &str) -> Result<Confirmation<()>, ConfirmationError> {
        self.handshake::<OperationMessage>(url).await
    }

    /// Show `url` in the popup and wait for the first relevant outcome: a
    /// flow message from the auth origin, the user closing the popup or
    /// overlay, or the optional timeout. The popup is torn down on every path.
    async fn handshake<M: FlowMessage>(
        &self,
        url: &str,
    ) -> Result<Confirmation<M::Output>, ConfirmationError> {
        let mut messages = self.inner.host.subscribe();

        {
            let mut state = self.inner.lock();
            if let Some(window) = state.window.as_ref() {
                window.navigate(url);
            }
            state.current_url = Some(url.to_string());

            if state.overlay.is_none() {
                state.overlay_closed = false;
                debug!("No confirmation screen open for {}; treating as dismissed", M::FLOW);
                return Ok(Confirmation::Dismissed);
            }
        }
        info!("Waiting for {} confirmation", M::FLOW);

        let poll = self.inner.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let timeout = self.inner.settings.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                received = messages.recv() => match received {
                    Ok(event) => {
                        if let Some(result) = self.accept::<M>(&event) {
                            break result.map(Confirmation::Confirmed);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Confirmation listener skipped {} messages", skipped);
                    }
                    Err(RecvError::Closed) => break Err(ConfirmationError::ChannelClosed),
                },
                _ = ticker.tick() => {
                    if self.inner.dismissed() {
                        debug!("Confirmation screen closed before {} completed", M::FLOW);
                        break Ok(Confirmation::Dismissed);
                    }
                }
                _ = &mut deadline => {
                    let limit = timeout.unwrap_or_default();
                    warn!("{} confirmation timed out after {:?}", M::FLOW, limit);
                    break Err(ConfirmationError::TimedOut(limit));
                }
            }
        };

        self.inner.teardown();
        outcome
    }

    /// Interpret `event` for flow `M`. `None` means "not for us, keep waiting".
    fn accept<M: FlowMessage>(
        &self,
        event: &MessageEvent,
    ) -> Option<Result<M::Output, ConfirmationError>> {
        let auth_url = match self.inner.config.auth_url() {
            Ok(url) => url,
            Err(e) => return Some(Err(e.into())),
        };

        if !same_origin(&event.origin, &auth_url) {
            debug!("Ignoring message from {}", event.origin);
            return None;
        }

        let envelope = ConfirmationEnvelope::from_data(&event.data)?;
        Some(interpret::<M>(&envelope))
    }
}

fn same_origin(origin: &str, auth_url: &str) -> bool {
    match (Url::parse(origin), Url::parse(auth_url)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => origin.trim_end_matches('/') == auth_url.trim_end_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, SdkConfig};
    use crate::confirmation::{MessageType, MockWindowHost, OverlayOptions};
    use crate::error::Flow;
    use beam_core::ChainId;
    use serde_json::{Value, json};

    const AUTH: &str = "https://identity.beta.onbeam.com";

    fn config() -> ConfigHandle {
        ConfigHandle::new(SdkConfig::new(vec![ChainConfig::new(ChainId::BeamTestnet, "pk")]).unwrap())
    }

    fn channel(host: &MockWindowHost) -> ConfirmationChannel {
        ConfirmationChannel::new(Arc::new(host.clone()), config())
    }

    fn channel_with(host: &MockWindowHost, settings: ConfirmationConfig) -> ConfirmationChannel {
        ConfirmationChannel::with_settings(Arc::new(host.clone()), config(), settings)
    }

    #[test]
    fn test_same_origin() {
        assert!(same_origin(AUTH, AUTH));
        assert!(same_origin("https://identity.beta.onbeam.com/", AUTH));
        assert!(same_origin("https://identity.beta.onbeam.com:443", AUTH));
        assert!(!same_origin("https://evil.example", AUTH));
        assert!(!same_origin("http://identity.beta.onbeam.com", AUTH));
    }

    #[tokio::test]
    async fn test_loading_opens_popup_and_generic_overlay() {
        let host = MockWindowHost::new();
        let channel = channel(&host);

        channel.loading(None).unwrap();
        channel.loading(None).unwrap();

        assert_eq!(host.popup_count(), 1);
        let popup = host.last_popup().unwrap();
        assert_eq!(popup.url(), format!("{AUTH}/loading"));
        assert_eq!(popup.request().size, PopupSize { width: 640, height: 720 });
        assert_eq!(host.overlay_kinds(), vec![OverlayKind::Generic]);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_blocked_popup_shows_blocked_overlay() {
        let host = MockWindowHost::new();
        host.block_popups(true);
        let channel = channel(&host);

        channel.loading(Some(PopupSize { width: 400, height: 500 })).unwrap();

        assert_eq!(host.popup_count(), 0);
        assert_eq!(host.overlay_kinds(), vec![OverlayKind::Blocked]);
        assert!(channel.is_open());

        host.block_popups(false);
        host.overlay_controls().unwrap().try_again();

        let popup = host.last_popup().unwrap();
        assert_eq!(popup.request().size, PopupSize { width: 400, height: 500 });
        assert_eq!(host.overlay_kinds(), vec![OverlayKind::Blocked, OverlayKind::Generic]);
        assert!(host.overlays()[0].is_removed());
    }

    #[tokio::test]
    async fn test_disabled_overlay_is_not_drawn() {
        let host = MockWindowHost::new();
        let settings = ConfirmationConfig {
            overlay: OverlayOptions {
                disable_generic: true,
                disable_blocked: false,
            },
            ..ConfirmationConfig::default()
        };
        let channel = channel_with(&host, settings);

        channel.loading(None).unwrap();

        assert_eq!(host.popup_count(), 1);
        assert!(host.overlays().is_empty());
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_handshake_without_screen_is_dismissed() {
        let host = MockWindowHost::new();
        let channel = channel(&host);

        let outcome = channel.request_session("https://x/session").await.unwrap();

        assert_eq!(outcome, Confirmation::Dismissed);
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_confirmed_tears_down() {
        let host = MockWindowHost::new();
        let channel = channel(&host);
        channel.loading(None).unwrap();

        let url = format!("{AUTH}/session/1");
        let (outcome, _) = tokio::join!(channel.request_session(&url), async {
            host.wait_for_listener().await;
            host.post_message(AUTH, MessageType::RequestSessionConfirmed, Value::Null);
        });

        assert_eq!(outcome.unwrap(), Confirmation::Confirmed(()));

        let popup = host.last_popup().unwrap();
        assert_eq!(popup.url(), url);
        assert!(popup.is_closed());
        assert!(host.overlays().iter().all(|overlay| overlay.is_removed()));
        assert_eq!(host.listener_count(), 0);
        assert!(!channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_origin_and_events_are_ignored() {
        let host = MockWindowHost::new();
        let channel = channel(&host);
        channel.loading(None).unwrap();

        let (outcome, _) = tokio::join!(channel.sign_operation("https://x/op"), async {
            host.wait_for_listener().await;
            host.post_message("https://evil.example", MessageType::SignOperationConfirmed, Value::Null);
            host.post(AUTH, json!({ "eventType": "analytics", "messageType": "sign_operation_confirmed" }));
            host.post_message(AUTH, MessageType::SignOperationRejected, Value::Null);
        });

        assert_eq!(
            outcome,
            Err(ConfirmationError::UserRejected(Flow::Operation))
        );
        assert!(host.last_popup().unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_tag_rejects() {
        let host = MockWindowHost::new();
        let channel = channel(&host);
        channel.loading(None).unwrap();

        let (outcome, _) = tokio::join!(channel.request_session("https://x/s"), async {
            host.wait_for_listener().await;
            host.post_message(AUTH, MessageType::SignOperationConfirmed, Value::Null);
        });

        assert_eq!(
            outcome,
            Err(ConfirmationError::UnsupportedMessageType("sign_operation_confirmed".into()))
        );
        assert!(!channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_popup_resolves_dismissed_on_next_tick() {
        let host = MockWindowHost::new();
        let channel = channel(&host);
        channel.loading(None).unwrap();

        let started = Instant::now();
        let (outcome, _) = tokio::join!(channel.request_session("https://x/s"), async {
            host.wait_for_listener().await;
            host.last_popup().unwrap().close_by_user();
        });

        assert_eq!(outcome.unwrap(), Confirmation::Dismissed);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(host.overlays().iter().all(|overlay| overlay.is_removed()));
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_dismiss_resolves_dismissed() {
        let host = MockWindowHost::new();
        host.block_popups(true);
        let channel = channel(&host);
        channel.loading(None).unwrap();

        let (outcome, _) = tokio::join!(channel.request_connection("https://x/c"), async {
            host.wait_for_listener().await;
            host.overlay_controls().unwrap().dismiss();
        });

        assert_eq!(outcome.unwrap(), Confirmation::Dismissed);
        assert!(!channel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let host = MockWindowHost::new();
        let settings = ConfirmationConfig {
            timeout: Some(Duration::from_secs(30)),
            ..ConfirmationConfig::default()
        };
        let channel = channel_with(&host, settings);
        channel.loading(None).unwrap();

        let outcome = channel.sign_operation("https://x/op").await;

        assert_eq!(outcome, Err(ConfirmationError::TimedOut(Duration::from_secs(30))));
        assert!(host.last_popup().unwrap().is_closed());
        assert_eq!(host.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_close_window_is_idempotent() {
        let host = MockWindowHost::new();
        let channel = channel(&host);

        channel.close_window();
        channel.loading(None).unwrap();
        channel.close_window();
        channel.close_window();

        assert!(host.last_popup().unwrap().is_closed());
        assert!(!channel.is_open());
    }
}
