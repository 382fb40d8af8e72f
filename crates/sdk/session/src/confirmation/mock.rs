//! Scriptable window host for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;

use super::channel::OverlayControls;
use super::messages::{ConfirmationEnvelope, MessageType};
use super::window::{
    MessageEvent, OverlayHandle, OverlayKind, PopupBlocked, PopupRequest, PopupWindow, WindowHost,
};

/// A popup opened through [`MockWindowHost`].
#[derive(Debug)]
pub struct MockPopup {
    request: PopupRequest,
    url: Mutex<String>,
    closed: AtomicBool,
}

impl MockPopup {
    pub fn request(&self) -> &PopupRequest {
        &self.request
    }

    /// URL after the last navigation.
    pub fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the user closing the popup.
    pub fn close_by_user(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct PopupHandle(Arc<MockPopup>);

impl PopupWindow for PopupHandle {
    fn navigate(&self, url: &str) {
        *self.0.url.lock().unwrap() = url.to_string();
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// An overlay drawn through [`MockWindowHost`].
#[derive(Debug)]
pub struct MockOverlay {
    kind: OverlayKind,
    removed: AtomicBool,
}

impl MockOverlay {
    pub fn kind(&self) -> OverlayKind {
        self.kind
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

struct OverlayHandleImpl(Arc<MockOverlay>);

impl OverlayHandle for OverlayHandleImpl {
    fn remove(&self) {
        self.0.removed.store(true, Ordering::SeqCst);
    }
}

struct HostState {
    popups: Vec<Arc<MockPopup>>,
    overlays: Vec<Arc<MockOverlay>>,
    controls: Option<OverlayControls>,
    block_popups: bool,
}

/// Records every popup and overlay and lets a test post message events.
///
/// Cloning shares state.
#[derive(Clone)]
pub struct MockWindowHost {
    sender: broadcast::Sender<MessageEvent>,
    state: Arc<Mutex<HostState>>,
}

impl MockWindowHost {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            state: Arc::new(Mutex::new(HostState {
                popups: Vec::new(),
                overlays: Vec::new(),
                controls: None,
                block_popups: false,
            })),
        }
    }

    /// Refuse (or allow again) subsequent popups.
    pub fn block_popups(&self, blocked: bool) {
        self.state.lock().unwrap().block_popups = blocked;
    }

    pub fn popups(&self) -> Vec<Arc<MockPopup>> {
        self.state.lock().unwrap().popups.clone()
    }

    pub fn popup_count(&self) -> usize {
        self.state.lock().unwrap().popups.len()
    }

    pub fn last_popup(&self) -> Option<Arc<MockPopup>> {
        self.state.lock().unwrap().popups.last().cloned()
    }

    pub fn overlays(&self) -> Vec<Arc<MockOverlay>> {
        self.state.lock().unwrap().overlays.clone()
    }

    pub fn overlay_kinds(&self) -> Vec<OverlayKind> {
        self.overlays().iter().map(|overlay| overlay.kind()).collect()
    }

    /// Controls of the most recently drawn overlay.
    pub fn overlay_controls(&self) -> Option<OverlayControls> {
        self.state.lock().unwrap().controls.clone()
    }

    /// Active message subscriptions.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Yield until a handshake is listening.
    pub async fn wait_for_listener(&self) {
        while self.listener_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Post raw message data from `origin`.
    pub fn post(&self, origin: &str, data: Value) {
        let _ = self.sender.send(MessageEvent {
            origin: origin.to_string(),
            data,
        });
    }

    /// Post a confirmation message from `origin`.
    pub fn post_message(&self, origin: &str, message_type: MessageType, payload: Value) {
        self.post(origin, ConfirmationEnvelope::new(message_type, payload).to_value());
    }
}

impl Default for MockWindowHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for MockWindowHost {
    fn open_popup(&self, request: &PopupRequest) -> Result<Box<dyn PopupWindow>, PopupBlocked> {
        let mut state = self.state.lock().unwrap();
        if state.block_popups {
            return Err(PopupBlocked(request.url.clone()));
        }

        let popup = Arc::new(MockPopup {
            request: request.clone(),
            url: Mutex::new(request.url.clone()),
            closed: AtomicBool::new(false),
        });
        state.popups.push(Arc::clone(&popup));

        Ok(Box::new(PopupHandle(popup)))
    }

    fn show_overlay(&self, kind: OverlayKind, controls: OverlayControls) -> Box<dyn OverlayHandle> {
        let overlay = Arc::new(MockOverlay {
            kind,
            removed: AtomicBool::new(false),
        });

        let mut state = self.state.lock().unwrap();
        state.overlays.push(Arc::clone(&overlay));
        state.controls = Some(controls);

        Box::new(OverlayHandleImpl(overlay))
    }

    fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.sender.subscribe()
    }
}
