//! Environment seam for popups, overlays and cross-window messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use super::channel::OverlayControls;

/// Popup dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 720,
        }
    }
}

/// What the channel asks the host to open. The host centers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub url: String,
    pub title: String,
    pub size: PopupSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// Shown alongside an open popup.
    Generic,
    /// Shown when the popup was blocked; offers "try again".
    Blocked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayOptions {
    pub disable_generic: bool,
    pub disable_blocked: bool,
}

impl OverlayOptions {
    /// Whether the host should draw an overlay of `kind`.
    pub fn allows(&self, kind: OverlayKind) -> bool {
        match kind {
            OverlayKind::Generic => !self.disable_generic,
            OverlayKind::Blocked => !self.disable_blocked,
        }
    }
}

/// The host refused to open a popup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Popup blocked: {0}")]
pub struct PopupBlocked(pub String);

/// A message posted to the embedding window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub origin: String,
    pub data: Value,
}

pub trait PopupWindow: Send + Sync {
    fn navigate(&self, url: &str);

    fn is_closed(&self) -> bool;

    fn close(&self);
}

pub trait OverlayHandle: Send + Sync {
    fn remove(&self);
}

/// Opens popups, draws overlays and delivers message events.
///
/// Hosts must not call [`OverlayControls`] synchronously from inside
/// [`WindowHost::show_overlay`]; controls are for user input arriving later.
pub trait WindowHost: Send + Sync {
    fn open_popup(&self, request: &PopupRequest) -> Result<Box<dyn PopupWindow>, PopupBlocked>;

    fn show_overlay(&self, kind: OverlayKind, controls: OverlayControls) -> Box<dyn OverlayHandle>;

    /// A fresh subscription to message events. Dropping it unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<MessageEvent>;
}
