//! Interactive confirmation through a popup window.
//!
//! The channel pre-opens a popup (or a "popup blocked" overlay), navigates it
//! to a confirmation page, and waits for the page to post a result back. The
//! environment is abstracted by [`WindowHost`], so the same handshake drives
//! a browser bridge, a terminal, or a test double.

mod channel;
mod messages;
mod window;

#[cfg(any(test, feature = "mock"))]
mod mock;

pub use channel::{ConfirmationChannel, OverlayControls};
pub use messages::{
    BEAM_EVENT_TYPE, Confirmation, ConfirmationEnvelope, ConnectionMessage, ConnectionResult,
    FlowMessage, MessageType, OperationMessage, SessionMessage, interpret,
};
pub use window::{
    MessageEvent, OverlayHandle, OverlayKind, OverlayOptions, PopupBlocked, PopupRequest,
    PopupSize, PopupWindow, WindowHost,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockOverlay, MockPopup, MockWindowHost};
