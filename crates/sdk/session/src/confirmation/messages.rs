//! Confirmation message protocol.
//!
//! Confirmation pages post `{ eventType, messageType, payload }` objects to
//! the embedding window. Each interactive flow accepts a closed subset of
//! message types; anything else is rejected as unsupported.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{ConfirmationError, Flow};

pub const BEAM_EVENT_TYPE: &str = "beam_confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    RequestConnectionConfirmed,
    RequestMessageSignatureConfirmed,
    RequestMessageSignatureError,
    RequestMessageSignatureRejected,
    RequestSessionConfirmed,
    RequestSessionError,
    RequestSessionRejected,
    SignOperationConfirmed,
    SignOperationError,
    SignOperationRejected,
}

/// Wire envelope of a confirmation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl ConfirmationEnvelope {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self {
            event_type: BEAM_EVENT_TYPE.to_string(),
            message_type: message_type.to_string(),
            payload,
        }
    }

    /// Decode `data` if it is a confirmation envelope; unrelated messages yield `None`.
    pub fn from_data(data: &Value) -> Option<Self> {
        let envelope: Self = serde_json::from_value(data.clone()).ok()?;
        (envelope.event_type == BEAM_EVENT_TYPE).then_some(envelope)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn message_type(&self) -> Result<MessageType, ConfirmationError> {
        MessageType::from_str(&self.message_type)
            .map_err(|_| ConfirmationError::UnsupportedMessageType(self.message_type.clone()))
    }
}

/// Outcome of an interactive confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation<T> {
    Confirmed(T),
    /// The user closed the popup or dismissed the overlay before any message.
    Dismissed,
}

impl<T> Confirmation<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed(_))
    }

    pub fn confirmed(self) -> Option<T> {
        match self {
            Confirmation::Confirmed(value) => Some(value),
            Confirmation::Dismissed => None,
        }
    }
}

/// Result of a connection or message-signature flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub address: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub owner_address: Option<String>,
}

/// A flow's closed set of messages.
pub trait FlowMessage: Sized {
    const FLOW: Flow;
    type Output;

    /// Map a message type into this flow, rejecting foreign tags.
    fn parse(message_type: MessageType, payload: Value) -> Result<Self, ConfirmationError>;

    fn resolve(self) -> Result<Self::Output, ConfirmationError>;
}

/// Decode and resolve an envelope for flow `M`.
pub fn interpret<M: FlowMessage>(
    envelope: &ConfirmationEnvelope,
) -> Result<M::Output, ConfirmationError> {
    let message_type = envelope.message_type()?;
    M::parse(message_type, envelope.payload.clone())?.resolve()
}

fn unsupported(message_type: MessageType) -> ConfirmationError {
    ConfirmationError::UnsupportedMessageType(message_type.to_string())
}

fn payload<T: serde::de::DeserializeOwned>(
    message_type: MessageType,
    payload: Value,
) -> Result<T, ConfirmationError> {
    serde_json::from_value(payload).map_err(|e| ConfirmationError::MalformedPayload {
        message_type: message_type.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Connection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    Confirmed { address: String },
    SignatureConfirmed(ConnectionResult),
    SignatureError,
    SignatureRejected,
}

#[derive(Deserialize)]
struct AddressPayload {
    address: String,
}

impl FlowMessage for ConnectionMessage {
    const FLOW: Flow = Flow::Connection;
    type Output = ConnectionResult;

    fn parse(message_type: MessageType, body: Value) -> Result<Self, ConfirmationError> {
        match message_type {
            MessageType::RequestConnectionConfirmed => {
                let AddressPayload { address } = payload(message_type, body)?;
                Ok(ConnectionMessage::Confirmed { address })
            }
            MessageType::RequestMessageSignatureConfirmed => {
                payload(message_type, body).map(ConnectionMessage::SignatureConfirmed)
            }
            MessageType::RequestMessageSignatureError => Ok(ConnectionMessage::SignatureError),
            MessageType::RequestMessageSignatureRejected => {
                Ok(ConnectionMessage::SignatureRejected)
            }
            other => Err(unsupported(other)),
        }
    }

    fn resolve(self) -> Result<ConnectionResult, ConfirmationError> {
        match self {
            ConnectionMessage::Confirmed { address } => Ok(ConnectionResult {
                address,
                signature: None,
                owner_address: None,
            }),
            ConnectionMessage::SignatureConfirmed(result) => Ok(result),
            ConnectionMessage::SignatureError => Err(ConfirmationError::Remote(Self::FLOW)),
            ConnectionMessage::SignatureRejected => {
                Err(ConfirmationError::UserRejected(Self::FLOW))
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMessage {
    Confirmed,
    Error,
    Rejected,
}

impl FlowMessage for SessionMessage {
    const FLOW: Flow = Flow::Session;
    type Output = ();

    fn parse(message_type: MessageType, _payload: Value) -> Result<Self, ConfirmationError> {
        match message_type {
            MessageType::RequestSessionConfirmed => Ok(SessionMessage::Confirmed),
            MessageType::RequestSessionError => Ok(SessionMessage::Error),
            MessageType::RequestSessionRejected => Ok(SessionMessage::Rejected),
            other => Err(unsupported(other)),
        }
    }

    fn resolve(self) -> Result<(), ConfirmationError> {
        match self {
            SessionMessage::Confirmed => Ok(()),
            SessionMessage::Error => Err(ConfirmationError::Remote(Self::FLOW)),
            SessionMessage::Rejected => Err(ConfirmationError::UserRejected(Self::FLOW)),
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMessage {
    Confirmed,
    Error,
    Rejected,
}

impl FlowMessage for OperationMessage {
    const FLOW: Flow = Flow::Operation;
    type Output = ();

    fn parse(message_type: MessageType, _payload: Value) -> Result<Self, ConfirmationError> {
        match message_type {
            MessageType::SignOperationConfirmed => Ok(OperationMessage::Confirmed),
            MessageType::SignOperationError => Ok(OperationMessage::Error),
            MessageType::SignOperationRejected => Ok(OperationMessage::Rejected),
            other => Err(unsupported(other)),
        }
    }

    fn resolve(self) -> Result<(), ConfirmationError> {
        match self {
            OperationMessage::Confirmed => Ok(()),
            OperationMessage::Error => Err(ConfirmationError::Remote(Self::FLOW)),
            OperationMessage::Rejected => Err(ConfirmationError::UserRejected(Self::FLOW)),
        }
    }
}
