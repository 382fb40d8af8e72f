//! Wire types exchanged with the Beam player and connection services.
//!
//! All types serialize with camelCase field names to match the remote JSON
//! contract.

use std::fmt;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Chains
// ============================================================================

/// Chains the SDK knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum ChainId {
    BeamMainnet,
    BeamTestnet,
    SophonMainnet,
    SophonTestnet,
}

impl ChainId {
    pub const ALL: [ChainId; 4] = [
        ChainId::BeamMainnet,
        ChainId::BeamTestnet,
        ChainId::SophonMainnet,
        ChainId::SophonTestnet,
    ];

    /// Numeric EIP-155 chain id.
    pub const fn id(self) -> u64 {
        match self {
            ChainId::BeamMainnet => 4337,
            ChainId::BeamTestnet => 13337,
            ChainId::SophonMainnet => 50104,
            ChainId::SophonTestnet => 531050104,
        }
    }

    /// Human-readable chain name.
    pub const fn name(self) -> &'static str {
        match self {
            ChainId::BeamMainnet => "Beam",
            ChainId::BeamTestnet => "Beam Testnet",
            ChainId::SophonMainnet => "Sophon",
            ChainId::SophonTestnet => "Sophon Testnet",
        }
    }

    pub const fn is_testnet(self) -> bool {
        matches!(self, ChainId::BeamTestnet | ChainId::SophonTestnet)
    }
}

/// Raised when a numeric chain id has no [`ChainId`] counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain id {0}")]
pub struct UnknownChainId(pub u64);

impl TryFrom<u64> for ChainId {
    type Error = UnknownChainId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        ChainId::ALL
            .into_iter()
            .find(|chain| chain.id() == value)
            .ok_or(UnknownChainId(value))
    }
}

impl From<ChainId> for u64 {
    fn from(chain: ChainId) -> Self {
        chain.id()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// Identity provider hint forwarded to every request-creating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthProvider {
    #[default]
    Any,
    Google,
    Discord,
    Apple,
}

// ============================================================================
// Sessions
// ============================================================================

/// Server-issued, time-bounded delegation of signing authority to a local key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,

    pub is_active: bool,

    /// Address derived from the local signing key this session delegates to.
    pub session_address: String,

    #[serde(default, with = "timestamp")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Serde adapter for session bounds.
///
/// The service has sent RFC 3339 strings, epoch milliseconds, and epoch
/// milliseconds encoded as strings; all three are accepted. Values are always
/// written back as RFC 3339.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_some(&time.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<RawTimestamp>::deserialize(deserializer)? else {
            return Ok(None);
        };

        match raw {
            RawTimestamp::Millis(millis) => from_millis(millis).map(Some),
            RawTimestamp::Text(text) if text.trim().is_empty() => Ok(None),
            RawTimestamp::Text(text) => match text.trim().parse::<i64>() {
                Ok(millis) => from_millis(millis).map(Some),
                Err(_) => DateTime::parse_from_rfc3339(text.trim())
                    .map(|time| Some(time.with_timezone(&Utc)))
                    .map_err(D::Error::custom),
            },
        }
    }

    fn from_millis<E: serde::de::Error>(millis: i64) -> Result<DateTime<Utc>, E> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| E::custom(format!("timestamp out of range: {millis}")))
    }
}

/// Body of `createSessionRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSessionRequest {
    pub chain_id: u64,
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

/// Body of `revokeSession`.
pub type RevokeSessionRequest = GenerateSessionRequest;

/// Any server response that hands back a confirmation URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUrlResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

// ============================================================================
// Operations
// ============================================================================

/// Lifecycle status of a server-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Signed,
    Processing,
    Executed,
    Rejected,
    Failed,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    /// Statuses that count as accepted after submitting local signatures.
    pub const fn is_accepted_after_signing(self) -> bool {
        matches!(
            self,
            OperationStatus::Executed | OperationStatus::Signed | OperationStatus::Pending
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationStatus::Pending => "Pending",
            OperationStatus::Signed => "Signed",
            OperationStatus::Processing => "Processing",
            OperationStatus::Executed => "Executed",
            OperationStatus::Rejected => "Rejected",
            OperationStatus::Failed => "Failed",
            OperationStatus::Expired => "Expired",
            OperationStatus::Cancelled => "Cancelled",
            OperationStatus::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Unit of one or more blockchain actions awaiting signature and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOperation {
    pub id: String,

    pub status: OperationStatus,

    /// Confirmation page for interactive signing.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub actions: Vec<OperationAction>,

    #[serde(default)]
    pub transactions: Vec<OperationTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationAction {
    pub id: String,

    /// `None` when the action needs no signature.
    #[serde(default)]
    pub signature: Option<SignatureRequest>,
}

/// What the server wants signed, and the signature once it exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    /// 32-byte digest, `0x`-prefixed hex.
    pub hash: String,

    #[serde(default)]
    pub signature: Option<String>,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, rename = "type")]
    pub kind: Option<SignatureKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationTransaction {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureKind {
    Message,
    TypedData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmOperationStatus {
    Pending,
    Rejected,
}

/// Body of `processOperation`: one signature per signed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOperationRequest {
    pub status: ConfirmOperationStatus,
    pub actions: Vec<ConfirmOperationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOperationAction {
    pub id: String,
    pub signature: String,
}

// ============================================================================
// Connection API payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    pub entity_id: String,
    pub chain_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

/// Request for a page that asks the owner wallet to sign `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSignatureRequest {
    pub chain_id: u64,
    /// EIP-191 hash of the message, `0x`-prefixed hex.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOwnershipRequest {
    pub account_address: String,
    pub owner_address: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationRequest {
    pub account_address: String,
    pub chain_id: u64,
    pub actions: Vec<OperationActionInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationActionInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub signature: SignatureInput,
}

impl OperationActionInput {
    /// A `Sign` action; strings are signed as messages, anything else as typed data.
    pub fn sign(data: Value) -> Self {
        let kind = if data.is_string() {
            SignatureKind::Message
        } else {
            SignatureKind::TypedData
        };

        Self {
            kind: "Sign".to_string(),
            signature: SignatureInput { data, kind },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInput {
    pub data: Value,
    #[serde(rename = "type")]
    pub kind: SignatureKind,
}

/// One call inside a transaction operation, as received from `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInteraction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub account_address: String,
    pub chain_id: u64,
    pub sponsor: bool,
    pub interactions: Vec<TransactionInteraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<AuthProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_chain_id_round_trip() {
        for chain in ChainId::ALL {
            assert_eq!(ChainId::try_from(chain.id()), Ok(chain));
        }
        assert_eq!(ChainId::try_from(1), Err(UnknownChainId(1)));
        assert_eq!(serde_json::to_value(ChainId::BeamTestnet).unwrap(), json!(13337));
    }

    #[test]
    fn test_session_accepts_all_timestamp_encodings() {
        let expected = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        for encoded in [
            json!(1_700_000_000_000i64),
            json!("1700000000000"),
            json!("2023-11-14T22:13:20Z"),
        ] {
            let session: Session = serde_json::from_value(json!({
                "id": "s-1",
                "isActive": true,
                "sessionAddress": "0xabc",
                "startTime": encoded,
            }))
            .unwrap();

            assert_eq!(session.start_time, Some(expected));
            assert_eq!(session.end_time, None);
        }
    }

    #[test]
    fn test_session_null_bounds() {
        let session: Session = serde_json::from_value(json!({
            "id": "s-1",
            "isActive": false,
            "sessionAddress": "0xabc",
            "startTime": null,
            "endTime": "",
        }))
        .unwrap();

        assert_eq!(session.start_time, None);
        assert_eq!(session.end_time, None);
    }

    #[test]
    fn test_unknown_operation_status() {
        let operation: PlayerOperation = serde_json::from_value(json!({
            "id": "op-1",
            "status": "SomethingNew",
        }))
        .unwrap();

        assert_eq!(operation.status, OperationStatus::Unknown);
        assert!(operation.actions.is_empty());
        assert!(!OperationStatus::Failed.is_accepted_after_signing());
        assert!(OperationStatus::Signed.is_accepted_after_signing());
    }

    #[test]
    fn test_sign_action_kind_follows_data() {
        assert_eq!(
            OperationActionInput::sign(json!("hello")).signature.kind,
            SignatureKind::Message
        );
        assert_eq!(
            OperationActionInput::sign(json!({ "types": {} })).signature.kind,
            SignatureKind::TypedData
        );
    }
}
