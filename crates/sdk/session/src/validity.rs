//! Session validity and ownership checks.

use alloy_primitives::{Address, Signature, eip191_hash_message};
use beam_core::Session;
use chrono::{DateTime, Utc};

use crate::error::{Result, SessionError};
use crate::keys::SigningKey;

/// Active, and `now` within `[start_time, end_time]`. A missing bound is invalid.
pub fn is_session_valid_at(session: &Session, now: DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) = (session.start_time, session.end_time) else {
        return false;
    };
    session.is_active && start <= now && now <= end
}

pub fn is_session_valid(session: &Session) -> bool {
    is_session_valid_at(session, Utc::now())
}

/// The session delegates to `address` (case-insensitive hex comparison).
pub fn is_session_owned_by(session: &Session, address: &Address) -> bool {
    session
        .session_address
        .trim()
        .eq_ignore_ascii_case(&address.to_string())
}

/// Valid now and owned by `key`.
pub fn is_session_usable(session: &Session, key: &SigningKey) -> bool {
    is_session_valid(session) && is_session_owned_by(session, &key.address())
}

/// EIP-191 digest of `message`, as `0x` hex.
pub fn hash_message(message: &str) -> String {
    eip191_hash_message(message.as_bytes()).to_string()
}

/// Check that `signature` over the EIP-191 `message` recovers to `expected`.
pub fn verify_message_signature(message: &str, signature: &str, expected: &str) -> Result<()> {
    let expected: Address = expected
        .trim()
        .parse()
        .map_err(|e| SessionError::Validation(format!("invalid owner address {expected}: {e}")))?;
    let signature: Signature = signature
        .trim()
        .parse()
        .map_err(|e| SessionError::Validation(format!("invalid signature: {e}")))?;

    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| SessionError::Validation(format!("unrecoverable signature: {e}")))?;

    if recovered != expected {
        return Err(SessionError::Validation(
            "Failed to verify signature".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use chrono::Duration;

    fn session(address: &str, active: bool, start: i64, end: i64) -> Session {
        let now = Utc::now();
        Session {
            id: "s".into(),
            is_active: active,
            session_address: address.into(),
            start_time: Some(now + Duration::minutes(start)),
            end_time: Some(now + Duration::minutes(end)),
        }
    }

    #[test]
    fn test_validity_window() {
        let address = "0x00000000000000000000000000000000000000aa";
        assert!(is_session_valid(&session(address, true, -5, 5)));
        assert!(!is_session_valid(&session(address, false, -5, 5)));
        assert!(!is_session_valid(&session(address, true, 5, 10)));
        assert!(!is_session_valid(&session(address, true, -10, -5)));
    }

    #[test]
    fn test_validity_bounds_are_inclusive() {
        let now = Utc::now();
        let session = Session {
            id: "s".into(),
            is_active: true,
            session_address: String::new(),
            start_time: Some(now),
            end_time: Some(now),
        };
        assert!(is_session_valid_at(&session, now));
    }

    #[test]
    fn test_missing_bound_is_invalid() {
        let mut s = session("0x00000000000000000000000000000000000000aa", true, -5, 5);
        s.end_time = None;
        assert!(!is_session_valid(&s));
    }

    #[test]
    fn test_ownership_is_case_insensitive() {
        let key = SigningKey::random();
        let checksummed = key.address().to_string();

        let lower = session(&checksummed.to_lowercase(), true, -5, 5);
        let upper = session(&format!("0x{}", checksummed[2..].to_uppercase()), true, -5, 5);

        assert!(is_session_owned_by(&lower, &key.address()));
        assert!(is_session_owned_by(&upper, &key.address()));
        assert!(is_session_usable(&lower, &key));
        assert!(!is_session_owned_by(&lower, &SigningKey::random().address()));
    }

    #[test]
    fn test_verify_message_signature() {
        let signer = PrivateKeySigner::random();
        let message = "Connect to Beam SDK";
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        let signature = format!("0x{}", hex::encode(signature.as_bytes()));

        verify_message_signature(message, &signature, &signer.address().to_string()).unwrap();

        let other = PrivateKeySigner::random().address().to_string();
        assert!(matches!(
            verify_message_signature(message, &signature, &other),
            Err(SessionError::Validation(_))
        ));
        assert!(verify_message_signature("other", &signature, &signer.address().to_string()).is_err());
    }

    #[test]
    fn test_hash_message_is_eip191() {
        assert_eq!(
            hash_message("hello world"),
            "0xd9eba16ed0ecae432b71fe008c98cc872bb4cc214d3220a36f365326cf807d68"
        );
    }
}
