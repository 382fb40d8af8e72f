//! EIP-6963 provider discovery metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BEAM_PROVIDER_NAME: &str = "Beam";
pub const BEAM_PROVIDER_RDNS: &str = "com.onbeam.sdk";

/// Square Beam mark as an SVG data URI.
pub const BEAM_PROVIDER_ICON: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCA5NiA5NiI+PHJlY3Qgd2lkdGg9Ijk2IiBoZWlnaHQ9Ijk2IiByeD0iMTgiIGZpbGw9IiMwMDAiLz48cGF0aCBkPSJNMjggMjRoMjZhMTQgMTQgMCAwIDEgNiAyNi42QTE0IDE0IDAgMCAxIDU0IDcySDI4eiIgZmlsbD0iI2ZmZiIvPjwvc3ZnPg==";

/// Announced to dapps so the wallet can be picked without `window.ethereum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

impl ProviderInfo {
    /// Beam metadata with a fresh per-instance uuid.
    pub fn beam() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            name: BEAM_PROVIDER_NAME.to_string(),
            icon: BEAM_PROVIDER_ICON.to_string(),
            rdns: BEAM_PROVIDER_RDNS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_instance_gets_its_own_uuid() {
        let a = ProviderInfo::beam();
        let b = ProviderInfo::beam();

        assert_ne!(a.uuid, b.uuid);
        assert!(Uuid::parse_str(&a.uuid).is_ok());
        assert_eq!(a.rdns, "com.onbeam.sdk");
        assert!(a.icon.starts_with("data:image/svg+xml"));
    }
}
