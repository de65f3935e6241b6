//! Health response classification
//!
//! `GET /v1/sys/health` encodes the node's role in the status code. All of the
//! codes below carry the same `{sealed, initialized}` body and are valid
//! answers, not failures.

use super::models::InstanceStatus;
use crate::types::ProbeError;

/// Initialized, unsealed, active.
pub const ACTIVE: u16 = 200;
/// Unsealed standby.
pub const STANDBY: u16 = 429;
/// Disaster-recovery replication secondary.
pub const DR_SECONDARY: u16 = 472;
/// Performance standby.
pub const PERFORMANCE_STANDBY: u16 = 473;
/// Not initialized.
pub const NOT_INITIALIZED: u16 = 501;
/// Sealed.
pub const SEALED: u16 = 503;

pub const RECOGNIZED_CODES: [u16; 6] = [
    ACTIVE,
    STANDBY,
    DR_SECONDARY,
    PERFORMANCE_STANDBY,
    NOT_INITIALIZED,
    SEALED,
];

pub fn is_recognized(code: u16) -> bool {
    RECOGNIZED_CODES.contains(&code)
}

/// Classify a raw health response into an [`InstanceStatus`].
pub fn classify(code: u16, body: &[u8]) -> Result<InstanceStatus, ProbeError> {
    if !is_recognized(code) {
        return Err(ProbeError::UnexpectedStatus(code));
    }

    serde_json::from_slice(body).map_err(|e| ProbeError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEALED_BODY: &[u8] = br#"{"initialized":true,"sealed":true,"standby":true,"version":"1.15.2"}"#;

    #[test]
    fn test_all_recognized_codes_decode() {
        for code in RECOGNIZED_CODES {
            let status = classify(code, SEALED_BODY)
                .unwrap_or_else(|e| panic!("code {} should be accepted: {}", code, e));
            assert!(status.initialized);
            assert!(status.sealed);
        }
    }

    #[test]
    fn test_unknown_codes_rejected() {
        for code in [201, 204, 400, 404, 500, 502, 504] {
            match classify(code, SEALED_BODY) {
                Err(ProbeError::UnexpectedStatus(c)) => assert_eq!(c, code),
                other => panic!("code {} should be rejected, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_not_initialized_body() {
        let body = br#"{"initialized":false,"sealed":true}"#;
        let status = classify(NOT_INITIALIZED, body).unwrap();
        assert!(!status.initialized);
    }

    #[test]
    fn test_undecodable_body() {
        assert!(matches!(
            classify(ACTIVE, b"<html>oops</html>"),
            Err(ProbeError::Decode(_))
        ));
        assert!(matches!(
            classify(SEALED, br#"{"sealed":true}"#),
            Err(ProbeError::Decode(_))
        ));
    }
}
