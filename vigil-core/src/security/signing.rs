//! HMAC-SHA256 request and response signing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, VigilError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 signature.
pub const HASH_HEADER: &str = "HashSHA256";

/// RPC metadata key carrying the signature; metadata keys are lowercase.
pub const HASH_METADATA: &str = "hashsha256";

/// Signs and verifies bodies with a shared secret.
///
/// Without a secret both operations are no-ops, so signing stays opt-in and
/// symmetric between agent and server.
#[derive(Clone, Default)]
pub struct Signer {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("enabled", &self.is_enabled()).finish()
    }
}

impl Signer {
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec());
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Base64 HMAC-SHA256 of `body`, or `None` when no secret is configured.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = mac_for(secret);
        mac.update(body);
        Some(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Check `signature` against `body` in constant time.
    ///
    /// A configured secret with no signature is a failure.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        let Some(secret) = self.secret.as_ref() else {
            return Ok(());
        };
        let signature = signature.filter(|s| !s.is_empty()).ok_or(VigilError::MissingSignature)?;
        let expected = STANDARD.decode(signature).map_err(|_| VigilError::SignatureMismatch)?;

        let mut mac = mac_for(secret);
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| VigilError::SignatureMismatch)
    }
}

fn mac_for(secret: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts keys of any length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_signer_skips_everything() {
        let signer = Signer::new(None);
        assert!(signer.sign(b"body").is_none());
        assert!(signer.verify(b"body", None).is_ok());
        assert!(!Signer::new(Some("")).is_enabled());
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = Signer::new(Some("secret"));
        let sig = signer.sign(b"payload").unwrap();
        assert!(signer.verify(b"payload", Some(&sig)).is_ok());
    }

    #[test]
    fn test_single_byte_flip_is_rejected() {
        let signer = Signer::new(Some("secret"));
        let body = b"[{\"id\":\"CPU\",\"type\":\"gauge\",\"value\":0.42}]".to_vec();
        let sig = signer.sign(&body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(
                matches!(signer.verify(&tampered, Some(&sig)), Err(VigilError::SignatureMismatch)),
                "flip at byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let sig = Signer::new(Some("one")).sign(b"payload").unwrap();
        let err = Signer::new(Some("two")).verify(b"payload", Some(&sig)).unwrap_err();
        assert!(matches!(err, VigilError::SignatureMismatch));
    }

    #[test]
    fn test_missing_or_garbled_signature() {
        let signer = Signer::new(Some("secret"));
        assert!(matches!(signer.verify(b"x", None), Err(VigilError::MissingSignature)));
        assert!(matches!(signer.verify(b"x", Some("")), Err(VigilError::MissingSignature)));
        assert!(matches!(
            signer.verify(b"x", Some("not base64!!")),
            Err(VigilError::SignatureMismatch)
        ));
    }
}
