//! Send/receive pipeline combining encryption, compression and signing.

use super::compression::{gunzip, gzip};
use super::crypto::{PayloadDecryptor, PayloadEncryptor};
use super::signing::Signer;
use crate::error::Result;
use std::path::Path;

/// A payload ready for the wire.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Exact bytes to transmit.
    pub body: Vec<u8>,
    /// Signature over `body`, if signing is enabled.
    pub signature: Option<String>,
    /// Whether `body` is gzip-compressed.
    pub compressed: bool,
}

/// Security envelope shared by agent and server.
///
/// The agent holds the public key, the server holds the private key; either
/// side may have neither, in which case payloads travel in the clear.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    signer: Signer,
    encryptor: Option<PayloadEncryptor>,
    decryptor: Option<PayloadDecryptor>,
}

impl Envelope {
    pub fn new(
        signer: Signer,
        encryptor: Option<PayloadEncryptor>,
        decryptor: Option<PayloadDecryptor>,
    ) -> Self {
        Self { signer, encryptor, decryptor }
    }

    /// Build from configuration values. An empty secret disables signing.
    pub fn from_config(
        secret: &str,
        public_key: Option<&Path>,
        private_key: Option<&Path>,
    ) -> Result<Self> {
        let encryptor = public_key.map(PayloadEncryptor::from_pem_file).transpose()?;
        let decryptor = private_key.map(PayloadDecryptor::from_pem_file).transpose()?;
        Ok(Self::new(Signer::new(Some(secret)), encryptor, decryptor))
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }

    pub fn decrypts(&self) -> bool {
        self.decryptor.is_some()
    }

    /// Encrypt with the configured public key, or pass through.
    pub fn encrypt(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(&payload),
            None => Ok(payload),
        }
    }

    /// Decrypt with the configured private key, or pass through.
    pub fn decrypt(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        match &self.decryptor {
            Some(decryptor) => decryptor.decrypt(&payload),
            None => Ok(payload),
        }
    }

    /// encrypt → compress → sign.
    pub fn seal(&self, payload: Vec<u8>, compress: bool) -> Result<Sealed> {
        let encrypted = self.encrypt(payload)?;
        let body = if compress { gzip(&encrypted)? } else { encrypted };
        let signature = self.signer.sign(&body);
        Ok(Sealed { body, signature, compressed: compress })
    }

    /// Integrity step of [`open`](Self::open), usable on its own by middleware.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        self.signer.verify(body, signature)
    }

    /// decompress → decrypt, for a body whose signature was already checked.
    pub fn unwrap_verified(&self, body: &[u8], compressed: bool) -> Result<Vec<u8>> {
        let inflated = if compressed { gunzip(body)? } else { body.to_vec() };
        self.decrypt(inflated)
    }

    /// verify → decompress → decrypt.
    pub fn open(&self, body: &[u8], signature: Option<&str>, compressed: bool) -> Result<Vec<u8>> {
        self.verify(body, signature)?;
        self.unwrap_verified(body, compressed)
    }
}
