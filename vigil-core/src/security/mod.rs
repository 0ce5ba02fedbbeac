//! Security envelope for metric payloads.
//!
//! Wraps a serialized payload for transport and unwraps it on receipt:
//! - HMAC-SHA256 signing of the exact bytes placed on the wire
//! - Optional RSA PKCS#1 v1.5 payload encryption
//! - Gzip compression of HTTP bodies
//!
//! The order is fixed. On send: encrypt → compress → sign.
//! On receive: verify → decompress → decrypt.
//!
//! # Example
//!
//! ```no_run
//! use vigil_core::security::{Envelope, Signer};
//!
//! let envelope = Envelope::new(Signer::new(Some("secret")), None, None);
//! let sealed = envelope.seal(br#"[{"id":"CPU","type":"gauge","value":0.5}]"#.to_vec(), true)?;
//! let opened = envelope.open(&sealed.body, sealed.signature.as_deref(), true)?;
//! # Ok::<(), vigil_core::VigilError>(())
//! ```

mod compression;
mod crypto;
mod envelope;
mod signing;

pub use compression::{gunzip, gunzip_bounded, gzip, MAX_DECOMPRESSED_BYTES};
pub use crypto::{PayloadDecryptor, PayloadEncryptor};
pub use envelope::{Envelope, Sealed};
pub use signing::{Signer, HASH_HEADER, HASH_METADATA};
