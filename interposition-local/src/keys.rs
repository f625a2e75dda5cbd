//! Ed25519 keys for signing and verifying mirror metadata.

use ed25519_dalek::{
    Signature, Signer, SigningKey as DalekSigningKey, Verifier, VerifyingKey as DalekVerifyingKey,
};
use sha2::{Digest, Sha256};

use crate::error::MetadataError;

/// A private key for signing targets metadata.
///
/// # Example
///
/// ```
/// use interposition_local::SigningKey;
///
/// let signing_key = SigningKey::generate();
/// let key_id = signing_key.verifying_key().key_id();
/// assert_eq!(key_id.len(), 64);
/// ```
#[derive(Clone)]
pub struct SigningKey {
    inner: DalekSigningKey,
}

impl SigningKey {
    /// Creates a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: DalekSigningKey::generate(&mut rng),
        }
    }

    /// Creates a signing key from its 32-byte seed.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: DalekSigningKey::from_bytes(bytes),
        }
    }

    /// Returns the 32-byte seed.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Returns the public half.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Signs `message` and returns the signature as lowercase hex.
    #[must_use]
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.inner.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// A public key trusted to sign targets metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: DalekVerifyingKey,
}

impl VerifyingKey {
    /// Creates a verifying key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::InvalidKeyFormat` if the bytes are not a
    /// valid curve point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, MetadataError> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|e| MetadataError::InvalidKeyFormat {
                reason: e.to_string(),
            })
    }

    /// Decodes a verifying key from 64 hex digits.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::InvalidKeyFormat` for bad hex, a wrong
    /// length, or an invalid curve point.
    pub fn from_hex(s: &str) -> Result<Self, MetadataError> {
        let bytes: [u8; 32] = hex::decode(s)
            .map_err(|e| MetadataError::InvalidKeyFormat {
                reason: e.to_string(),
            })?
            .try_into()
            .map_err(|v: Vec<u8>| MetadataError::InvalidKeyFormat {
                reason: format!("expected 32 bytes, got {}", v.len()),
            })?;
        Self::from_bytes(&bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Returns the key as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Returns the key id: SHA-256 of the raw public key, as hex.
    #[must_use]
    pub fn key_id(&self) -> String {
        hex::encode(Sha256::digest(self.to_bytes()))
    }

    /// Returns true if `signature_hex` is this key's signature over `message`.
    #[must_use]
    pub fn verifies(&self, message: &[u8], signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.inner.verify(message, &signature).is_ok()
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes();
        write!(
            f,
            "VerifyingKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}
