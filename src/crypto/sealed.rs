// src/crypto/sealed.rs

//! Sealed-payload encryption for configuration records.
//!
//! Payloads are encrypted to an X25519 recipient: an ephemeral key agreement
//! feeds a SHA-256 derivation whose output keys ChaCha20-Poly1305. Only the
//! holder of the matching identity can open a sealed blob. Error paths are
//! deliberately uniform so that nothing about the failure leaks.

use crate::core::MillraceError;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::path::Path;
use x25519_dalek::{PublicKey, StaticSecret};

/// Leading magic of every sealed blob; bump the digit on format changes.
const MAGIC: &[u8] = b"MRS1";
const NONCE_LEN: usize = 12;
const PK_LEN: usize = 32;

/// A private X25519 identity, loaded from a single-line hex file.
#[derive(Clone)]
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

/// The public half of an identity; anyone holding it can seal payloads.
#[derive(Clone, Copy)]
pub struct Recipient(PublicKey);

impl Identity {
    /// Reads an identity from a file whose first non-empty line is the
    /// hex-encoded 32-byte secret.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MillraceError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MillraceError::Identity(format!(
                "cannot read identity file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        let line = contents
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or_else(|| MillraceError::Identity("identity file is empty".to_string()))?;
        Self::from_hex(line)
    }

    pub fn from_hex(line: &str) -> Result<Self, MillraceError> {
        let raw = hex::decode(line)
            .map_err(|_| MillraceError::Identity("identity is not valid hex".to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| MillraceError::Identity("identity must be 32 bytes".to_string()))?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Generates a fresh identity from the system RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The hex line that `load` accepts back.
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    pub fn recipient(&self) -> Recipient {
        Recipient(self.public)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("Identity")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Encrypts `plaintext` so only the holder of the recipient's identity can
/// read it. Output layout: `MRS1 | ephemeral_pk(32) | nonce(12) | ciphertext`.
pub fn seal(recipient: &Recipient, plaintext: &[u8]) -> Result<Vec<u8>, MillraceError> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient.0);

    let key = derive_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient.0.as_bytes());
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| MillraceError::Sealed)?;

    let mut out = Vec::with_capacity(MAGIC.len() + PK_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a blob produced by [`seal`]. Truncation, a magic mismatch, and an
/// authentication failure all surface as the same opaque error.
pub fn open(identity: &Identity, blob: &[u8]) -> Result<Vec<u8>, MillraceError> {
    if blob.len() < MAGIC.len() + PK_LEN + NONCE_LEN || !blob.starts_with(MAGIC) {
        return Err(MillraceError::Sealed);
    }
    let (header, ciphertext) = blob.split_at(MAGIC.len() + PK_LEN + NONCE_LEN);
    let ephemeral_pk_bytes: [u8; PK_LEN] = header[MAGIC.len()..MAGIC.len() + PK_LEN]
        .try_into()
        .map_err(|_| MillraceError::Sealed)?;
    let nonce = &header[MAGIC.len() + PK_LEN..];

    let ephemeral_pk = PublicKey::from(ephemeral_pk_bytes);
    let shared = identity.secret.diffie_hellman(&ephemeral_pk);
    let key = derive_key(
        shared.as_bytes(),
        ephemeral_pk.as_bytes(),
        identity.public.as_bytes(),
    );
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| MillraceError::Sealed)
}

/// Binds the symmetric key to both public halves of the agreement so a blob
/// sealed for one recipient cannot be replayed against another.
fn derive_key(shared: &[u8; 32], ephemeral_pk: &[u8; 32], recipient_pk: &[u8; 32]) -> [u8; 32] {
    let digest = Sha256::new()
        .chain_update(shared)
        .chain_update(ephemeral_pk)
        .chain_update(recipient_pk)
        .finalize();
    digest.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let identity = Identity::generate();
        let plaintext = b"port = 8090";
        let blob = seal(&identity.recipient(), plaintext).unwrap();
        assert!(blob.starts_with(MAGIC));
        let opened = open(&identity, &blob).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_rejects_wrong_identity() {
        let identity = Identity::generate();
        let other = Identity::generate();
        let blob = seal(&identity.recipient(), b"secret").unwrap();
        assert!(matches!(open(&other, &blob), Err(MillraceError::Sealed)));
    }

    #[test]
    fn test_open_rejects_truncated_blob() {
        let identity = Identity::generate();
        let blob = seal(&identity.recipient(), b"secret").unwrap();
        assert!(matches!(
            open(&identity, &blob[..MAGIC.len() + 10]),
            Err(MillraceError::Sealed)
        ));
    }

    #[test]
    fn test_identity_hex_round_trip() {
        let identity = Identity::generate();
        let restored = Identity::from_hex(&identity.to_hex()).unwrap();
        let blob = seal(&identity.recipient(), b"x").unwrap();
        assert_eq!(open(&restored, &blob).unwrap(), b"x");
    }
}
