//! The secret vault: authenticated encryption of player secrets.
//!
//! Each player may submit one secret string per room; the vault seals it
//! under a process-wide key and the sealed form is all the room ever
//! stores. The plaintext resurfaces exactly once — decrypted for the
//! winner when a game ends — and is never broadcast.
//!
//! The vault holds no room knowledge: it maps strings to sealed bundles
//! and back, nothing more.
//!
//! # Key lifecycle
//!
//! The key comes from the `PARLOR_MASTER_KEY` environment variable
//! (base64 or raw bytes, padded/truncated to 32). When unset, a fresh
//! random key is generated at startup, which makes sealed secrets
//! unrecoverable across restarts — an operational caveat, not a defect,
//! since rooms themselves don't survive a restart either.

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Environment variable holding the process-wide sealing key.
pub const MASTER_KEY_ENV: &str = "PARLOR_MASTER_KEY";

const NONCE_LEN: usize = 12;

/// Errors from sealing or opening secrets.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Encryption failed.
    #[error("seal failed")]
    Seal,

    /// The ciphertext or its authentication tag was rejected. Either the
    /// bundle was tampered with or it was sealed under a different key.
    #[error("open failed: ciphertext rejected")]
    Open,

    /// The decrypted bytes were not valid UTF-8.
    #[error("opened secret is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// An encrypted secret as stored by a room.
///
/// Opaque to everything but the vault. The `version` field allows the
/// bundle format to evolve without breaking stored secrets mid-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub version: u8,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Seals and opens player secrets with ChaCha20-Poly1305.
pub struct SecretVault {
    cipher: ChaCha20Poly1305,
}

impl SecretVault {
    /// Creates a vault with an explicit 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Creates a vault with a fresh random key.
    pub fn with_random_key() -> Self {
        let key: [u8; 32] = rand::rng().random();
        Self::new(&key)
    }

    /// Creates a vault from [`MASTER_KEY_ENV`], falling back to a random
    /// key (with a warning) when the variable is unset.
    pub fn from_env() -> Self {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(raw) => Self::new(&derive_key(&raw)),
            Err(_) => {
                tracing::warn!(
                    env = MASTER_KEY_ENV,
                    "master key not set; using a random key — sealed \
                     secrets will not survive a restart"
                );
                Self::with_random_key()
            }
        }
    }

    /// Seals a plaintext secret under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::Seal)?;
        Ok(SealedSecret {
            version: 1,
            nonce,
            ciphertext,
        })
    }

    /// Opens a sealed secret, authenticating it in the process.
    ///
    /// Fails closed: any tampering, truncation, or key mismatch yields
    /// [`VaultError::Open`] rather than partial plaintext.
    pub fn open(&self, sealed: &SealedSecret) -> Result<String, VaultError> {
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                sealed.ciphertext.as_ref(),
            )
            .map_err(|_| VaultError::Open)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

/// Turns the configured key material into exactly 32 bytes.
///
/// Accepts a base64-encoded 32-byte key, a raw 32-byte string, or —
/// mirroring the original deployment's tolerance — anything else, padded
/// with zeroes or truncated to fit.
fn derive_key(raw: &str) -> [u8; 32] {
    if let Ok(decoded) = general_purpose::STANDARD.decode(raw) {
        if decoded.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&decoded);
            return key;
        }
    }
    let bytes = raw.as_bytes();
    let mut key = [0u8; 32];
    let n = bytes.len().min(32);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}
