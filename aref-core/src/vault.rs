//! Encrypted credential vault
//!
//! `config/credentials.json` is encrypted into a sibling `credentials.enc`
//! envelope. The key is derived with PBKDF2-HMAC-SHA256 from a passphrase and
//! a random per-file salt; the payload is sealed with AES-256-GCM.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{CoreError, CredentialSet, Result};

/// PBKDF2 rounds for newly written envelopes
pub const KDF_ITERATIONS: u32 = 100_000;
/// Highest KDF cost accepted from an envelope
pub const MAX_KDF_ITERATIONS: u32 = KDF_ITERATIONS * 10;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const ENVELOPE_VERSION: u32 = 1;

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct EncryptedCredentials {
    version: u32,
    iterations: u32,
    /// Base64 encoded salt
    salt: String,
    /// Base64 encoded nonce
    nonce: String,
    /// Base64 encoded ciphertext
    ciphertext: String,
    encrypted_at: DateTime<Utc>,
}

/// Reads and writes the encrypted credential file
#[derive(Debug, Clone)]
pub struct CredentialVault {
    path: PathBuf,
    iterations: u32,
}

impl CredentialVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            iterations: KDF_ITERATIONS,
        }
    }

    /// Override the KDF cost for new envelopes
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.clamp(1, MAX_KDF_ITERATIONS);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> Key<Aes256Gcm> {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
        *Key::<Aes256Gcm>::from_slice(&key)
    }

    /// Encrypt a plaintext credentials document into the vault file
    pub fn encrypt(&self, passphrase: &str, plaintext: &[u8]) -> Result<()> {
        // Refuse to seal something we could not load back
        CredentialSet::from_json(plaintext)?;

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let cipher = Aes256Gcm::new(&Self::derive_key(passphrase, &salt, self.iterations));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CoreError::Decryption(format!("Encryption failed: {e}")))?;

        let envelope = EncryptedCredentials {
            version: ENVELOPE_VERSION,
            iterations: self.iterations,
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            encrypted_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&envelope)?;
        std::fs::write(&self.path, json).map_err(|e| CoreError::io(&self.path, e))?;

        info!("Credentials encrypted to {}", self.path.display());
        Ok(())
    }

    /// Encrypt the plaintext file at `source`
    pub fn encrypt_file(&self, passphrase: &str, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        let plaintext = std::fs::read(source).map_err(|e| CoreError::io(source, e))?;
        self.encrypt(passphrase, &plaintext)
    }

    /// Decrypt the vault into a credential set. Any failure is fatal to the run.
    pub fn decrypt(&self, passphrase: &str) -> Result<CredentialSet> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| CoreError::io(&self.path, e))?;
        let envelope: EncryptedCredentials = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Decryption(format!("Corrupted credential file: {e}")))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(CoreError::Decryption(format!(
                "Unsupported credential file version {}",
                envelope.version
            )));
        }
        if envelope.iterations == 0 || envelope.iterations > MAX_KDF_ITERATIONS {
            return Err(CoreError::Decryption("Invalid KDF iteration count".to_string()));
        }

        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|e| CoreError::Decryption(format!("Invalid {field} encoding: {e}")))
        };
        let salt = decode("salt", &envelope.salt)?;
        let nonce = decode("nonce", &envelope.nonce)?;
        let ciphertext = decode("ciphertext", &envelope.ciphertext)?;

        if nonce.len() != NONCE_LEN {
            return Err(CoreError::Decryption("Invalid nonce length".to_string()));
        }

        let cipher = Aes256Gcm::new(&Self::derive_key(passphrase, &salt, envelope.iterations));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CoreError::Decryption("wrong passphrase or corrupted file".to_string()))?;

        CredentialSet::from_json(&plaintext)
            .map_err(|e| CoreError::Decryption(format!("Decrypted payload is not valid: {e}")))
    }
}
