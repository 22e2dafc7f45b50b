// Keywarden: SSH Key Codec
//
// Mints Ed25519 keypairs and renders the public half in the two-field
// OpenSSH wire format:
//
//   ssh-ed25519 base64( string("ssh-ed25519") || string(raw 32-byte key) ) comment
//
// where string(x) is a big-endian u32 length followed by the bytes. The
// fingerprint is the unpadded base64 SHA-256 of the decoded blob, prefixed
// with "SHA256:", identical to what `ssh-keygen -lf` prints.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::CryptoError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Algorithm identifier for Ed25519 keys in the SSH wire format.
pub const SSH_ED25519: &str = "ssh-ed25519";

/// Comment appended to every generated public key.
pub const DEFAULT_KEY_COMMENT: &str = "keywarden-integration";

const ED25519_KEY_LEN: usize = 32;

const FINGERPRINT_PREFIX: &str = "SHA256:";

// ─── Types ───────────────────────────────────────────────────────────────────

/// A freshly generated keypair.
///
/// The private half is PKCS#8 PEM, zeroized on drop and never printed by
/// `Debug`. It exists only long enough to be sealed and handed to the
/// distributor.
pub struct GeneratedKeyPair {
    /// Public key in OpenSSH wire format, including the comment.
    pub public_key: String,
    private_key: Zeroizing<String>,
}

impl GeneratedKeyPair {
    /// The PKCS#8 PEM private key.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Consume the pair, keeping only the private key.
    pub fn into_private_key(self) -> Zeroizing<String> {
        self.private_key
    }
}

impl fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// A structurally decoded OpenSSH public key line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePublicKey {
    pub algorithm: String,
    pub key: [u8; ED25519_KEY_LEN],
    pub comment: Option<String>,
}

/// Generates keypairs and encodes/fingerprints public keys.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    comment: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCodec {
    pub fn new() -> Self {
        Self::with_comment(DEFAULT_KEY_COMMENT)
    }

    pub fn with_comment(comment: &str) -> Self {
        Self {
            comment: comment.to_string(),
        }
    }

    /// Generate a fresh Ed25519 keypair from the OS random source.
    ///
    /// An unavailable random source is fatal for the call; there is no
    /// fallback to a weaker generator.
    pub fn generate(&self) -> Result<GeneratedKeyPair, CryptoError> {
        let mut seed = Zeroizing::new([0u8; ED25519_KEY_LEN]);
        OsRng
            .try_fill_bytes(&mut *seed)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;

        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = Self::encode_public(signing_key.verifying_key().as_bytes(), &self.comment);
        let private_key = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(format!("PKCS#8 export failed: {}", e)))?;

        Ok(GeneratedKeyPair {
            public_key,
            private_key,
        })
    }

    /// Render a raw Ed25519 public key in OpenSSH wire format.
    pub fn encode_public(raw: &[u8; ED25519_KEY_LEN], comment: &str) -> String {
        let mut blob = Vec::with_capacity(8 + SSH_ED25519.len() + ED25519_KEY_LEN);
        write_string(&mut blob, SSH_ED25519.as_bytes());
        write_string(&mut blob, raw);

        let encoded = STANDARD.encode(&blob);
        if comment.is_empty() {
            format!("{} {}", SSH_ED25519, encoded)
        } else {
            format!("{} {} {}", SSH_ED25519, encoded, comment)
        }
    }

    /// Compute the `SHA256:` fingerprint of a wire-format public key.
    ///
    /// Only the base64 field is interpreted; the algorithm name and comment
    /// do not affect the result.
    pub fn fingerprint(public_key: &str) -> Result<String, CryptoError> {
        let mut fields = public_key.split_whitespace();
        let key_field = match (fields.next(), fields.next()) {
            (Some(_), Some(key)) => key,
            _ => {
                return Err(CryptoError::Format(
                    "expected '<algorithm> <base64-key> [comment]'".to_string(),
                ))
            }
        };

        let blob = STANDARD
            .decode(key_field)
            .map_err(|e| CryptoError::Format(format!("key field is not base64: {}", e)))?;
        let digest = Sha256::digest(&blob);

        Ok(format!("{}{}", FINGERPRINT_PREFIX, STANDARD_NO_PAD.encode(digest)))
    }

    /// Structurally parse a wire-format Ed25519 public key.
    pub fn decode_public(public_key: &str) -> Result<WirePublicKey, CryptoError> {
        let mut fields = public_key.split_whitespace();
        let (algorithm, key_field) = match (fields.next(), fields.next()) {
            (Some(alg), Some(key)) => (alg, key),
            _ => {
                return Err(CryptoError::Format(
                    "expected '<algorithm> <base64-key> [comment]'".to_string(),
                ))
            }
        };
        let rest: Vec<&str> = fields.collect();
        let comment = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };

        let blob = STANDARD
            .decode(key_field)
            .map_err(|e| CryptoError::Format(format!("key field is not base64: {}", e)))?;

        let mut reader = WireReader::new(&blob);
        let blob_algorithm = reader.read_string()?;
        if blob_algorithm != SSH_ED25519.as_bytes() {
            return Err(CryptoError::Format(format!(
                "unsupported key algorithm '{}'",
                String::from_utf8_lossy(blob_algorithm)
            )));
        }
        if algorithm != SSH_ED25519 {
            return Err(CryptoError::Format(format!(
                "algorithm field '{}' does not match encoded '{}'",
                algorithm, SSH_ED25519
            )));
        }

        let raw = reader.read_string()?;
        let key: [u8; ED25519_KEY_LEN] = raw.try_into().map_err(|_| {
            CryptoError::Format(format!(
                "Ed25519 key must be {} bytes, got {}",
                ED25519_KEY_LEN,
                raw.len()
            ))
        })?;

        if !reader.is_empty() {
            return Err(CryptoError::Format(
                "trailing bytes after key data".to_string(),
            ));
        }

        Ok(WirePublicKey {
            algorithm: algorithm.to_string(),
            key,
            comment,
        })
    }
}

// ─── Wire Helpers ────────────────────────────────────────────────────────────

fn write_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Cursor over a length-prefixed SSH blob.
struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_u32(&mut self) -> Result<u32, CryptoError> {
        if self.buf.len() < 4 {
            return Err(CryptoError::Format("truncated length prefix".to_string()));
        }
        let (head, tail) = self.buf.split_at(4);
        self.buf = tail;
        Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
    }

    fn read_string(&mut self) -> Result<&'a [u8], CryptoError> {
        let len = self.read_u32()? as usize;
        if self.buf.len() < len {
            return Err(CryptoError::Format(format!(
                "field claims {} bytes but only {} remain",
                len,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
