// Keywarden: Crypto Module
//
// Ed25519 key minting and OpenSSH wire encoding (codec), and AES-256-GCM
// sealing of private key material for at-rest storage (cipher).

mod cipher;
mod codec;
mod error;

pub use cipher::SecretCipher;
pub use codec::{GeneratedKeyPair, KeyCodec, WirePublicKey, DEFAULT_KEY_COMMENT, SSH_ED25519};
pub use error::CryptoError;
