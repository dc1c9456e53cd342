//! Secret codec - authenticated encryption for persisted credential blobs
//!
//! Seals single secret strings under a passphrase-derived key. AES-256-GCM
//! with a per-call random IV and a fixed associated-data tag that binds
//! ciphertexts to this application; the key is stretched from the passphrase
//! with Argon2id and a fixed salt. Changing the passphrase invalidates every
//! previously sealed secret (there is no key-rotation migration - callers
//! re-authenticate instead).

use crate::{AuthError, AuthResult};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use serde::{Deserialize, Serialize};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Fixed KDF salt; versioned so a future format change can re-derive
const KDF_SALT: &[u8] = b"signbridge.store.v1";

/// Associated data binding ciphertexts to Signbridge credential storage
const BINDING_TAG: &[u8] = b"signbridge-credential";

/// Serialized form of one encrypted secret string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Hex-encoded initialization vector (12 bytes)
    pub iv: String,
    /// Hex-encoded ciphertext
    pub ciphertext: String,
    /// Hex-encoded GCM authentication tag
    pub auth_tag: String,
}

/// Symmetric codec keyed by an operator-supplied passphrase
#[derive(Clone)]
pub struct SecretCodec {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Derive the sealing key from a passphrase
    pub fn new(passphrase: &str) -> AuthResult<Self> {
        let mut key = [0u8; KEY_LEN];
        argon2::Argon2::default()
            .hash_password_into(passphrase.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| AuthError::crypto(format!("key derivation failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Encrypt one secret string
    pub fn seal(&self, plaintext: &str) -> AuthResult<SealedSecret> {
        let mut iv = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut iv)
            .map_err(|e| AuthError::crypto(format!("iv generation failed: {}", e)))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AuthError::crypto("invalid sealing key"))?;
        let key = LessSafeKey::new(unbound);
        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| AuthError::crypto("invalid iv length"))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = key
            .seal_in_place_separate_tag(nonce, Aad::from(BINDING_TAG), &mut in_out)
            .map_err(|_| AuthError::crypto("sealing failed"))?;

        Ok(SealedSecret {
            iv: hex::encode(iv),
            ciphertext: hex::encode(&in_out),
            auth_tag: hex::encode(tag.as_ref()),
        })
    }

    /// Decrypt a sealed secret; any failure means "re-authenticate"
    pub fn open(&self, sealed: &SealedSecret) -> AuthResult<String> {
        let iv = hex::decode(&sealed.iv).map_err(|_| AuthError::decrypt("malformed iv hex"))?;
        let ciphertext = hex::decode(&sealed.ciphertext)
            .map_err(|_| AuthError::decrypt("malformed ciphertext hex"))?;
        let auth_tag =
            hex::decode(&sealed.auth_tag).map_err(|_| AuthError::decrypt("malformed tag hex"))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AuthError::decrypt("invalid sealing key"))?;
        let key = LessSafeKey::new(unbound);
        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| AuthError::decrypt("invalid iv length"))?;

        let mut in_out = ciphertext;
        in_out.extend_from_slice(&auth_tag);
        let plaintext = key
            .open_in_place(nonce, Aad::from(BINDING_TAG), &mut in_out)
            .map_err(|_| AuthError::decrypt("authentication tag mismatch or wrong passphrase"))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| AuthError::decrypt("decrypted secret is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = SecretCodec::new("correct horse battery staple").unwrap();
        let sealed = codec.seal("api-token-abc123").unwrap();
        assert_eq!(codec.open(&sealed).unwrap(), "api-token-abc123");
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let codec = SecretCodec::new("passphrase-one").unwrap();
        let sealed = codec.seal("secret").unwrap();

        let other = SecretCodec::new("passphrase-two").unwrap();
        match other.open(&sealed) {
            Err(AuthError::Decrypt { .. }) => {}
            other => panic!("expected Decrypt error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let codec = SecretCodec::new("pw").unwrap();
        let mut sealed = codec.seal("secret").unwrap();

        // Flip one nibble of the ciphertext
        let mut bytes = hex::decode(&sealed.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        sealed.ciphertext = hex::encode(bytes);

        assert!(matches!(
            codec.open(&sealed),
            Err(AuthError::Decrypt { .. })
        ));
    }

    #[test]
    fn malformed_hex_is_a_typed_error() {
        let codec = SecretCodec::new("pw").unwrap();
        let sealed = SealedSecret {
            iv: "not hex".into(),
            ciphertext: "00".into(),
            auth_tag: "00".into(),
        };
        assert!(matches!(
            codec.open(&sealed),
            Err(AuthError::Decrypt { .. })
        ));
    }

    #[test]
    fn each_seal_uses_a_fresh_iv() {
        let codec = SecretCodec::new("pw").unwrap();
        let a = codec.seal("same plaintext").unwrap();
        let b = codec.seal("same plaintext").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let codec = SecretCodec::new("pw").unwrap();
        let sealed = codec.seal("").unwrap();
        assert_eq!(codec.open(&sealed).unwrap(), "");
    }
}
