// src/token.rs
//
// Public voting tokens never touch the database in plaintext: lookups go
// through a pepper-keyed HMAC, and the organizer-visible copy is sealed with
// AES-256-GCM under a separate key.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

#[derive(Debug, Error)]
pub enum UnsealError {
    #[error("sealed token is malformed")]
    Malformed,
    #[error("sealed token failed authentication")]
    Rejected,
}

pub struct TokenCodec {
    pepper: Vec<u8>,
    cipher: Aes256Gcm,
}

impl TokenCodec {
    pub fn new(pepper: &str, seal_key: &str) -> Self {
        let key_bytes = Sha256::digest(seal_key.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Self {
            pepper: pepper.as_bytes().to_vec(),
            cipher,
        }
    }

    /// Fresh unguessable token: 32 CSPRNG bytes, URL-safe base64, no padding.
    pub fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Deterministic lookup hash of the token; this is what gets stored and indexed.
    pub fn hash(&self, token: &str) -> Vec<u8> {
        let mut mac: HmacSha256 =
            Mac::new_from_slice(&self.pepper).expect("HMAC accepts any key length");
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Reversibly seal the plaintext token for later organizer display.
    pub fn seal(&self, token: &str) -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), token.as_bytes())
            .expect("AES-GCM encryption of an in-memory buffer cannot fail");

        let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        URL_SAFE_NO_PAD.encode(blob)
    }

    /// Recover the plaintext token. Fails closed on tampering or a rotated key.
    pub fn unseal(&self, sealed: &str) -> Result<String, UnsealError> {
        let blob = URL_SAFE_NO_PAD.decode(sealed).map_err(|_| UnsealError::Malformed)?;
        if blob.len() <= NONCE_BYTES {
            return Err(UnsealError::Malformed);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_BYTES);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| UnsealError::Rejected)?;
        String::from_utf8(plaintext).map_err(|_| UnsealError::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-pepper", "test-seal-key")
    }

    #[test]
    fn generated_tokens_are_url_safe_and_unpadded() {
        let token = codec().generate();
        // 32 bytes -> 43 base64 characters without padding.
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn generated_tokens_do_not_repeat() {
        let codec = codec();
        assert_ne!(codec.generate(), codec.generate());
    }

    #[test]
    fn hash_is_deterministic() {
        let codec = codec();
        let token = codec.generate();
        assert_eq!(codec.hash(&token), codec.hash(&token));
        assert_eq!(codec.hash(&token).len(), 32);
    }

    #[test]
    fn hash_depends_on_the_pepper() {
        let token = "same-token";
        let a = TokenCodec::new("pepper-a", "seal").hash(token);
        let b = TokenCodec::new("pepper-b", "seal").hash(token);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_differs_across_tokens() {
        let codec = codec();
        assert_ne!(codec.hash("token-one"), codec.hash("token-two"));
    }

    #[test]
    fn seal_round_trips() {
        let codec = codec();
        let token = codec.generate();
        let sealed = codec.seal(&token);
        assert_eq!(codec.unseal(&sealed).unwrap(), token);
    }

    #[test]
    fn seal_uses_a_fresh_nonce_each_time() {
        let codec = codec();
        let token = codec.generate();
        let first = codec.seal(&token);
        let second = codec.seal(&token);
        assert_ne!(first, second);
        assert_eq!(codec.unseal(&first).unwrap(), token);
        assert_eq!(codec.unseal(&second).unwrap(), token);
    }

    #[test]
    fn unseal_rejects_tampering() {
        let codec = codec();
        let sealed = codec.seal("a-token");
        let mut blob = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(blob);
        assert!(matches!(codec.unseal(&tampered), Err(UnsealError::Rejected)));
    }

    #[test]
    fn unseal_rejects_a_rotated_key() {
        let sealed = TokenCodec::new("pepper", "old-key").seal("a-token");
        let rotated = TokenCodec::new("pepper", "new-key");
        assert!(matches!(rotated.unseal(&sealed), Err(UnsealError::Rejected)));
    }

    #[test]
    fn unseal_rejects_garbage() {
        let codec = codec();
        assert!(matches!(codec.unseal("not base64 !!!"), Err(UnsealError::Malformed)));
        assert!(matches!(codec.unseal(""), Err(UnsealError::Malformed)));
        // Valid base64 but shorter than a nonce.
        assert!(matches!(codec.unseal("AAAA"), Err(UnsealError::Malformed)));
    }
}
