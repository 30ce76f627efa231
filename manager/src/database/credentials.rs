//! Password encryption at rest.
//!
//! Stored form is base64(nonce || ciphertext || tag). The ciphertext is the
//! password XOR-ed with a blake3 keyed XOF stream seeded by the nonce; the
//! tag is a keyed blake3 hash of nonce and ciphertext under a separately
//! derived key. A value whose tag does not verify is never decrypted.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

const KEY_CONTEXT: &str = "upgrade-manager 2024 connection credentials";
const MAC_CONTEXT: &str = "upgrade-manager 2024 connection credentials tag";
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = blake3::OUT_LEN;

#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
    mac_key: [u8; 32],
}

impl CredentialCipher {
    pub fn new(credential_key: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, credential_key.as_bytes()),
            mac_key: blake3::derive_key(MAC_CONTEXT, credential_key.as_bytes()),
        }
    }

    fn tag(&self, sealed: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.mac_key, sealed)
    }

    fn keystream(&self, nonce: &[u8], len: usize) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(nonce);
        let mut stream = vec![0u8; len];
        hasher.finalize_xof().fill(&mut stream);
        stream
    }

    pub fn encrypt(&self, plain: &str) -> String {
        if plain.is_empty() {
            return String::new();
        }
        let nonce: [u8; NONCE_LEN] = rand::random();
        let stream = self.keystream(&nonce, plain.len());

        let mut out = Vec::with_capacity(NONCE_LEN + plain.len() + TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend(plain.bytes().zip(stream).map(|(b, k)| b ^ k));
        let tag = self.tag(&out);
        out.extend_from_slice(tag.as_bytes());
        STANDARD.encode(out)
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        if stored.is_empty() {
            return Ok(String::new());
        }
        let raw = STANDARD
            .decode(stored)
            .map_err(|e| anyhow!("Stored credential is not valid base64: {}", e))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(anyhow!("Stored credential is truncated"));
        }
        let (sealed, tag) = raw.split_at(raw.len() - TAG_LEN);
        let tag: [u8; TAG_LEN] = tag
            .try_into()
            .map_err(|_| anyhow!("Stored credential is truncated"))?;
        // blake3::Hash compares in constant time
        if self.tag(sealed) != blake3::Hash::from(tag) {
            return Err(anyhow!("Stored credential does not verify with this key"));
        }

        let (nonce, cipher) = sealed.split_at(NONCE_LEN);
        let stream = self.keystream(nonce, cipher.len());
        let plain: Vec<u8> = cipher.iter().zip(stream).map(|(b, k)| b ^ k).collect();
        String::from_utf8(plain).map_err(|_| anyhow!("Stored credential does not decrypt with this key"))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_hides_password_and_varies_per_call() {
        let cipher = CredentialCipher::new("lab-key");
        let first = cipher.encrypt("cisco123");
        let second = cipher.encrypt("cisco123");

        assert!(!first.contains("cisco123"));
        assert_ne!(first, second, "fresh nonce per encryption");
        assert_eq!(cipher.decrypt(&first).unwrap(), "cisco123");
        assert_eq!(cipher.decrypt(&second).unwrap(), "cisco123");
    }

    #[test]
    fn empty_password_stays_empty() {
        let cipher = CredentialCipher::new("lab-key");
        assert_eq!(cipher.encrypt(""), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn garbage_is_rejected() {
        let cipher = CredentialCipher::new("lab-key");
        assert!(cipher.decrypt("not base64 !!").is_err());
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn other_key_or_tampering_fails_verification() {
        let cipher = CredentialCipher::new("lab-key");
        let stored = cipher.encrypt("cisco123");

        let err = CredentialCipher::new("other-key").decrypt(&stored).unwrap_err();
        assert!(err.to_string().contains("does not verify"));

        let mut raw = STANDARD.decode(&stored).unwrap();
        raw[NONCE_LEN] ^= 0x01;
        let flipped = STANDARD.encode(&raw);
        assert!(cipher.decrypt(&flipped).is_err());

        // Nonce and ciphertext without their tag
        let untagged = STANDARD.encode(&raw[..raw.len() - TAG_LEN]);
        assert!(cipher.decrypt(&untagged).is_err());
    }
}
