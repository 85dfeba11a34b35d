use crate::application_port::{AuthError, TokenHasher};
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;

/// HMAC-SHA256 of the raw refresh token, hex encoded.
pub struct HmacTokenHasher {
    key: Vec<u8>,
}

impl HmacTokenHasher {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    fn mac(&self, token: &str) -> Result<Hmac<Sha256>, AuthError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        mac.update(token.as_bytes());
        Ok(mac)
    }
}

impl TokenHasher for HmacTokenHasher {
    fn hash(&self, token: &str) -> Result<String, AuthError> {
        let out = self.mac(token)?.finalize().into_bytes();
        Ok(hex::encode(out))
    }

    fn verify(&self, token: &str, hash_hex: &str) -> bool {
        let Ok(expected) = hex::decode(hash_hex) else {
            return false;
        };
        match self.mac(token) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_hash_only() {
        let hasher = HmacTokenHasher::new(b"pepper".to_vec());
        let h = hasher.hash("token-a").unwrap();

        assert_eq!(h.len(), 64);
        assert!(hasher.verify("token-a", &h));
        assert!(!hasher.verify("token-b", &h));
        assert!(!hasher.verify("token-a", "not-hex"));
        assert!(!HmacTokenHasher::new(b"other".to_vec()).verify("token-a", &h));
    }
}
