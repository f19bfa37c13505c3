//! Checksum hashing, session-key decryption and id derivation.
//!
//! Hashing follows `update/model.rs`'s `calculate_checksum` (buffered
//! `Sha256` over the file). Constant-time comparison and the AEAD
//! session-key decrypt have no direct precedent there and are enrichment
//! from the pack's general RustCrypto conventions (`subtle`, `aes-gcm`).

use crate::error::CryptoError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::path::Path;
use subtle::ConstantTimeEq;
use tokio::io::AsyncReadExt;

const NONCE_LEN: usize = 12;
const CHUNK_SIZE: usize = 1024 * 1024;

/// SHA-256 of a file's contents, as a lowercase hex string.
pub async fn hash_file(path: &Path) -> Result<String, CryptoError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file's digest against an expected hex checksum, comparing in
/// constant time so timing can't leak how many leading bytes matched.
pub async fn verify_file(path: &Path, expected_hex: &str) -> Result<bool, CryptoError> {
    let expected = match hex::decode(expected_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let actual = hasher.finalize();

    if actual.len() != expected.len() {
        return Ok(false);
    }
    Ok(bool::from(actual.as_slice().ct_eq(&expected)))
}

fn cipher_for(session_key: &[u8]) -> Option<Aes256Gcm> {
    if session_key.len() != 32 {
        return None;
    }
    Some(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(session_key)))
}

/// Attempt to decrypt a base64-encoded, session-key-encrypted checksum
/// field. The wire format is `nonce(12) || ciphertext`, base64-encoded.
/// Returns `None` on any format or decrypt error — callers fall back to
/// using the field verbatim as the expected digest.
pub fn decrypt_checksum(encrypted_base64: &str, session_key: &[u8]) -> Option<String> {
    let raw = BASE64.decode(encrypted_base64.trim()).ok()?;
    if raw.len() <= NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = cipher_for(session_key)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .ok()?;
    String::from_utf8(plaintext).ok()
}

/// In-place symmetric decrypt of a downloaded payload. The on-disk format
/// is `nonce(12) || ciphertext`; the file is overwritten with the
/// plaintext. No-op (never called) when no session key is supplied.
pub async fn decrypt_file(path: &Path, session_key: &[u8]) -> Result<(), CryptoError> {
    let raw = tokio::fs::read(path).await?;
    if raw.len() <= NONCE_LEN {
        return Err(CryptoError::Decrypt);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = cipher_for(session_key).ok_or(CryptoError::Decrypt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;

    let tmp_path = path.with_extension("decrypt.tmp");
    tokio::fs::write(&tmp_path, &plaintext).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Decompress a Brotli stream; on any decode error (including "not
/// actually Brotli"), returns the input unchanged.
pub fn try_decompress_brotli(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut reader = std::io::Cursor::new(bytes);
    match brotli::BrotliDecompress(&mut reader, &mut out) {
        Ok(()) if !out.is_empty() || bytes.is_empty() => out,
        _ => bytes.to_vec(),
    }
}

/// Generate a cryptographically random bundle id, distinct from the
/// reserved `"builtin"` literal.
pub fn generate_bundle_id() -> String {
    loop {
        let id = uuid::Uuid::new_v4().to_string();
        if id != crate::store::BUILTIN_ID {
            return id;
        }
    }
}

/// Strip PEM armor and whitespace from a public key, returning the first
/// 20 characters of the remainder as a key id, or `None` if empty.
pub fn derive_key_id(public_key_pem: &str) -> Option<String> {
    let stripped: String = public_key_pem
        .lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .collect::<Vec<_>>()
        .join("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if stripped.is_empty() {
        return None;
    }
    Some(stripped.chars().take(20).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hash_file_matches_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let digest = hash_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn verify_file_accepts_correct_and_rejects_wrong() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let digest = hash_file(&path).await.unwrap();

        assert!(verify_file(&path, &digest).await.unwrap());
        assert!(!verify_file(&path, "deadbeef").await.unwrap());
        assert!(!verify_file(&path, "not-hex!!").await.unwrap());
    }

    #[test]
    fn derive_key_id_strips_armor_and_truncates() {
        let pem = "-----BEGIN PUBLIC KEY-----\nABCDEFGHIJKLMNOPQRSTUVWXYZ\n-----END PUBLIC KEY-----\n";
        assert_eq!(derive_key_id(pem), Some("ABCDEFGHIJKLMNOPQRST".to_string()));
    }

    #[test]
    fn derive_key_id_empty_is_none() {
        assert_eq!(derive_key_id(""), None);
        assert_eq!(derive_key_id("-----BEGIN KEY-----\n-----END KEY-----\n"), None);
    }

    #[test]
    fn generate_bundle_id_never_collides_with_builtin() {
        for _ in 0..100 {
            assert_ne!(generate_bundle_id(), crate::store::BUILTIN_ID);
        }
    }

    #[test]
    fn brotli_passthrough_on_non_brotli_input() {
        let input = b"not brotli data".to_vec();
        assert_eq!(try_decompress_brotli(&input), input);
    }

    #[test]
    fn session_key_roundtrip_checksum() {
        let key = [7u8; 32];
        let cipher = cipher_for(&key).unwrap();
        let nonce_bytes = [1u8; NONCE_LEN];
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), b"abc123".as_ref())
            .unwrap();
        let mut wire = nonce_bytes.to_vec();
        wire.extend_from_slice(&ciphertext);
        let encoded = BASE64.encode(&wire);

        assert_eq!(decrypt_checksum(&encoded, &key), Some("abc123".to_string()));
    }

    #[test]
    fn decrypt_checksum_bad_format_returns_none() {
        assert_eq!(decrypt_checksum("not-base64!!", &[0u8; 32]), None);
        assert_eq!(decrypt_checksum("AAAA", &[0u8; 32]), None);
    }
}
