use aes::Aes256;
use argon2rs::verifier::Encoded;
use base64::engine::general_purpose;
use base64::Engine;
use block_modes::block_padding::Pkcs7;
use block_modes::{BlockMode, Cbc};
use rand::distributions::{Alphanumeric, Uniform};
use rand::{Rng, RngCore};

use crate::env;
use crate::error::{ServiceError, ServiceResult};

type Aes256Cbc = Cbc<Aes256, Pkcs7>;

const IV_LENGTH: usize = 16;

pub fn generate_random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Random numeric code, eg. for one time passwords.
pub fn generate_numeric_code(length: usize) -> String {
    let digits = Uniform::from(0..10u8);
    rand::thread_rng()
        .sample_iter(digits)
        .take(length)
        .map(|digit| char::from(b'0' + digit))
        .collect()
}

pub fn password_hash_create(password: &str) -> ServiceResult<Vec<u8>> {
    let salt = generate_random_string(16);
    let encoded = Encoded::default2i(password.as_bytes(), salt.as_bytes(), b"", b"");
    Ok(encoded.to_u8())
}

pub fn password_hash_verify(hash: &[u8], password: &str) -> ServiceResult<bool> {
    let encoded = Encoded::from_u8(hash).map_err(|_| {
        ServiceError::InternalServerError("Could not decode stored password hash.".to_string())
    })?;
    Ok(encoded.verify(password.as_bytes()))
}

/// Lower case hex sha512 digest of `value`.
pub fn sha512_hex(value: &str) -> String {
    openssl::sha::sha512(value.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn secret_key() -> [u8; 32] {
    openssl::sha::sha256(env::AUTH_SECRET.as_bytes())
}

/// Encrypt a secret for storage. The result is `base64(iv || ciphertext)`.
pub fn encrypt_secret(value: &str) -> ServiceResult<String> {
    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256Cbc::new_from_slices(&secret_key(), &iv)?;
    let mut data = iv.to_vec();
    data.extend(cipher.encrypt_vec(value.as_bytes()));

    Ok(general_purpose::STANDARD.encode(data))
}

pub fn decrypt_secret(value: &str) -> ServiceResult<String> {
    let data = general_purpose::STANDARD.decode(value)?;
    if data.len() <= IV_LENGTH {
        return Err(ServiceError::InternalServerError(
            "Encrypted secret is too short.".to_string(),
        ));
    }

    let (iv, ciphertext) = data.split_at(IV_LENGTH);
    let cipher = Aes256Cbc::new_from_slices(&secret_key(), iv)?;
    let plain = cipher.decrypt_vec(ciphertext)?;

    String::from_utf8(plain).map_err(|_| {
        ServiceError::InternalServerError("Decrypted secret is not valid utf-8.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash() {
        let hash = password_hash_create("correct horse").unwrap();
        assert!(password_hash_verify(&hash, "correct horse").unwrap());
        assert!(!password_hash_verify(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_secret_encryption() {
        let encrypted = encrypt_secret("SB-Mid-server-abc123").unwrap();
        assert_ne!(encrypted, "SB-Mid-server-abc123");
        assert_eq!(decrypt_secret(&encrypted).unwrap(), "SB-Mid-server-abc123");

        // a fresh iv is used for every encryption
        assert_ne!(encrypt_secret("SB-Mid-server-abc123").unwrap(), encrypted);
    }

    #[test]
    fn test_sha512_hex() {
        let digest = sha512_hex("abc");
        assert_eq!(digest.len(), 128);
        assert!(digest.starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn test_numeric_code() {
        let code = generate_numeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
