//! Authentication plugins.
//!
//! - `mysql_native_password`: `SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))`
//! - `caching_sha2_password`: `SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + seed)`;
//!   when the server has no cached entry it asks for full authentication and
//!   the password is sent RSA-encrypted with its public key.

use polystore_core::{Backend, ConnectionError, ConnectionErrorKind, Error};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    pub const SHA256_PASSWORD: &str = "sha256_password";
}

/// Second byte of an `AuthMoreData` packet under `caching_sha2_password`.
pub mod caching_sha2 {
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

fn auth_error(message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError::new(
        Backend::MySql,
        ConnectionErrorKind::Authentication,
        message,
    ))
}

/// Servers append a NUL to the 20-byte scramble.
fn scramble(seed: &[u8]) -> &[u8] {
    match seed.split_last() {
        Some((0, head)) => head,
        _ => seed,
    }
}

pub fn mysql_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = scramble(seed);
    let seed = &seed[..seed.len().min(20)];
    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let mask = hasher.finalize();
    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

pub fn caching_sha2_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = scramble(seed);
    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);
    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(seed);
    let mask = hasher.finalize();
    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Initial auth response for `plugin`.
pub fn auth_response(plugin: &str, password: &str, seed: &[u8]) -> Result<Vec<u8>, Error> {
    match plugin {
        plugins::MYSQL_NATIVE_PASSWORD => Ok(mysql_native_password(password, seed)),
        plugins::CACHING_SHA2_PASSWORD => Ok(caching_sha2_password(password, seed)),
        // ask for the public key; the password itself goes out RSA-encrypted
        plugins::SHA256_PASSWORD if password.is_empty() => Ok(vec![0]),
        plugins::SHA256_PASSWORD => Ok(vec![0x01]),
        other => Err(auth_error(format!(
            "unsupported authentication plugin '{}'",
            other
        ))),
    }
}

/// Password XOR-ed with the repeating seed, NUL-terminated.
pub fn xor_password_with_seed(password: &str, seed: &[u8]) -> Vec<u8> {
    let seed = scramble(seed);
    password
        .bytes()
        .chain(std::iter::once(0))
        .enumerate()
        .map(|(i, b)| {
            if seed.is_empty() {
                b
            } else {
                b ^ seed[i % seed.len()]
            }
        })
        .collect()
}

/// Encrypt the password with the server's PEM public key.
///
/// `caching_sha2_password` uses OAEP padding; `sha256_password` uses PKCS#1 v1.5.
pub fn encrypt_password(
    password: &str,
    seed: &[u8],
    public_key_pem: &str,
    oaep: bool,
) -> Result<Vec<u8>, Error> {
    let key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_key_pem))
        .map_err(|e| auth_error(format!("invalid server public key: {}", e)))?;
    let plain = xor_password_with_seed(password, seed);
    let encrypted = if oaep {
        key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
    } else {
        key.encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, &plain)
    };
    encrypted.map_err(|e| auth_error(format!("RSA encryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
        a.iter().zip(b).map(|(x, y)| x ^ y).collect()
    }

    #[test]
    fn test_empty_password_sends_nothing() {
        assert!(mysql_native_password("", &[1; 20]).is_empty());
        assert!(caching_sha2_password("", &[1; 20]).is_empty());
    }

    #[test]
    fn test_native_password_unmasks_to_sha1() {
        let seed: Vec<u8> = (1..=20).collect();
        let token = mysql_native_password("secret", &seed);
        assert_eq!(token.len(), 20);

        let stage1 = Sha1::digest(b"secret");
        let mut hasher = Sha1::new();
        hasher.update(&seed);
        hasher.update(Sha1::digest(stage1));
        assert_eq!(xor(&token, &hasher.finalize()), stage1.to_vec());
    }

    #[test]
    fn test_caching_sha2_unmasks_to_sha256() {
        let seed: Vec<u8> = (10..30).collect();
        let token = caching_sha2_password("secret", &seed);
        assert_eq!(token.len(), 32);

        let stage1 = Sha256::digest(b"secret");
        let mut hasher = Sha256::new();
        hasher.update(Sha256::digest(stage1));
        hasher.update(&seed);
        assert_eq!(xor(&token, &hasher.finalize()), stage1.to_vec());
    }

    #[test]
    fn test_trailing_nul_in_seed_is_ignored() {
        let mut seed = vec![7u8; 20];
        let without = caching_sha2_password("pw", &seed);
        seed.push(0);
        assert_eq!(caching_sha2_password("pw", &seed), without);
        assert_eq!(
            mysql_native_password("pw", &seed),
            mysql_native_password("pw", &seed[..20])
        );
    }

    #[test]
    fn test_xor_password_is_reversible() {
        let seed = [1, 2, 3, 4];
        let out = xor_password_with_seed("test", &seed);
        assert_eq!(out.len(), 5);
        let plain: Vec<u8> = out
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ seed[i % seed.len()])
            .collect();
        assert_eq!(plain, b"test\0");
    }

    #[test]
    fn test_unknown_plugin_is_auth_error() {
        let err = auth_response("dialog", "pw", &[0; 20]).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref e) if e.kind == ConnectionErrorKind::Authentication
        ));
    }

    #[test]
    fn test_bad_public_key_is_auth_error() {
        let err = encrypt_password("pw", &[0; 20], "not a key", true).unwrap_err();
        assert!(err.is_connection_error());
    }
}
