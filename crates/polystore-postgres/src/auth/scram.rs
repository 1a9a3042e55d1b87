//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677), without channel binding.

use crate::protocol::protocol_error;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use polystore_core::{Backend, ConnectionError, ConnectionErrorKind, Error};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const MECHANISM: &str = "SCRAM-SHA-256";

/// GS2 header `n,,` in base64: no channel binding, no authzid.
const CHANNEL_BINDING: &str = "biws";

#[derive(Debug)]
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    /// Set once the server-first message has been processed
    server_signature: Option<[u8; 32]>,
}

impl ScramClient {
    pub fn new(username: &str, password: &str) -> Self {
        let nonce = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self::with_nonce(username, password, nonce)
    }

    pub fn with_nonce(username: &str, password: &str, client_nonce: String) -> Self {
        Self {
            username: saslname(username),
            password: password.to_string(),
            client_nonce,
            server_signature: None,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", self.username, self.client_nonce)
    }

    pub fn client_first(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare()).into_bytes()
    }

    /// Consume `r=..,s=..,i=..` and produce the client-final message.
    pub fn process_server_first(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let message = std::str::from_utf8(data)
            .map_err(|e| protocol_error(format!("invalid UTF-8 in SASL continue: {}", e)))?;

        let (mut nonce, mut salt, mut iterations) = (None, None, None);
        for part in message.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                nonce = Some(v);
            } else if let Some(v) = part.strip_prefix("s=") {
                salt = Some(
                    BASE64
                        .decode(v)
                        .map_err(|e| protocol_error(format!("invalid SCRAM salt: {}", e)))?,
                );
            } else if let Some(v) = part.strip_prefix("i=") {
                iterations = Some(
                    v.parse::<u32>()
                        .map_err(|e| protocol_error(format!("invalid SCRAM iterations: {}", e)))?,
                );
            }
        }
        let nonce = nonce.ok_or_else(|| protocol_error("SCRAM server-first without nonce"))?;
        let salt = salt.ok_or_else(|| protocol_error("SCRAM server-first without salt"))?;
        let iterations =
            iterations.ok_or_else(|| protocol_error("SCRAM server-first without iterations"))?;
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(auth_error("SCRAM server nonce does not extend the client nonce"));
        }

        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2::<HmacSha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        )
        .map_err(|e| protocol_error(format!("PBKDF2 failed: {}", e)))?;

        let client_final_bare = format!("c={},r={}", CHANNEL_BINDING, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            message,
            client_final_bare
        );

        let client_key = hmac(&salted_password, b"Client Key")?;
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let server_key = hmac(&salted_password, b"Server Key")?;
        self.server_signature = Some(hmac(&server_key, auth_message.as_bytes())?);

        Ok(format!("{},p={}", client_final_bare, BASE64.encode(proof)).into_bytes())
    }

    /// Check the server's `v=` signature in constant time.
    pub fn verify_server_final(&self, data: &[u8]) -> Result<(), Error> {
        let message = std::str::from_utf8(data)
            .map_err(|e| protocol_error(format!("invalid UTF-8 in SASL final: {}", e)))?;
        if let Some(err) = message.strip_prefix("e=") {
            return Err(auth_error(format!("SCRAM authentication failed: {}", err)));
        }
        let encoded = message
            .strip_prefix("v=")
            .ok_or_else(|| protocol_error("malformed SCRAM server-final message"))?;
        let received = BASE64
            .decode(encoded)
            .map_err(|e| protocol_error(format!("invalid SCRAM server signature: {}", e)))?;
        let expected = self
            .server_signature
            .ok_or_else(|| protocol_error("SCRAM server-final before server-first"))?;
        if bool::from(expected.as_slice().ct_eq(received.as_slice())) {
            Ok(())
        } else {
            Err(auth_error("SCRAM server signature mismatch"))
        }
    }
}

/// Escape `=` and `,` in a user name.
fn saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn auth_error(message: impl Into<String>) -> Error {
    ConnectionError::new(
        Backend::Postgres,
        ConnectionErrorKind::Authentication,
        message,
    )
    .into()
}

fn hmac(key: &[u8], data: &[u8]) -> Result<[u8; 32], Error> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| protocol_error(format!("HMAC init failed: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3
    const NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    #[test]
    fn test_rfc7677_exchange() {
        let mut client = ScramClient::with_nonce("user", "pencil", NONCE.to_string());
        assert_eq!(client.client_first(), b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");
        let client_final = client.process_server_first(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(client_final).unwrap(), CLIENT_FINAL);
        client.verify_server_final(SERVER_FINAL.as_bytes()).unwrap();
    }

    #[test]
    fn test_wrong_server_signature_rejected() {
        let mut client = ScramClient::with_nonce("user", "pencil", NONCE.to_string());
        client.process_server_first(SERVER_FIRST.as_bytes()).unwrap();
        let err = client
            .verify_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref e) if e.kind == ConnectionErrorKind::Authentication
        ));
    }

    #[test]
    fn test_foreign_nonce_rejected() {
        let mut client = ScramClient::with_nonce("user", "pencil", NONCE.to_string());
        let err = client
            .process_server_first(b"r=somebodyelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_saslname_escaping() {
        assert_eq!(saslname("a=b,c"), "a=3Db=2Cc");
    }
}
