//! Frontend message encoding.
//!
//! Messages are appended to one buffer so that a whole extended-query
//! round (`Parse` .. `Sync`) goes out in a single write.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use super::{DescribeKind, PROTOCOL_VERSION, frontend_type};

#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Hand out the encoded bytes and reset the buffer.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Append `tag`, a length placeholder, the body, then patch the length.
    fn message(&mut self, tag: Option<u8>, body: impl FnOnce(&mut Vec<u8>)) -> &mut Self {
        if let Some(tag) = tag {
            self.buf.push(tag);
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(&[0; 4]);
        body(&mut self.buf);
        let len = (self.buf.len() - start) as i32;
        self.buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
        self
    }

    pub fn startup(&mut self, params: &[(&str, &str)]) -> &mut Self {
        self.message(None, |b| {
            b.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
            for (key, value) in params {
                put_cstr(b, key);
                put_cstr(b, value);
            }
            b.push(0);
        })
    }

    /// Cleartext or MD5 password.
    pub fn password(&mut self, password: &str) -> &mut Self {
        self.message(Some(frontend_type::PASSWORD), |b| put_cstr(b, password))
    }

    pub fn sasl_initial_response(&mut self, mechanism: &str, data: &[u8]) -> &mut Self {
        self.message(Some(frontend_type::PASSWORD), |b| {
            put_cstr(b, mechanism);
            b.extend_from_slice(&(data.len() as i32).to_be_bytes());
            b.extend_from_slice(data);
        })
    }

    pub fn sasl_response(&mut self, data: &[u8]) -> &mut Self {
        self.message(Some(frontend_type::PASSWORD), |b| b.extend_from_slice(data))
    }

    pub fn query(&mut self, sql: &str) -> &mut Self {
        self.message(Some(frontend_type::QUERY), |b| put_cstr(b, sql))
    }

    pub fn parse(&mut self, name: &str, sql: &str, param_types: &[u32]) -> &mut Self {
        self.message(Some(frontend_type::PARSE), |b| {
            put_cstr(b, name);
            put_cstr(b, sql);
            b.extend_from_slice(&(param_types.len() as i16).to_be_bytes());
            for oid in param_types {
                b.extend_from_slice(&oid.to_be_bytes());
            }
        })
    }

    /// Bind with every parameter and every result column in text format.
    pub fn bind(&mut self, portal: &str, statement: &str, params: &[Option<Vec<u8>>]) -> &mut Self {
        self.message(Some(frontend_type::BIND), |b| {
            put_cstr(b, portal);
            put_cstr(b, statement);
            b.extend_from_slice(&0i16.to_be_bytes());
            b.extend_from_slice(&(params.len() as i16).to_be_bytes());
            for param in params {
                match param {
                    Some(data) => {
                        b.extend_from_slice(&(data.len() as i32).to_be_bytes());
                        b.extend_from_slice(data);
                    }
                    None => b.extend_from_slice(&(-1i32).to_be_bytes()),
                }
            }
            b.extend_from_slice(&0i16.to_be_bytes());
        })
    }

    pub fn describe(&mut self, kind: DescribeKind, name: &str) -> &mut Self {
        self.message(Some(frontend_type::DESCRIBE), |b| {
            b.push(kind.as_byte());
            put_cstr(b, name);
        })
    }

    /// Execute a portal; `max_rows == 0` fetches everything.
    pub fn execute(&mut self, portal: &str, max_rows: i32) -> &mut Self {
        self.message(Some(frontend_type::EXECUTE), |b| {
            put_cstr(b, portal);
            b.extend_from_slice(&max_rows.to_be_bytes());
        })
    }

    pub fn close(&mut self, kind: DescribeKind, name: &str) -> &mut Self {
        self.message(Some(frontend_type::CLOSE), |b| {
            b.push(kind.as_byte());
            put_cstr(b, name);
        })
    }

    pub fn sync(&mut self) -> &mut Self {
        self.message(Some(frontend_type::SYNC), |_| {})
    }

    pub fn terminate(&mut self) -> &mut Self {
        self.message(Some(frontend_type::TERMINATE), |_| {})
    }
}

fn put_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_message() {
        let mut w = MessageWriter::new();
        w.startup(&[("user", "app")]);
        let bytes = w.take();
        let len = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len());
        assert_eq!(&bytes[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&bytes[8..], b"user\0app\0\0");
    }

    #[test]
    fn test_sync_and_terminate() {
        let mut w = MessageWriter::new();
        w.sync().terminate();
        assert_eq!(w.take(), vec![b'S', 0, 0, 0, 4, b'X', 0, 0, 0, 4]);
        assert!(w.as_bytes().is_empty());
    }

    #[test]
    fn test_query_message() {
        let mut w = MessageWriter::new();
        w.query("SELECT 1");
        assert_eq!(w.take(), b"Q\0\0\0\x0dSELECT 1\0".to_vec());
    }

    #[test]
    fn test_parse_message() {
        let mut w = MessageWriter::new();
        w.parse("", "SELECT $1", &[20]);
        let bytes = w.take();
        assert_eq!(bytes[0], b'P');
        let len = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        assert_eq!(len, bytes.len() - 1);
        assert!(bytes.ends_with(&[0, 1, 0, 0, 0, 20]));
    }

    #[test]
    fn test_bind_with_null() {
        let mut w = MessageWriter::new();
        w.bind("", "", &[Some(b"7".to_vec()), None]);
        let bytes = w.take();
        let body = &bytes[5..];
        // portal "", statement "", zero param formats, two params
        assert_eq!(&body[..6], &[0, 0, 0, 0, 0, 2]);
        assert_eq!(&body[6..11], &[0, 0, 0, 1, b'7']);
        assert_eq!(&body[11..15], &(-1i32).to_be_bytes());
        assert_eq!(&body[15..], &[0, 0]);
    }
}
