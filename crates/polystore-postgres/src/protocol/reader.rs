//! Backend message decoding.

use super::{
    BackendMessage, ErrorFields, FieldDescription, TransactionStatus, backend_type,
    protocol_error,
};
use polystore_core::Error;

/// Big-endian cursor over a message body.
#[derive(Debug)]
pub struct BodyReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(protocol_error(format!(
                "message truncated: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i16(&mut self) -> Result<i16, Error> {
        self.array().map(i16::from_be_bytes)
    }

    pub fn i32(&mut self) -> Result<i32, Error> {
        self.array().map(i32::from_be_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        self.array().map(u32::from_be_bytes)
    }

    /// NUL-terminated string; the terminator is required.
    pub fn cstr(&mut self) -> Result<String, Error> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| protocol_error("unterminated string in message"))?;
        self.pos += end + 1;
        Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}

fn parse_error_fields(body: &[u8]) -> Result<ErrorFields, Error> {
    let mut reader = BodyReader::new(body);
    let mut fields = ErrorFields::default();
    loop {
        let code = reader.u8()?;
        if code == 0 {
            return Ok(fields);
        }
        let value = reader.cstr()?;
        match code {
            b'S' if fields.severity.is_empty() => fields.severity = value,
            // non-localized severity wins over the localized one
            b'V' => fields.severity = value,
            b'C' => fields.code = value,
            b'M' => fields.message = value,
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            b'P' => fields.position = value.parse().ok(),
            _ => {}
        }
    }
}

fn parse_authentication(body: &[u8]) -> Result<BackendMessage, Error> {
    let mut reader = BodyReader::new(body);
    let message = match reader.i32()? {
        0 => BackendMessage::AuthenticationOk,
        3 => BackendMessage::AuthenticationCleartextPassword,
        5 => BackendMessage::AuthenticationMd5Password(reader.array()?),
        10 => {
            let mut mechanisms = Vec::new();
            loop {
                let name = reader.cstr()?;
                if name.is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            BackendMessage::AuthenticationSasl(mechanisms)
        }
        11 => BackendMessage::AuthenticationSaslContinue(reader.rest().to_vec()),
        12 => BackendMessage::AuthenticationSaslFinal(reader.rest().to_vec()),
        other => BackendMessage::AuthenticationUnsupported(other),
    };
    Ok(message)
}

/// Decode one backend message from its type byte and body.
#[allow(clippy::cast_sign_loss)]
pub fn parse_backend_message(tag: u8, body: &[u8]) -> Result<BackendMessage, Error> {
    let mut reader = BodyReader::new(body);
    let message = match tag {
        backend_type::AUTHENTICATION => return parse_authentication(body),
        backend_type::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: reader.i32()?,
            secret_key: reader.i32()?,
        },
        backend_type::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: reader.cstr()?,
            value: reader.cstr()?,
        },
        backend_type::READY_FOR_QUERY => {
            BackendMessage::ReadyForQuery(TransactionStatus::from_byte(reader.u8()?)?)
        }
        backend_type::PARSE_COMPLETE => BackendMessage::ParseComplete,
        backend_type::BIND_COMPLETE => BackendMessage::BindComplete,
        backend_type::CLOSE_COMPLETE => BackendMessage::CloseComplete,
        backend_type::NO_DATA => BackendMessage::NoData,
        backend_type::EMPTY_QUERY => BackendMessage::EmptyQueryResponse,
        backend_type::PORTAL_SUSPENDED => BackendMessage::PortalSuspended,
        backend_type::PARAMETER_DESCRIPTION => {
            let count = reader.i16()?;
            let mut oids = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                oids.push(reader.u32()?);
            }
            BackendMessage::ParameterDescription(oids)
        }
        backend_type::ROW_DESCRIPTION => {
            let count = reader.i16()?;
            let mut fields = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                fields.push(FieldDescription {
                    name: reader.cstr()?,
                    table_oid: reader.u32()?,
                    column_id: reader.i16()?,
                    type_oid: reader.u32()?,
                    type_size: reader.i16()?,
                    type_modifier: reader.i32()?,
                    format: reader.i16()?,
                });
            }
            BackendMessage::RowDescription(fields)
        }
        backend_type::DATA_ROW => {
            let count = reader.i16()?;
            let mut values = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let len = reader.i32()?;
                if len < 0 {
                    values.push(None);
                } else {
                    values.push(Some(reader.bytes(len as usize)?.to_vec()));
                }
            }
            BackendMessage::DataRow(values)
        }
        backend_type::COMMAND_COMPLETE => BackendMessage::CommandComplete(reader.cstr()?),
        backend_type::ERROR_RESPONSE => BackendMessage::ErrorResponse(parse_error_fields(body)?),
        backend_type::NOTICE_RESPONSE => BackendMessage::NoticeResponse(parse_error_fields(body)?),
        backend_type::NOTIFICATION => {
            let _pid = reader.i32()?;
            BackendMessage::NotificationResponse {
                channel: reader.cstr()?,
                payload: reader.cstr()?,
            }
        }
        other => {
            return Err(protocol_error(format!(
                "unexpected backend message type '{}'",
                char::from(other)
            )));
        }
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authentication_requests() {
        assert_eq!(
            parse_backend_message(b'R', &[0, 0, 0, 0]).unwrap(),
            BackendMessage::AuthenticationOk
        );
        assert_eq!(
            parse_backend_message(b'R', &[0, 0, 0, 5, 1, 2, 3, 4]).unwrap(),
            BackendMessage::AuthenticationMd5Password([1, 2, 3, 4])
        );
        let mut sasl = vec![0, 0, 0, 10];
        sasl.extend_from_slice(b"SCRAM-SHA-256\0SCRAM-SHA-256-PLUS\0\0");
        assert_eq!(
            parse_backend_message(b'R', &sasl).unwrap(),
            BackendMessage::AuthenticationSasl(vec![
                String::from("SCRAM-SHA-256"),
                String::from("SCRAM-SHA-256-PLUS")
            ])
        );
        assert_eq!(
            parse_backend_message(b'R', &[0, 0, 0, 7]).unwrap(),
            BackendMessage::AuthenticationUnsupported(7)
        );
    }

    #[test]
    fn test_parse_row_description_and_data_row() {
        let mut body = vec![0, 1];
        body.extend_from_slice(b"id\0");
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        body.extend_from_slice(&20u32.to_be_bytes());
        body.extend_from_slice(&8i16.to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        let BackendMessage::RowDescription(fields) = parse_backend_message(b'T', &body).unwrap()
        else {
            panic!("expected RowDescription");
        };
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[0].type_oid, 20);

        let mut row = vec![0, 2];
        row.extend_from_slice(&2i32.to_be_bytes());
        row.extend_from_slice(b"42");
        row.extend_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            parse_backend_message(b'D', &row).unwrap(),
            BackendMessage::DataRow(vec![Some(b"42".to_vec()), None])
        );
    }

    #[test]
    fn test_parse_error_response() {
        let body = b"SERROR\0VERROR\0C23505\0Mduplicate key value\0Dkey (name)=(a) exists\0\0";
        let BackendMessage::ErrorResponse(fields) = parse_backend_message(b'E', body).unwrap()
        else {
            panic!("expected ErrorResponse");
        };
        assert_eq!(fields.code, "23505");
        assert_eq!(fields.severity, "ERROR");
        assert_eq!(fields.message, "duplicate key value");
        assert_eq!(fields.detail.as_deref(), Some("key (name)=(a) exists"));
    }

    #[test]
    fn test_ready_for_query_and_command_complete() {
        assert_eq!(
            parse_backend_message(b'Z', b"I").unwrap(),
            BackendMessage::ReadyForQuery(TransactionStatus::Idle)
        );
        assert_eq!(
            parse_backend_message(b'C', b"INSERT 0 1\0").unwrap(),
            BackendMessage::CommandComplete(String::from("INSERT 0 1"))
        );
    }

    #[test]
    fn test_truncated_and_unknown_messages() {
        assert!(parse_backend_message(b'K', &[0, 0]).is_err());
        assert!(parse_backend_message(b'?', &[]).is_err());
    }
}
