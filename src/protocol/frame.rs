//! Wire frames and synthesized messages
//!
//! A [`Frame`] pairs the exact bytes a message occupied on the wire with a
//! decoded view of the fields the proxy dispatches on. Serialization is the
//! identity: forwarding a frame writes back the same bytes that were read,
//! so messages the proxy does not understand pass through untouched.
//!
//! Constructors at the bottom build the messages the proxy injects itself:
//! the rewritten startup packet, password responses, ready-for-query
//! markers, and synthesized error responses.

use crate::error::{ProxyError, Result};
use crate::protocol::auth::compute_md5_password;
use crate::protocol::constants::*;

/// Backend transaction status reported in ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block ('I')
    Idle,
    /// Inside a transaction block ('T')
    InTransaction,
    /// Inside a failed transaction block ('E')
    Failed,
}

impl TransactionStatus {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            TXN_STATUS_IDLE => Some(Self::Idle),
            TXN_STATUS_IN_TRANSACTION => Some(Self::InTransaction),
            TXN_STATUS_FAILED => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Idle => TXN_STATUS_IDLE,
            Self::InTransaction => TXN_STATUS_IN_TRANSACTION,
            Self::Failed => TXN_STATUS_FAILED,
        }
    }
}

/// Decoded view of a frame, tagged by message type.
///
/// Only the messages the filter pipelines act on get structured fields;
/// everything else is `Opaque` and is forwarded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Startup packet: ordered parameter name/value pairs
    Startup { parameters: Vec<(String, String)> },
    /// Cancel request carrying the key data of the session to cancel
    Cancel { process_id: u32, secret_key: u32 },
    /// TLS negotiation request
    SslRequest,
    /// Password response ('p')
    Password { digest: String },
    /// Simple query ('Q'); trailing NUL terminators stripped
    Query { sql: String },
    /// Extended-protocol prepare ('P'); contents are not inspected
    Parse,
    /// Client connection close ('X')
    Terminate,
    /// Close statement/portal ('C')
    Close { target: u8, name: String },
    /// Authentication request ('R'); salt present for MD5 challenges
    Authentication { status: u32, salt: Option<[u8; 4]> },
    /// Server parameter report ('S')
    ParameterStatus { name: String, value: String },
    /// Cancellation key data ('K')
    BackendKeyData { process_id: u32, secret_key: u32 },
    /// Ready for query ('Z')
    ReadyForQuery { status: TransactionStatus },
    /// Error response ('E'): ordered (field code, value) pairs
    ErrorResponse { fields: Vec<(u8, String)> },
    /// Recognized framing, uninspected body
    Opaque,
}

/// A single protocol message: exact wire bytes plus the decoded kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    bytes: Vec<u8>,
    tag: Option<u8>,
    kind: FrameKind,
}

impl Frame {
    pub(crate) fn new(bytes: Vec<u8>, tag: Option<u8>, kind: FrameKind) -> Self {
        Self { bytes, tag, kind }
    }

    /// One-byte type tag; `None` for startup-family frames and the raw
    /// SSL-denial byte, which carry no tag.
    pub fn tag(&self) -> Option<u8> {
        self.tag
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    /// The exact bytes this frame occupies on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Startup parameter lookup (first match).
    pub fn startup_parameter(&self, name: &str) -> Option<&str> {
        match &self.kind {
            FrameKind::Startup { parameters } => parameters
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Error/notice field lookup (first match).
    pub fn error_field(&self, code: u8) -> Option<&str> {
        match &self.kind {
            FrameKind::ErrorResponse { fields } => fields
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Name of this frame for logging, honoring the direction it was read
    /// from when the tag byte is ambiguous.
    pub fn name(&self, frontend: bool) -> &'static str {
        match (&self.kind, self.tag) {
            (FrameKind::Startup { .. }, _) => "Startup",
            (FrameKind::Cancel { .. }, _) => "CancelRequest",
            (FrameKind::SslRequest, _) => "SSLRequest",
            (_, Some(tag)) if frontend => frontend_message_name(tag),
            (_, Some(tag)) => backend_message_name(tag),
            _ => "Raw",
        }
    }
}

// ============================================================================
// Body decoding
// ============================================================================

/// Decode a frontend frame body (bytes after the tag and length header).
pub(crate) fn decode_frontend(tag: u8, body: &[u8]) -> Result<FrameKind> {
    let kind = match tag {
        MSG_PASSWORD => FrameKind::Password {
            digest: read_str(body, &mut 0)?,
        },
        MSG_QUERY => {
            let mut sql = String::from_utf8_lossy(body).into_owned();
            while sql.ends_with('\0') {
                sql.pop();
            }
            FrameKind::Query { sql }
        }
        MSG_PARSE => FrameKind::Parse,
        MSG_TERMINATE => FrameKind::Terminate,
        MSG_CLOSE => {
            let mut pos = 0;
            let target = read_u8(body, &mut pos)?;
            let name = read_str(body, &mut pos)?;
            FrameKind::Close { target, name }
        }
        _ => FrameKind::Opaque,
    };
    Ok(kind)
}

/// Decode a backend frame body.
pub(crate) fn decode_backend(tag: u8, body: &[u8]) -> Result<FrameKind> {
    let kind = match tag {
        MSG_AUTH_REQUEST => {
            let mut pos = 0;
            let status = read_u32(body, &mut pos)?;
            let salt = if status == AUTH_MD5_PASSWORD && body.len() >= 8 {
                let mut s = [0u8; 4];
                s.copy_from_slice(&body[4..8]);
                Some(s)
            } else {
                None
            };
            FrameKind::Authentication { status, salt }
        }
        MSG_PARAMETER_STATUS => {
            let mut pos = 0;
            let name = read_str(body, &mut pos)?;
            let value = read_str(body, &mut pos)?;
            FrameKind::ParameterStatus { name, value }
        }
        MSG_BACKEND_KEY_DATA => {
            let mut pos = 0;
            let process_id = read_u32(body, &mut pos)?;
            let secret_key = read_u32(body, &mut pos)?;
            FrameKind::BackendKeyData {
                process_id,
                secret_key,
            }
        }
        MSG_READY_FOR_QUERY => {
            let b = read_u8(body, &mut 0)?;
            let status = TransactionStatus::from_byte(b).ok_or_else(|| {
                ProxyError::Protocol(format!("unknown transaction status {:?}", b as char))
            })?;
            FrameKind::ReadyForQuery { status }
        }
        MSG_ERROR_RESPONSE => {
            let mut pos = 0;
            let mut fields = Vec::new();
            loop {
                let code = read_u8(body, &mut pos)?;
                if code == 0 {
                    break;
                }
                fields.push((code, read_str(body, &mut pos)?));
            }
            FrameKind::ErrorResponse { fields }
        }
        _ => FrameKind::Opaque,
    };
    Ok(kind)
}

/// Decode a startup-family body (bytes after the 8-byte special header),
/// already classified by code.
pub(crate) fn decode_special(code: u32, body: &[u8]) -> Result<FrameKind> {
    if code == SSL_REQUEST_CODE {
        return Ok(FrameKind::SslRequest);
    }
    if code == CANCEL_REQUEST_CODE {
        let mut pos = 0;
        return Ok(FrameKind::Cancel {
            process_id: read_u32(body, &mut pos)?,
            secret_key: read_u32(body, &mut pos)?,
        });
    }
    // Startup: NUL-separated name/value pairs, empty name terminates.
    let mut pos = 0;
    let mut parameters = Vec::new();
    while pos < body.len() {
        let name = read_str(body, &mut pos)?;
        if name.is_empty() {
            break;
        }
        let value = read_str(body, &mut pos)?;
        parameters.push((name, value));
    }
    Ok(FrameKind::Startup { parameters })
}

fn read_u8(body: &[u8], pos: &mut usize) -> Result<u8> {
    let b = body
        .get(*pos)
        .copied()
        .ok_or_else(|| ProxyError::Protocol("truncated frame body".to_string()))?;
    *pos += 1;
    Ok(b)
}

fn read_u32(body: &[u8], pos: &mut usize) -> Result<u32> {
    if body.len() < *pos + 4 {
        return Err(ProxyError::Protocol("truncated frame body".to_string()));
    }
    let v = u32::from_be_bytes([body[*pos], body[*pos + 1], body[*pos + 2], body[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

/// Read a NUL-terminated string; a missing terminator takes the rest of the
/// body (password frames from some drivers omit it).
fn read_str(body: &[u8], pos: &mut usize) -> Result<String> {
    let rest = &body[(*pos).min(body.len())..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let s = String::from_utf8_lossy(&rest[..end]).into_owned();
    *pos += end + 1;
    Ok(s)
}

// ============================================================================
// Synthesized messages
// ============================================================================

fn tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5 + body.len());
    bytes.push(tag);
    bytes.extend_from_slice(&(4 + body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(body);
    bytes
}

impl Frame {
    /// Build a protocol 3.0 startup packet carrying exactly a user and a
    /// database name.
    pub fn startup(user: &str, database: &str) -> Self {
        let mut params = Vec::new();
        for (name, value) in [("user", user), ("database", database)] {
            params.extend_from_slice(name.as_bytes());
            params.push(0);
            params.extend_from_slice(value.as_bytes());
            params.push(0);
        }
        params.push(0);

        let mut bytes = Vec::with_capacity(8 + params.len());
        bytes.extend_from_slice(&(8 + params.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&PROTOCOL_VERSION_3_0.to_be_bytes());
        bytes.extend_from_slice(&params);

        Self::new(
            bytes,
            None,
            FrameKind::Startup {
                parameters: vec![
                    ("user".to_string(), user.to_string()),
                    ("database".to_string(), database.to_string()),
                ],
            },
        )
    }

    /// Build a password response frame from an already-computed digest.
    pub fn password(digest: &str) -> Self {
        let mut body = digest.as_bytes().to_vec();
        body.push(0);
        Self::new(
            tagged(MSG_PASSWORD, &body),
            Some(MSG_PASSWORD),
            FrameKind::Password {
                digest: digest.to_string(),
            },
        )
    }

    /// Build a password response answering an MD5 challenge.
    pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> Self {
        Self::password(&compute_md5_password(user, password, salt))
    }

    /// Build a simple query frame.
    pub fn query(sql: &str) -> Self {
        let mut body = sql.as_bytes().to_vec();
        body.push(0);
        Self::new(
            tagged(MSG_QUERY, &body),
            Some(MSG_QUERY),
            FrameKind::Query {
                sql: sql.to_string(),
            },
        )
    }

    /// Build a ready-for-query frame with the given status.
    pub fn ready_for_query(status: TransactionStatus) -> Self {
        Self::new(
            tagged(MSG_READY_FOR_QUERY, &[status.to_byte()]),
            Some(MSG_READY_FOR_QUERY),
            FrameKind::ReadyForQuery { status },
        )
    }

    /// Build a FATAL error response with the given SQLSTATE and message.
    pub fn error_response(sqlstate: &str, message: &str) -> Self {
        let fields = vec![
            (ERROR_FIELD_SEVERITY, "FATAL".to_string()),
            (ERROR_FIELD_CODE, sqlstate.to_string()),
            (ERROR_FIELD_MESSAGE, message.to_string()),
        ];
        let mut body = Vec::new();
        for (code, value) in &fields {
            body.push(*code);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        body.push(0);
        Self::new(
            tagged(MSG_ERROR_RESPONSE, &body),
            Some(MSG_ERROR_RESPONSE),
            FrameKind::ErrorResponse { fields },
        )
    }

    /// Build the standard authentication-failure error for a user.
    pub fn auth_error(user: &str) -> Self {
        Self::error_response(
            SQLSTATE_INVALID_AUTHORIZATION,
            &format!("password authentication failed for user \"{}\"", user),
        )
    }

    /// The single-byte reply declining an SSLRequest. Not a tagged frame.
    pub fn ssl_deny() -> Self {
        Self::new(vec![MSG_NOTICE_RESPONSE], None, FrameKind::Opaque)
    }

    /// Build a terminate frame.
    pub fn terminate() -> Self {
        Self::new(tagged(MSG_TERMINATE, &[]), Some(MSG_TERMINATE), FrameKind::Terminate)
    }
}
