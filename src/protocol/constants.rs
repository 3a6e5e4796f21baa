//! PostgreSQL protocol constants
//!
//! Constants for the parts of the wire protocol version 3.0 this proxy
//! inspects. Reference: <https://www.postgresql.org/docs/current/protocol.html>

// ============================================================================
// Protocol Version
// ============================================================================

/// PostgreSQL protocol version 3.0 (major=3, minor=0)
/// Encoded as (major << 16) | minor = 196608
pub const PROTOCOL_VERSION_3_0: u32 = 196608;

// ============================================================================
// Special Request Codes (used in startup-like messages)
// ============================================================================

/// SSL request code - sent instead of StartupMessage to request SSL
/// Value: 80877103 (0x04D2162F)
pub const SSL_REQUEST_CODE: u32 = 80877103;

/// Cancel request code - sent to cancel a running query
/// Value: 80877102 (0x04D2162E)
pub const CANCEL_REQUEST_CODE: u32 = 80877102;

/// Check whether a special-frame code is a protocol 3.x startup request.
/// Major version must be 3 and the minor version below 2.
#[inline]
pub fn is_startup_code(code: u32) -> bool {
    (code >> 16) == 3 && (code & 0xffff) < 2
}

// ============================================================================
// Frontend Message Types (client -> server)
// ============================================================================

/// Password message ('p') - sends the password digest
pub const MSG_PASSWORD: u8 = b'p';

/// Simple query ('Q') - executes a SQL query string
pub const MSG_QUERY: u8 = b'Q';

/// Terminate ('X') - client requests connection close
pub const MSG_TERMINATE: u8 = b'X';

/// Parse ('P') - prepare a statement (extended query protocol)
pub const MSG_PARSE: u8 = b'P';

/// Bind ('B') - bind parameters to prepared statement
pub const MSG_BIND: u8 = b'B';

/// Execute ('E') - execute a prepared statement
pub const MSG_EXECUTE: u8 = b'E';

/// Describe ('D') - request description of statement or portal
pub const MSG_DESCRIBE: u8 = b'D';

/// Sync ('S') - sync point in extended query protocol
pub const MSG_SYNC: u8 = b'S';

/// Close ('C') - close a prepared statement or portal
pub const MSG_CLOSE: u8 = b'C';

// ============================================================================
// Backend Message Types (server -> client)
// ============================================================================

/// Authentication request ('R') - various auth-related messages
pub const MSG_AUTH_REQUEST: u8 = b'R';

/// Backend key data ('K') - process ID and secret key for cancellation
pub const MSG_BACKEND_KEY_DATA: u8 = b'K';

/// Parameter status ('S') - server configuration parameter
pub const MSG_PARAMETER_STATUS: u8 = b'S';

/// Ready for query ('Z') - server is ready for a new query
pub const MSG_READY_FOR_QUERY: u8 = b'Z';

/// Row description ('T') - describes columns in query result
pub const MSG_ROW_DESCRIPTION: u8 = b'T';

/// Data row ('D') - a row of query result data
pub const MSG_DATA_ROW: u8 = b'D';

/// Command complete ('C') - query execution complete
pub const MSG_COMMAND_COMPLETE: u8 = b'C';

/// Empty query response ('I') - query string was empty
pub const MSG_EMPTY_QUERY: u8 = b'I';

/// Error response ('E') - error occurred
pub const MSG_ERROR_RESPONSE: u8 = b'E';

/// Notice response ('N') - warning or informational message
pub const MSG_NOTICE_RESPONSE: u8 = b'N';

// ============================================================================
// Authentication Types (subtypes of 'R' message)
// ============================================================================

/// Authentication OK - authentication successful
pub const AUTH_OK: u32 = 0;

/// Cleartext password required
pub const AUTH_CLEARTEXT_PASSWORD: u32 = 3;

/// MD5 password required (includes 4-byte salt)
pub const AUTH_MD5_PASSWORD: u32 = 5;

// ============================================================================
// Error/Notice Field Types
// ============================================================================

/// Severity - ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
pub const ERROR_FIELD_SEVERITY: u8 = b'S';

/// SQLSTATE code - 5-character error code
pub const ERROR_FIELD_CODE: u8 = b'C';

/// Message - primary human-readable error message
pub const ERROR_FIELD_MESSAGE: u8 = b'M';

/// File - source file where error was reported
pub const ERROR_FIELD_FILE: u8 = b'F';

/// Line - source line number
pub const ERROR_FIELD_LINE: u8 = b'L';

/// Routine - source function name
pub const ERROR_FIELD_ROUTINE: u8 = b'R';

// ============================================================================
// Transaction Status (in ReadyForQuery message)
// ============================================================================

/// Idle - not in a transaction block
pub const TXN_STATUS_IDLE: u8 = b'I';

/// In transaction - inside a transaction block
pub const TXN_STATUS_IN_TRANSACTION: u8 = b'T';

/// Failed transaction - inside a failed transaction block
pub const TXN_STATUS_FAILED: u8 = b'E';

// ============================================================================
// Common SQLSTATE Codes (for proxy-generated errors)
// ============================================================================

/// Invalid authorization specification
pub const SQLSTATE_INVALID_AUTHORIZATION: &str = "28000";

/// Protocol violation
pub const SQLSTATE_PROTOCOL_VIOLATION: &str = "08P01";

// ============================================================================
// Helper Functions
// ============================================================================

/// Get a human-readable name for a backend (server->client) message type.
///
/// Note: Some message type bytes are shared between frontend and backend.
/// This function returns the backend interpretation.
pub fn backend_message_name(msg_type: u8) -> &'static str {
    match msg_type {
        MSG_AUTH_REQUEST => "Authentication",
        MSG_BACKEND_KEY_DATA => "BackendKeyData",
        MSG_PARAMETER_STATUS => "ParameterStatus",
        MSG_READY_FOR_QUERY => "ReadyForQuery",
        MSG_ROW_DESCRIPTION => "RowDescription",
        MSG_DATA_ROW => "DataRow",
        MSG_COMMAND_COMPLETE => "CommandComplete",
        MSG_EMPTY_QUERY => "EmptyQueryResponse",
        MSG_ERROR_RESPONSE => "ErrorResponse",
        MSG_NOTICE_RESPONSE => "NoticeResponse",
        _ => "Unknown",
    }
}

/// Get a human-readable name for a frontend (client->server) message type.
///
/// Note: Some message type bytes are shared between frontend and backend.
/// This function returns the frontend interpretation.
pub fn frontend_message_name(msg_type: u8) -> &'static str {
    match msg_type {
        MSG_PASSWORD => "Password",
        MSG_QUERY => "Query",
        MSG_TERMINATE => "Terminate",
        MSG_PARSE => "Parse",
        MSG_BIND => "Bind",
        MSG_EXECUTE => "Execute",
        MSG_DESCRIBE => "Describe",
        MSG_SYNC => "Sync",
        MSG_CLOSE => "Close",
        _ => "Unknown",
    }
}
