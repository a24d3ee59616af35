//! Result codec for the boundary call surface.
//!
//! Every fallible entry point returns a single self-describing byte buffer:
//! byte 0 is a tag (0 = success, nonzero = error kind), the remaining bytes
//! are the raw payload on success or a UTF-8 message on error. The caller on
//! the far side of the boundary reads the tag and then reads to end of
//! buffer, so the encoding needs no length framing.
//!
//! The error taxonomy is deliberately coarse: a query failure and an execute
//! failure are the only kinds a test can recover from and assert on. Anything
//! else is a broken fixture and travels on the fatal channel instead (an
//! `anyhow::Error` in the embedded API, a process abort at the C boundary).

use std::fmt;

/// Tag byte for a successful result.
pub const TAG_OK: u8 = 0;
/// Tag byte for a failed query (missing route or route-reported failure).
pub const TAG_QUERY_ERROR: u8 = 1;
/// Tag byte for a failed execution (sudo, simulate, param get/set).
pub const TAG_EXECUTE_ERROR: u8 = 2;

/// Recoverable error kinds reported through the result buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A query could not be routed or the route reported failure.
    Query,
    /// A privileged execution, simulation, or param operation failed.
    Execute,
}

impl ErrorKind {
    /// The wire tag for this kind.
    pub fn tag(self) -> u8 {
        match self {
            ErrorKind::Query => TAG_QUERY_ERROR,
            ErrorKind::Execute => TAG_EXECUTE_ERROR,
        }
    }

    /// Map a wire tag back to a kind. Unknown nonzero tags are not a kind.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_QUERY_ERROR => Some(ErrorKind::Query),
            TAG_EXECUTE_ERROR => Some(ErrorKind::Execute),
            _ => None,
        }
    }
}

/// Typed view of a decoded error buffer, for Rust-side callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The query route was missing or reported failure.
    QueryError {
        /// Human-readable failure message.
        msg: String,
    },
    /// Privileged execution, simulation, or a param operation failed.
    ExecuteError {
        /// Human-readable failure message.
        msg: String,
    },
    /// The buffer did not decode as either a success or a known error kind.
    Malformed {
        /// Description of what was wrong with the buffer.
        msg: String,
    },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::QueryError { msg } => write!(f, "query error: {msg}"),
            RunnerError::ExecuteError { msg } => write!(f, "execute error: {msg}"),
            RunnerError::Malformed { msg } => write!(f, "malformed result buffer: {msg}"),
        }
    }
}

impl std::error::Error for RunnerError {}

/// Encode a success payload. The payload may be empty.
pub fn encode_ok(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(TAG_OK);
    buf.extend_from_slice(payload);
    buf
}

/// Encode an error of the given kind with a human-readable message.
pub fn encode_err(kind: ErrorKind, msg: impl fmt::Display) -> Vec<u8> {
    let msg = msg.to_string();
    let mut buf = Vec::with_capacity(1 + msg.len());
    buf.push(kind.tag());
    buf.extend_from_slice(msg.as_bytes());
    buf
}

/// Decode a result buffer into the payload or a typed error.
///
/// Round-trips with [`encode_ok`] and [`encode_err`]: the payload bytes come
/// back exactly, and an error yields its kind and message.
pub fn decode(buf: &[u8]) -> Result<Vec<u8>, RunnerError> {
    let Some((&tag, body)) = buf.split_first() else {
        return Err(RunnerError::Malformed {
            msg: "empty buffer".to_string(),
        });
    };
    if tag == TAG_OK {
        return Ok(body.to_vec());
    }
    let msg = String::from_utf8_lossy(body).into_owned();
    match ErrorKind::from_tag(tag) {
        Some(ErrorKind::Query) => Err(RunnerError::QueryError { msg }),
        Some(ErrorKind::Execute) => Err(RunnerError::ExecuteError { msg }),
        None => Err(RunnerError::Malformed {
            msg: format!("unknown tag {tag}"),
        }),
    }
}
