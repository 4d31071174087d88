//! Network error codes.
//!
//! Codes follow the well-known Chromium numbering so logs line up with
//! what servers and proxies report:
//!
//! ```text
//!     0- 99 System related errors
//!   100-199 Connection related errors
//!   300-399 HTTP errors
//!   800-899 DNS resolver errors
//! ```
//!
//! Codes are negative on the wire; [`NetError::code`] returns the signed value.

use std::fmt;

/// A network-level failure: no usable HTTP response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetError {
    /// A generic failure occurred.
    Failed,
    /// An operation was aborted.
    Aborted,
    /// An operation timed out.
    TimedOut,
    /// The content is too large.
    FileTooBig,
    /// Permission to access a resource, other than the network, was denied.
    AccessDenied,
    /// The network changed while the request was in flight.
    NetworkChanged,
    /// A connection was closed (TCP FIN).
    ConnectionClosed,
    /// A connection was reset (TCP RST).
    ConnectionReset,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A connection timed out as a result of not receiving an ACK.
    ConnectionAborted,
    /// A connection attempt failed.
    ConnectionFailed,
    /// The host name could not be resolved.
    NameNotResolved,
    /// The Internet connection has been lost.
    InternetDisconnected,
    /// The IP address is unreachable.
    AddressUnreachable,
    /// A connection attempt timed out.
    ConnectionTimedOut,
    /// The URL is invalid.
    InvalidUrl,
    /// The scheme of the URL is unknown.
    UnknownUrlScheme,
    /// Attempting to load a URL resulted in too many redirects.
    TooManyRedirects,
    /// Attempting to load a URL resulted in an unsafe redirect.
    UnsafeRedirect,
    /// The server's response was invalid.
    InvalidResponse,
    /// The server closed the connection without sending any data.
    EmptyResponse,
}

impl NetError {
    /// The signed numeric code.
    pub fn code(self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::TimedOut => -7,
            NetError::FileTooBig => -8,
            NetError::AccessDenied => -10,
            NetError::NetworkChanged => -21,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::AddressUnreachable => -109,
            NetError::ConnectionTimedOut => -118,
            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::TooManyRedirects => -310,
            NetError::UnsafeRedirect => -311,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
        }
    }

    /// Looks up an error by its signed code.
    pub fn from_code(code: i32) -> Option<Self> {
        ALL.iter().copied().find(|e| e.code() == code)
    }

    /// The `ERR_*` name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            NetError::Failed => "ERR_FAILED",
            NetError::Aborted => "ERR_ABORTED",
            NetError::TimedOut => "ERR_TIMED_OUT",
            NetError::FileTooBig => "ERR_FILE_TOO_BIG",
            NetError::AccessDenied => "ERR_ACCESS_DENIED",
            NetError::NetworkChanged => "ERR_NETWORK_CHANGED",
            NetError::ConnectionClosed => "ERR_CONNECTION_CLOSED",
            NetError::ConnectionReset => "ERR_CONNECTION_RESET",
            NetError::ConnectionRefused => "ERR_CONNECTION_REFUSED",
            NetError::ConnectionAborted => "ERR_CONNECTION_ABORTED",
            NetError::ConnectionFailed => "ERR_CONNECTION_FAILED",
            NetError::NameNotResolved => "ERR_NAME_NOT_RESOLVED",
            NetError::InternetDisconnected => "ERR_INTERNET_DISCONNECTED",
            NetError::AddressUnreachable => "ERR_ADDRESS_UNREACHABLE",
            NetError::ConnectionTimedOut => "ERR_CONNECTION_TIMED_OUT",
            NetError::InvalidUrl => "ERR_INVALID_URL",
            NetError::UnknownUrlScheme => "ERR_UNKNOWN_URL_SCHEME",
            NetError::TooManyRedirects => "ERR_TOO_MANY_REDIRECTS",
            NetError::UnsafeRedirect => "ERR_UNSAFE_REDIRECT",
            NetError::InvalidResponse => "ERR_INVALID_RESPONSE",
            NetError::EmptyResponse => "ERR_EMPTY_RESPONSE",
        }
    }

    /// Failures worth repeating: the connection, DNS or timing went wrong,
    /// not the request itself.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            NetError::Aborted
                | NetError::TimedOut
                | NetError::NetworkChanged
                | NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionRefused
                | NetError::ConnectionAborted
                | NetError::ConnectionFailed
                | NetError::NameNotResolved
                | NetError::InternetDisconnected
                | NetError::AddressUnreachable
                | NetError::ConnectionTimedOut
                | NetError::EmptyResponse
        )
    }

    /// Failures that prove the request never reached the server.
    pub fn is_server_unreached(self) -> bool {
        matches!(
            self,
            NetError::NameNotResolved
                | NetError::ConnectionRefused
                | NetError::AddressUnreachable
                | NetError::InternetDisconnected
                | NetError::ConnectionFailed
                | NetError::ConnectionTimedOut
        )
    }
}

const ALL: [NetError; 21] = [
    NetError::Failed,
    NetError::Aborted,
    NetError::TimedOut,
    NetError::FileTooBig,
    NetError::AccessDenied,
    NetError::NetworkChanged,
    NetError::ConnectionClosed,
    NetError::ConnectionReset,
    NetError::ConnectionRefused,
    NetError::ConnectionAborted,
    NetError::ConnectionFailed,
    NetError::NameNotResolved,
    NetError::InternetDisconnected,
    NetError::AddressUnreachable,
    NetError::ConnectionTimedOut,
    NetError::InvalidUrl,
    NetError::UnknownUrlScheme,
    NetError::TooManyRedirects,
    NetError::UnsafeRedirect,
    NetError::InvalidResponse,
    NetError::EmptyResponse,
];

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl std::error::Error for NetError {}
