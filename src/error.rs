use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Result type used across this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, OS, etc.).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Truncated or malformed packet.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// Truncated or malformed packet (with formatted detail).
    #[error("protocol error: {0}")]
    ProtocolOwned(String),

    /// RMCP message class other than IPMI (ASF, OEM, ...).
    #[error("unsupported RMCP class: {0:#04x}")]
    UnsupportedClass(u8),

    /// Session authentication type this emulator never issues.
    #[error("unsupported authentication type: {0:#04x}")]
    UnsupportedAuthType(u8),

    /// NetFn/command pair without a handler.
    #[error("unsupported command: netfn {netfn:#04x}, cmd {cmd:#04x}")]
    UnsupportedCommand {
        /// Network function of the request.
        netfn: u8,
        /// Command number of the request.
        cmd: u8,
    },

    /// Message references a managed system session id that is not live.
    #[error("session {0:#010x} hasn't been activated")]
    UnknownSession(u32),

    /// Open Session refused because the session table is full.
    #[error("session limit of {0} reached")]
    SessionLimit(usize),

    /// RAKP message 1 named a user that is not configured.
    #[error("user not found")]
    UserNotFound,

    /// RAKP or packet integrity verification failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Cryptographic failure (invalid key sizes, decrypt failure, etc.).
    #[error("crypto error: {0}")]
    Crypto(&'static str),

    /// Power action redundant with (or impossible in) the current power state.
    #[error("power state conflict: {0}")]
    StateConflict(&'static str),

    /// The machine backend failed to carry out a power action.
    #[error("machine error: {0}")]
    Machine(String),

    /// No configured BMC network contains the address.
    #[error("no BMC network contains {0}")]
    NoBmcNetwork(Ipv4Addr),

    /// Adding the BMC address to its bridge failed.
    #[error("address binding failed: {0}")]
    Binding(String),

    /// Registration event for a node the server does not know.
    #[error("unknown serial: {0}")]
    UnknownSerial(String),

    /// Invalid caller-supplied argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl Error {
    pub(crate) fn protocol_owned(msg: impl Into<String>) -> Self {
        Self::ProtocolOwned(msg.into())
    }

    /// Wrap a backend failure reported by a [`crate::Machine`] implementation.
    pub fn machine(msg: impl Into<String>) -> Self {
        Self::Machine(msg.into())
    }

    /// RMCP+ status code reported back to the console when a handshake step fails.
    pub(crate) fn rmcpplus_status_code(&self) -> u8 {
        match self {
            Self::UnknownSession(_) => 0x02,
            Self::UserNotFound => 0x0D,
            Self::AuthenticationFailed(_) => 0x0F,
            Self::InvalidArgument(_) => 0x12,
            _ => 0x01,
        }
    }
}
