//! Core Error Types
//!
//! Every fallible runtime operation returns a [`CoreError`]. Callers branch on
//! [`CoreError::code`], which is stable across releases; the display text is
//! for humans only.

use crate::id::ActorId;
use std::fmt;
use thiserror::Error;

/// Stable numeric error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    ActorNotFound = 1001,
    PostmanNotFound = 1002,
    PostofficeNotRegistered = 1003,
    MailboxSend = 1004,
    MailboxReceive = 1005,
    MailboxClosed = 1006,
    CodecEncode = 1007,
    CodecDecode = 1008,
    AddressNotSupported = 1009,
    Channel = 1010,
    Cancelled = 1011,
    DeadlineExceeded = 1012,
    ActorAlreadyStarted = 1013,
    Configuration = 1014,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Symbolic name, suitable for logs and metrics labels
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ActorNotFound => "ACTOR_NOT_FOUND",
            ErrorCode::PostmanNotFound => "POSTMAN_NOT_FOUND",
            ErrorCode::PostofficeNotRegistered => "POSTOFFICE_NOT_REGISTERED",
            ErrorCode::MailboxSend => "MAILBOX_SEND_ERROR",
            ErrorCode::MailboxReceive => "MAILBOX_RECEIVE_ERROR",
            ErrorCode::MailboxClosed => "MAILBOX_CLOSED",
            ErrorCode::CodecEncode => "CODEC_ENCODE_ERROR",
            ErrorCode::CodecDecode => "CODEC_DECODE_ERROR",
            ErrorCode::AddressNotSupported => "ADDRESS_NOT_SUPPORTED",
            ErrorCode::Channel => "CHANNEL_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::ActorAlreadyStarted => "ACTOR_ALREADY_STARTED",
            ErrorCode::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.as_u16())
    }
}

/// Main runtime error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Receiver is not registered with the postman that was asked
    #[error("Actor not found: {id}")]
    ActorNotFound { id: ActorId },

    /// Hash ring had no address for the receiver
    #[error("Postman not found for receiver {receiver}")]
    PostmanNotFound { receiver: ActorId },

    /// Postman has no postoffice to fall back on
    #[error("Postoffice not registered with postman {postman}")]
    PostofficeNotRegistered { postman: ActorId },

    #[error("Mailbox send error: {message}")]
    MailboxSend { message: String },

    #[error("Mailbox receive error: {message}")]
    MailboxReceive { message: String },

    /// Mailbox closed and drained
    #[error("Mailbox {mailbox} closed")]
    MailboxClosed { mailbox: ActorId },

    #[error("Codec encode error: {source}")]
    CodecEncode {
        #[source]
        source: codec::CodecError,
    },

    #[error("Codec decode error: {source}")]
    CodecDecode {
        #[source]
        source: codec::CodecError,
    },

    /// Registration target cannot accept this postman
    #[error("Address not supported: {message}")]
    AddressNotSupported { message: String },

    /// RPC channel failure
    #[error("Channel error ({endpoint}): {message}")]
    Channel {
        endpoint: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Deadline exceeded: {operation}")]
    DeadlineExceeded { operation: String },

    /// Actor's processing loop is already running
    #[error("Actor {id} already started")]
    ActorAlreadyStarted { id: ActorId },

    #[error("Configuration error: {message}")]
    Configuration { message: String, field: Option<String> },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::ActorNotFound { .. } => ErrorCode::ActorNotFound,
            CoreError::PostmanNotFound { .. } => ErrorCode::PostmanNotFound,
            CoreError::PostofficeNotRegistered { .. } => ErrorCode::PostofficeNotRegistered,
            CoreError::MailboxSend { .. } => ErrorCode::MailboxSend,
            CoreError::MailboxReceive { .. } => ErrorCode::MailboxReceive,
            CoreError::MailboxClosed { .. } => ErrorCode::MailboxClosed,
            CoreError::CodecEncode { .. } => ErrorCode::CodecEncode,
            CoreError::CodecDecode { .. } => ErrorCode::CodecDecode,
            CoreError::AddressNotSupported { .. } => ErrorCode::AddressNotSupported,
            CoreError::Channel { .. } => ErrorCode::Channel,
            CoreError::Cancelled { .. } => ErrorCode::Cancelled,
            CoreError::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            CoreError::ActorAlreadyStarted { .. } => ErrorCode::ActorAlreadyStarted,
            CoreError::Configuration { .. } => ErrorCode::Configuration,
        }
    }

    pub fn actor_not_found(id: ActorId) -> Self {
        Self::ActorNotFound { id }
    }

    pub fn postman_not_found(receiver: ActorId) -> Self {
        Self::PostmanNotFound { receiver }
    }

    pub fn postoffice_not_registered(postman: ActorId) -> Self {
        Self::PostofficeNotRegistered { postman }
    }

    pub fn mailbox_send(message: impl Into<String>) -> Self {
        Self::MailboxSend {
            message: message.into(),
        }
    }

    pub fn mailbox_receive(message: impl Into<String>) -> Self {
        Self::MailboxReceive {
            message: message.into(),
        }
    }

    pub fn mailbox_closed(mailbox: ActorId) -> Self {
        Self::MailboxClosed { mailbox }
    }

    pub fn codec_encode(source: codec::CodecError) -> Self {
        Self::CodecEncode { source }
    }

    pub fn codec_decode(source: codec::CodecError) -> Self {
        Self::CodecDecode { source }
    }

    pub fn address_not_supported(message: impl Into<String>) -> Self {
        Self::AddressNotSupported {
            message: message.into(),
        }
    }

    pub fn channel(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn channel_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Channel {
            endpoint: endpoint.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    pub fn actor_already_started(id: ActorId) -> Self {
        Self::ActorAlreadyStarted { id }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Whether this is the closed-and-drained condition that ends an actor loop
    pub fn is_closed(&self) -> bool {
        matches!(self, CoreError::MailboxClosed { .. })
    }

    /// Whether the caller's context ended the operation
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            CoreError::Cancelled { .. } | CoreError::DeadlineExceeded { .. }
        )
    }
}
