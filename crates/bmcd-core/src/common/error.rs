//! Error types for the device management call pipeline.
//!
//! This module defines the central `Error` enum, which captures every
//! call-scoped failure that can be reported back to a gRPC client. It
//! implements `From<Error>` for `tonic::Status` so interceptors and handlers
//! can propagate failures with `?` and still hand the client an appropriate
//! status code.
//!
//! ## Error Cases
//! - `InvalidRequest`: The request message failed structural validation.
//! - `Unimplemented`: No handler is registered for the called method.
//! - `UnexpectedMessage`: A handler replied with a message of the wrong type.
//! - `RequestIdReassigned`: A second correlation id was assigned to a call.
//! - `CallLog`: The per-call log record could not be written.

use crate::validate::Violation;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for call-level failures.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client request was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] Violation),

    /// The method exists on the wire but nothing handles it.
    #[error("Method {method} is not implemented")]
    Unimplemented { method: String },

    /// The handler produced a response that does not match the method.
    #[error("Handler for {method} replied with an unexpected message type")]
    UnexpectedMessage { method: String },

    /// A correlation id is immutable once assigned to a call.
    #[error("Request id already assigned: {existing}")]
    RequestIdReassigned { existing: String },

    /// The call log sink rejected the record.
    #[error("Call log error: {context}")]
    CallLog { context: String },
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest(violation) => Status::invalid_argument(violation.to_string()),
            Error::Unimplemented { method } => {
                Status::unimplemented(format!("{method} is not implemented"))
            }
            Error::UnexpectedMessage { method } => {
                Status::internal(format!("Unexpected response message from {method}"))
            }
            Error::RequestIdReassigned { existing } => {
                Status::internal(format!("Request id already assigned: {existing}"))
            }
            Error::CallLog { context } => Status::internal(format!("Call log error: {context}")),
        }
    }
}
