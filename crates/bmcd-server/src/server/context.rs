//! Per-call state shared by the interceptor chain.
//!
//! A [`CallContext`] is created by the pipeline when a call enters the server
//! and handed by `&mut` to every interceptor and finally to the terminal
//! handler. It never crosses call boundaries, so nothing in here needs a lock.
//!
//! ## Contents
//!
//! - [`MethodInfo`] - the fully qualified gRPC method being called.
//! - [`RequestId`] - the correlation identifier. Assigned at most once.
//! - [`Tags`] - string tags accumulated by interceptors and written to the
//!   call's log record.

use bmcd_core::Error;
use core::any::TypeId;
use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};
use tonic::metadata::{Ascii, MetadataValue};
use uuid::Uuid;

/// Metadata key carrying the correlation identifier, inbound and outbound.
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// Log field key the correlation identifier is written under.
pub const REQUEST_ID_LOG_KEY: &str = "requestID";

/// Inbound identifiers longer than this are ignored and replaced.
pub const MAX_REQUEST_ID_LEN: usize = 512;

/// Opaque, non-empty ASCII token identifying a single call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh identifier (UUID v4, hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts a caller-supplied identifier if it is non-empty, printable
    /// ASCII and at most [`MAX_REQUEST_ID_LEN`] bytes.
    pub fn from_inbound(value: &str) -> Option<Self> {
        let acceptable = !value.is_empty()
            && value.len() <= MAX_REQUEST_ID_LEN
            && value.bytes().all(|b| b.is_ascii_graphic() || b == b' ');
        acceptable.then(|| Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encodes the identifier as a gRPC metadata value.
    ///
    /// # Errors
    ///
    /// Fails only if the identifier is not valid header text, which
    /// [`RequestId::from_inbound`] and [`RequestId::generate`] rule out.
    pub fn to_metadata(&self) -> Result<MetadataValue<Ascii>, tonic::Status> {
        self.0.parse().map_err(|_| {
            tonic::Status::internal(format!("request id {:?} is not valid metadata", self.0))
        })
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified gRPC method path, e.g. `/bmcd.v1.Machine/Power`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    path: &'static str,
}

impl MethodInfo {
    pub const fn new(path: &'static str) -> Self {
        Self { path }
    }

    pub const fn path(&self) -> &'static str {
        self.path
    }

    /// The package-qualified service name, e.g. `bmcd.v1.Machine`.
    pub fn service(&self) -> &'static str {
        self.split().0
    }

    /// The bare method name, e.g. `Power`.
    pub fn method(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        let path = self.path.strip_prefix('/').unwrap_or(self.path);
        path.split_once('/').unwrap_or(("unknown", path))
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path)
    }
}

/// Ordered string tags attached to a call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Call-local metadata read and written by interceptors.
#[derive(Debug)]
pub struct CallContext {
    method: MethodInfo,
    request_id: Option<RequestId>,
    tags: Tags,
    reply_type: Option<TypeId>,
    started: Instant,
}

impl CallContext {
    pub fn new(method: MethodInfo) -> Self {
        Self {
            method,
            request_id: None,
            tags: Tags::default(),
            reply_type: None,
            started: Instant::now(),
        }
    }

    pub const fn method(&self) -> MethodInfo {
        self.method
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Assigns the call's correlation identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestIdReassigned`] if an identifier is already set;
    /// the existing one is kept.
    pub fn assign_request_id(&mut self, id: RequestId) -> Result<&RequestId, Error> {
        if let Some(existing) = &self.request_id {
            return Err(Error::RequestIdReassigned {
                existing: existing.to_string(),
            });
        }
        Ok(self.request_id.insert(id))
    }

    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    /// Declares the response message type the caller will accept.
    pub fn expect_reply<T: 'static>(&mut self) {
        self.reply_type = Some(TypeId::of::<T>());
    }

    /// Whether a reply message of type `id` can be handed back to the caller.
    /// Any type is accepted until [`CallContext::expect_reply`] is called.
    pub fn accepts_reply(&self, id: TypeId) -> bool {
        self.reply_type.is_none_or(|expected| expected == id)
    }

    /// Time since the call entered the pipeline.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
