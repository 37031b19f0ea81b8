//! Message capabilities consumed by the server's call pipeline.
//!
//! Every request message of the `bmcd.v1` API implements two traits:
//!
//! - [`Validate`] checks structural constraints (required sub-messages,
//!   non-empty strings, known enum values) before any handler runs.
//! - [`RequestFields`] exposes a small, non-sensitive subset of fields that the
//!   pipeline attaches to the call's log record as `grpc.request.<name>` tags.
//!
//! Response messages only need [`RequestFields`] and [`Validate`] when they
//! are also sent as requests, which none are today.

use core::fmt;

/// A single failed structural rule.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid field {field}: {reason}")]
pub struct Violation {
    field: &'static str,
    reason: String,
}

impl Violation {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field, e.g. `authn.host`.
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Structural validation of a request message.
pub trait Validate {
    /// Returns the first violated rule, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`Violation`] naming the field that failed.
    fn validate(&self) -> Result<(), Violation>;
}

/// Request fields worth tagging a call with.
pub trait RequestFields {
    /// Name/value pairs, without the `grpc.request.` prefix.
    fn request_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), Violation> {
    if value.is_empty() {
        return Err(Violation::new(field, "value must not be an empty string"));
    }
    Ok(())
}

/// Fails when a raw prost enum value is unknown or the zero `Unspecified`
/// variant.
pub(crate) fn require_known<E>(field: &'static str, raw: i32) -> Result<E, Violation>
where
    E: TryFrom<i32> + PartialEq + Default + fmt::Debug,
{
    match E::try_from(raw) {
        Ok(value) if value != E::default() => Ok(value),
        Ok(_) => Err(Violation::new(field, "value must be specified")),
        Err(_) => Err(Violation::new(field, format!("unknown enum value {raw}"))),
    }
}

pub(crate) fn require_non_negative(field: &'static str, value: i32) -> Result<(), Violation> {
    if value < 0 {
        return Err(Violation::new(
            field,
            format!("value must be greater than or equal to 0, got {value}"),
        ));
    }
    Ok(())
}
