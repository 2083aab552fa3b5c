//! Generation requests as they arrive on the request queue.
//!
//! A request is a JSON object naming the record variant and how many records
//! to publish:
//!
//! ```json
//! {"errorType": "time_error", "count": 2}
//! ```
//!
//! Field names are accepted in `snake_case`, `camelCase` and the `PascalCase`
//! the web front end sends. The variant is kept as the raw [`ErrorTag`];
//! mapping it to a [`UdrKind`] is the router's job.

use crate::common::{Error, Result};
use core::fmt;
use serde::Deserialize;
use udr::UdrKind;

/// The variant selector exactly as it appeared on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorTag {
    /// Integer code, `0..=3` for the known variants.
    Code(i64),
    /// Variant name or one of its legacy aliases.
    Name(String),
}

impl ErrorTag {
    /// Maps the tag onto a known variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariant`] if the tag names no variant.
    pub fn resolve(&self) -> Result<UdrKind> {
        let resolved = match self {
            Self::Code(code) => UdrKind::from_code(*code),
            Self::Name(name) => name.parse(),
        };
        resolved.map_err(|_| Error::UnknownVariant {
            tag: self.to_string(),
        })
    }
}

impl Default for ErrorTag {
    fn default() -> Self {
        Self::from(UdrKind::Normal)
    }
}

impl From<UdrKind> for ErrorTag {
    fn from(kind: UdrKind) -> Self {
        Self::Code(kind.code())
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Deserialize)]
struct WireRequest {
    #[serde(default, alias = "errorType", alias = "ErrorType")]
    error_type: ErrorTag,
    #[serde(alias = "Count")]
    count: i64,
}

/// A decoded generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    pub error_type: ErrorTag,
    pub count: usize,
}

impl RequestSpec {
    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the body is not a JSON object with an
    /// integer `count`, or if `count` is negative.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let wire: WireRequest = serde_json::from_slice(body).map_err(|e| Error::Parse {
            reason: e.to_string(),
        })?;
        let count = usize::try_from(wire.count).map_err(|_| Error::Parse {
            reason: format!("count must not be negative, got {}", wire.count),
        })?;

        Ok(Self {
            error_type: wire.error_type,
            count,
        })
    }

    /// The implicit request a one-shot run serves.
    pub fn batch() -> Self {
        Self {
            error_type: UdrKind::Normal.into(),
            count: 1,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::RequestTooLarge`] if `count` exceeds `limit`.
    pub fn ensure_within(&self, limit: usize) -> Result<()> {
        if self.count > limit {
            return Err(Error::RequestTooLarge {
                count: self.count,
                limit,
            });
        }
        Ok(())
    }
}
