use crate::{Error, Result};
use core::fmt;
use core::str::FromStr;

/// The flavour of record a generator produces.
///
/// Integer codes follow the order the request producers have always used:
/// `0` normal, `1` time error, `2` EUI error, `3` format error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UdrKind {
    /// A well-formed record.
    Normal,
    /// Valid layout, impossible session window.
    TimeError,
    /// A malformed device or gateway EUI.
    EuiError,
    /// A string field that breaks its layout.
    FormatError,
}

impl UdrKind {
    /// Every kind, in code order.
    pub const ALL: [Self; 4] = [
        Self::Normal,
        Self::TimeError,
        Self::EuiError,
        Self::FormatError,
    ];

    /// Wire code of this kind.
    pub const fn code(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::TimeError => 1,
            Self::EuiError => 2,
            Self::FormatError => 3,
        }
    }

    /// Resolves a wire code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKind`] for any code outside `0..=3`.
    pub fn from_code(code: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| Error::UnknownKind {
                tag: code.to_string(),
            })
    }

    /// Canonical name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::TimeError => "time_error",
            Self::EuiError => "eui_error",
            Self::FormatError => "format_error",
        }
    }
}

impl fmt::Display for UdrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UdrKind {
    type Err = Error;

    /// Accepts canonical names case-insensitively, plus the short aliases
    /// (`time_err`, `eui_err`, `fmt_err`) older producers still send.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "time_error" | "time_err" => Ok(Self::TimeError),
            "eui_error" | "eui_err" => Ok(Self::EuiError),
            "format_error" | "fmt_err" => Ok(Self::FormatError),
            _ => Err(Error::UnknownKind { tag: s.to_owned() }),
        }
    }
}
