use crate::UdrKind;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layout of [`Udr::start_time`] and [`Udr::end_time`] (UTC).
pub const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Service code carried by every well-formed record.
pub const SERVICE: &str = "LORA";

/// Number of hex digits in an EUI-64.
pub const EUI_LEN: usize = 16;

/// One usage detail record: a single device session relayed by a gateway.
///
/// String fields are kept as text so that generators can produce malformed
/// values; use [`Udr::validate`] to check them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Udr {
    /// UUID v4, hyphenated.
    pub record_id: String,
    /// Always [`SERVICE`].
    pub service: String,
    /// Device EUI-64 as [`EUI_LEN`] upper-case hex digits.
    pub dev_eui: String,
    /// Gateway EUI-64 as [`EUI_LEN`] upper-case hex digits.
    pub gateway_eui: String,
    /// Session start, [`TIME_FORMAT`].
    pub start_time: String,
    /// Session end, [`TIME_FORMAT`].
    pub end_time: String,
    pub uplink_count: u32,
    pub downlink_count: u32,
    pub payload_bytes: u64,
}

/// The first rule a record breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("field `{field}` is malformed")]
    Format { field: &'static str },

    #[error("field `{field}` is not a 16-digit hex EUI")]
    Eui { field: &'static str },

    #[error("session ends before it starts")]
    TimeInverted,

    #[error("session lies in the future")]
    TimeInFuture,
}

impl Violation {
    /// The kind of record that is expected to break this rule.
    pub const fn kind(self) -> UdrKind {
        match self {
            Self::Format { .. } => UdrKind::FormatError,
            Self::Eui { .. } => UdrKind::EuiError,
            Self::TimeInverted | Self::TimeInFuture => UdrKind::TimeError,
        }
    }
}

impl Udr {
    /// Checks the record against the current time.
    ///
    /// # Errors
    ///
    /// See [`Udr::validate_at`].
    pub fn validate(&self) -> Result<(), Violation> {
        self.validate_at(Utc::now())
    }

    /// Checks the record, in order: field layouts, EUIs, then the session
    /// window relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns the first [`Violation`] found.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), Violation> {
        if uuid::Uuid::parse_str(&self.record_id).is_err() {
            return Err(Violation::Format { field: "recordId" });
        }
        if self.service != SERVICE {
            return Err(Violation::Format { field: "service" });
        }
        let start = parse_time(&self.start_time)
            .ok_or(Violation::Format { field: "startTime" })?;
        let end = parse_time(&self.end_time)
            .ok_or(Violation::Format { field: "endTime" })?;

        if !is_eui(&self.dev_eui) {
            return Err(Violation::Eui { field: "devEui" });
        }
        if !is_eui(&self.gateway_eui) {
            return Err(Violation::Eui { field: "gatewayEui" });
        }

        if end < start {
            return Err(Violation::TimeInverted);
        }
        if end > now {
            return Err(Violation::TimeInFuture);
        }
        Ok(())
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_eui(s: &str) -> bool {
    s.len() == EUI_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
