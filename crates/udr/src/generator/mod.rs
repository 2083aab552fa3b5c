mod eui_error;
mod format_error;
mod normal;
mod time_error;

pub use eui_error::*;
pub use format_error::*;
pub use normal::*;
pub use time_error::*;

use crate::{EUI_LEN, Error, Result, SERVICE, TIME_FORMAT, Udr, UdrKind};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::sync::Arc;

/// Shortest session, in seconds.
pub const MIN_SESSION_SECS: i64 = 1;

/// Longest session, in seconds.
pub const MAX_SESSION_SECS: i64 = 6 * 60 * 60;

/// Longest delay between a session ending and its record being produced.
pub const MAX_REPORT_LAG_SECS: i64 = 15 * 60;

/// A zero-argument capability that synthesizes one record.
///
/// Implementations are stateless and shared between concurrently running
/// tasks.
pub trait Generate: Send + Sync {
    /// The kind of record this capability produces.
    fn kind(&self) -> UdrKind;

    /// Produces one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if the session window cannot be
    /// represented.
    fn generate(&self) -> Result<Udr>;
}

/// Returns the built-in generator for `kind`.
pub fn generator_for(kind: UdrKind) -> Arc<dyn Generate> {
    match kind {
        UdrKind::Normal => Arc::new(NormalUdr),
        UdrKind::TimeError => Arc::new(TimeErrorUdr),
        UdrKind::EuiError => Arc::new(EuiErrorUdr),
        UdrKind::FormatError => Arc::new(FormatErrorUdr),
    }
}

/// A session window, still typed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Session {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Session {
    /// A session that ended up to [`MAX_REPORT_LAG_SECS`] before `now`.
    pub fn random<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Result<Self> {
        let duration = seconds(rng.random_range(MIN_SESSION_SECS..=MAX_SESSION_SECS))?;
        let lag = seconds(rng.random_range(0..=MAX_REPORT_LAG_SECS))?;
        let end = now.checked_sub_signed(lag).ok_or_else(out_of_range)?;
        let start = end.checked_sub_signed(duration).ok_or_else(out_of_range)?;
        Ok(Self { start, end })
    }

    pub fn shifted(self, by: TimeDelta) -> Result<Self> {
        Ok(Self {
            start: self.start.checked_add_signed(by).ok_or_else(out_of_range)?,
            end: self.end.checked_add_signed(by).ok_or_else(out_of_range)?,
        })
    }
}

pub(crate) fn seconds(secs: i64) -> Result<TimeDelta> {
    TimeDelta::try_seconds(secs).ok_or_else(out_of_range)
}

fn out_of_range() -> Error {
    Error::Generation {
        reason: "session window is outside the representable time range".to_owned(),
    }
}

pub(crate) fn random_eui<R: Rng>(rng: &mut R) -> String {
    format!("{:0width$X}", rng.random::<u64>(), width = EUI_LEN)
}

/// A well-formed record for `session`.
pub(crate) fn build<R: Rng>(rng: &mut R, session: Session) -> Udr {
    let uplink_count = rng.random_range(1..=500_u32);
    let per_uplink = rng.random_range(11..=242_u64);
    Udr {
        record_id: uuid::Uuid::new_v4().hyphenated().to_string(),
        service: SERVICE.to_owned(),
        dev_eui: random_eui(rng),
        gateway_eui: random_eui(rng),
        start_time: session.start.format(TIME_FORMAT).to_string(),
        end_time: session.end.format(TIME_FORMAT).to_string(),
        uplink_count,
        downlink_count: rng.random_range(0..=100),
        payload_bytes: u64::from(uplink_count) * per_uplink,
    }
}
