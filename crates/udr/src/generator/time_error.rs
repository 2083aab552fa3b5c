use super::{Generate, MAX_REPORT_LAG_SECS, MAX_SESSION_SECS, Session, build, seconds};
use crate::{Result, Udr, UdrKind};
use chrono::Utc;
use rand::Rng;

/// Produces records whose session window is impossible.
///
/// Half of the records end before they start; the other half start after the
/// moment they were generated. Layouts and EUIs stay valid.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeErrorUdr;

impl Generate for TimeErrorUdr {
    fn kind(&self) -> UdrKind {
        UdrKind::TimeError
    }

    fn generate(&self) -> Result<Udr> {
        let mut rng = rand::rng();
        let session = Session::random(&mut rng, Utc::now())?;

        if rng.random_bool(0.5) {
            let mut udr = build(&mut rng, session);
            core::mem::swap(&mut udr.start_time, &mut udr.end_time);
            Ok(udr)
        } else {
            // Push the whole window past `now`, with at least a minute to spare.
            let ahead = rng.random_range(60..=24 * 60 * 60)
                + MAX_REPORT_LAG_SECS
                + MAX_SESSION_SECS;
            let session = session.shifted(seconds(ahead)?)?;
            Ok(build(&mut rng, session))
        }
    }
}
