use super::{Generate, Session, build};
use crate::{Result, Udr, UdrKind};
use chrono::{NaiveDateTime, Utc};
use rand::Rng;

/// Layouts that look like timestamps but are not [`crate::TIME_FORMAT`].
const FOREIGN_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M", "%Y%m%dT%H%M%S"];

/// Produces records with one string field in the wrong layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct FormatErrorUdr;

impl Generate for FormatErrorUdr {
    fn kind(&self) -> UdrKind {
        UdrKind::FormatError
    }

    fn generate(&self) -> Result<Udr> {
        let mut rng = rand::rng();
        let session = Session::random(&mut rng, Utc::now())?;
        let mut udr = build(&mut rng, session);

        match rng.random_range(0..4) {
            0 => udr.start_time = relayout(&mut rng, session.start.naive_utc()),
            1 => udr.end_time = relayout(&mut rng, session.end.naive_utc()),
            2 => udr.service = String::new(),
            _ => udr.record_id.truncate(8),
        }
        Ok(udr)
    }
}

fn relayout<R: Rng>(rng: &mut R, at: NaiveDateTime) -> String {
    let layout = FOREIGN_TIME_FORMATS[rng.random_range(0..FOREIGN_TIME_FORMATS.len())];
    at.format(layout).to_string()
}
