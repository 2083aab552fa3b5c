use super::{Generate, Session, build};
use crate::{Result, Udr, UdrKind};
use chrono::Utc;

/// Produces records that pass [`Udr::validate`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalUdr;

impl Generate for NormalUdr {
    fn kind(&self) -> UdrKind {
        UdrKind::Normal
    }

    fn generate(&self) -> Result<Udr> {
        let mut rng = rand::rng();
        let session = Session::random(&mut rng, Utc::now())?;
        Ok(build(&mut rng, session))
    }
}
