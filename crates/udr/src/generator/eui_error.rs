use super::{Generate, Session, build};
use crate::{EUI_LEN, Result, Udr, UdrKind};
use chrono::Utc;
use rand::Rng;

const NON_HEX: &[u8] = b"GHJKMNPQRSTVWXYZ";

/// Produces records with one malformed EUI.
///
/// Either the device or the gateway EUI is truncated, overlong, or contains a
/// non-hex digit.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuiErrorUdr;

impl Generate for EuiErrorUdr {
    fn kind(&self) -> UdrKind {
        UdrKind::EuiError
    }

    fn generate(&self) -> Result<Udr> {
        let mut rng = rand::rng();
        let session = Session::random(&mut rng, Utc::now())?;
        let mut udr = build(&mut rng, session);

        let eui = if rng.random_bool(0.5) {
            &mut udr.dev_eui
        } else {
            &mut udr.gateway_eui
        };
        corrupt_eui(&mut rng, eui);
        Ok(udr)
    }
}

fn corrupt_eui<R: Rng>(rng: &mut R, eui: &mut String) {
    match rng.random_range(0..3) {
        0 => eui.truncate(rng.random_range(0..EUI_LEN)),
        1 => {
            for _ in 0..rng.random_range(1..=4) {
                eui.push(char::from(b"0123456789ABCDEF"[rng.random_range(0..16)]));
            }
        }
        _ => {
            let at = rng.random_range(0..eui.len());
            let bad = char::from(NON_HEX[rng.random_range(0..NON_HEX.len())]);
            eui.replace_range(at..=at, bad.encode_utf8(&mut [0; 4]));
        }
    }
}
