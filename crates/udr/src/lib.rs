//! Synthetic usage detail records.
//!
//! A [`Udr`] describes one LoRaWAN device session as seen by the billing
//! pipeline. Records are produced by a [`Generate`] capability, one per
//! [`UdrKind`]: the [`UdrKind::Normal`] generator emits records that pass
//! [`Udr::validate`], every other kind emits records that fail it in exactly
//! the way its name says. Records travel as text through a [`Codec`].

mod codec;
mod error;
mod generator;
mod kind;
mod record;

pub use crate::codec::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::kind::*;
pub use crate::record::*;
