use crate::{Error, Result, Udr};

/// Converts records to and from their canonical text form.
pub trait Codec: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the record cannot be represented.
    fn encode(&self, udr: &Udr) -> Result<String>;

    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `text` is not an encoded record.
    fn decode(&self, text: &str) -> Result<Udr>;
}

/// Single-line JSON with camelCase field names.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, udr: &Udr) -> Result<String> {
        serde_json::to_string(udr).map_err(Error::Encode)
    }

    fn decode(&self, text: &str) -> Result<Udr> {
        serde_json::from_str(text).map_err(Error::Decode)
    }
}
