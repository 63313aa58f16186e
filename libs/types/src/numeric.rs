//! Float price helpers
//!
//! Prices and gaps are plain `f64`. A last price of NaN means the feed has
//! not seen a trade yet. JSON has no NaN, so it travels as `null`.

/// Last-trade price as delivered by the feed.
pub type Price = f64;

/// Serde adapter mapping NaN to `null` and back.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
