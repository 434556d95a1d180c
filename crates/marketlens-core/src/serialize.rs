//! Boundary serialization helpers.
//!
//! Output tables must never carry non-finite numerics into the transport
//! format; NaN and infinities become explicit nulls.

use serde::Serializer;

/// Map a non-finite value to `None`.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// `#[serde(serialize_with = "nullable_f64")]` — non-finite becomes null.
pub fn nullable_f64<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match finite(*value) {
        Some(value) => serializer.serialize_f64(value),
        None => serializer.serialize_none(),
    }
}
