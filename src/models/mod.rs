//! Domain model module declarations.

use serde::{Deserialize, Deserializer};

pub mod conversation;
pub mod message;
pub mod reference;

/// Identifier that the service may send either as a JSON number or as a
/// numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientId {
    Number(i64),
    Text(String),
}

/// Deserialize an optional numeric identifier, accepting `7`, `"7"` and
/// `null`. Blank or non-numeric strings deserialize as `None`.
pub(crate) fn deserialize_lenient_id<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<LenientId>::deserialize(deserializer)?;
    Ok(match raw {
        Some(LenientId::Number(n)) => Some(n),
        Some(LenientId::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Deserialize an identifier that may be numeric or textual into a string.
pub(crate) fn deserialize_id_string<'de, D>(
    deserializer: D,
) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientId::deserialize(deserializer)? {
        LenientId::Number(n) => n.to_string(),
        LenientId::Text(s) => s,
    })
}
