use serde::de::Error as _;
use serde::Deserialize;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::core::time::to_primitive_utc;

/// RFC 3339 with any offset, or a naive `YYYY-MM-DDTHH:MM[:SS]` taken as UTC.
/// The result is normalised to a UTC wall-clock value.
pub(crate) fn parse_utc_flexible(raw: &str) -> Option<PrimitiveDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(to_primitive_utc(value));
    }

    PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
        })
        .ok()
}

pub(crate) fn deserialize_utc<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_flexible(&raw).ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

pub(crate) fn deserialize_option_utc<'de, D>(
    deserializer: D,
) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_utc_flexible(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::parse_utc_flexible;

    #[test]
    fn offsets_are_normalised_to_utc() {
        assert_eq!(
            parse_utc_flexible("2025-03-01T13:00:00+03:00"),
            Some(datetime!(2025-03-01 10:00))
        );
        assert_eq!(parse_utc_flexible("2025-03-01T10:00:00Z"), Some(datetime!(2025-03-01 10:00)));
    }

    #[test]
    fn naive_values_are_taken_as_utc() {
        assert_eq!(parse_utc_flexible("2025-03-01T10:00"), Some(datetime!(2025-03-01 10:00)));
        assert_eq!(parse_utc_flexible("2025-03-01T10:00:30"), Some(datetime!(2025-03-01 10:00:30)));
        assert_eq!(parse_utc_flexible("tomorrow"), None);
    }
}
