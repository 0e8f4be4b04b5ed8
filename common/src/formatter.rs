// Type-aware conversion of raw parameter values into SQL literals
//
// Each parameter type has exactly one formatting rule, matched
// exhaustively. An empty or absent value formats to `None`, which tells
// the assembler to drop the conjunct referencing it.

use crate::errors::ValidationError;
use crate::models::ParameterType;

/// Format a raw value as a SQL literal according to the declared type.
///
/// Returns `Ok(None)` for an empty value (signal: omit this predicate).
/// Integer and decimal values that do not parse are reported as errors so
/// the caller can surface them instead of emitting broken SQL.
pub fn format_value(
    data_type: ParameterType,
    raw_value: &str,
) -> Result<Option<String>, ValidationError> {
    if raw_value.is_empty() {
        return Ok(None);
    }

    let literal = match data_type {
        ParameterType::Text => {
            // Embedded single quotes are doubled before wrapping
            let escaped = raw_value.replace('\'', "''");
            format!("'{}'", escaped)
        }
        ParameterType::Integer => {
            let parsed: i64 = raw_value.trim().parse().map_err(|_| {
                ValidationError::InvalidValue {
                    data_type: data_type.to_string(),
                    value: raw_value.to_string(),
                }
            })?;
            parsed.to_string()
        }
        ParameterType::Decimal => {
            let parsed: f64 = raw_value.trim().parse().map_err(|_| {
                ValidationError::InvalidValue {
                    data_type: data_type.to_string(),
                    value: raw_value.to_string(),
                }
            })?;
            render_decimal(parsed)
        }
        ParameterType::Date => format!("'{}'", raw_value),
        ParameterType::Boolean => {
            if is_truthy(raw_value) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
    };

    Ok(Some(literal))
}

/// Canonical decimal rendering: whole values keep a trailing `.0` so the
/// literal is unambiguously a decimal (100 renders as 100.0)
fn render_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Boolean truthiness: case-insensitive "true", "1", and the Spanish
/// affirmatives "si"/"Si" map to 1; everything else maps to 0
fn is_truthy(raw_value: &str) -> bool {
    raw_value.eq_ignore_ascii_case("true") || raw_value == "1" || raw_value == "si" || raw_value == "Si"
}

/// Representative value per type for test-mode execution
pub fn test_value(data_type: ParameterType) -> &'static str {
    match data_type {
        ParameterType::Text => "TEST",
        ParameterType::Integer => "1",
        ParameterType::Decimal => "1.0",
        ParameterType::Date => "2025-01-01",
        ParameterType::Boolean => "true",
    }
}

/// Check that a declared default value parses under the declared type.
/// Applied when a parameter definition is saved.
pub fn validate_default(data_type: ParameterType, default_value: &str) -> Result<(), ValidationError> {
    let value = default_value.trim();
    if value.is_empty() {
        return Ok(());
    }

    let invalid = || ValidationError::InvalidValue {
        data_type: data_type.to_string(),
        value: default_value.to_string(),
    };

    match data_type {
        ParameterType::Text => Ok(()),
        ParameterType::Integer => value.parse::<i64>().map(|_| ()).map_err(|_| invalid()),
        ParameterType::Decimal => value.parse::<f64>().map(|_| ()).map_err(|_| invalid()),
        ParameterType::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| invalid()),
        ParameterType::Boolean => {
            match value.to_lowercase().as_str() {
                "true" | "false" | "1" | "0" | "si" | "no" => Ok(()),
                _ => Err(invalid()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_wraps_and_escapes_quotes() {
        assert_eq!(
            format_value(ParameterType::Text, "Activo").unwrap(),
            Some("'Activo'".to_string())
        );
        assert_eq!(
            format_value(ParameterType::Text, "O'Brien").unwrap(),
            Some("'O''Brien'".to_string())
        );
    }

    #[test]
    fn test_text_quote_escaping_round_trips() {
        let original = "it's a 'test' value";
        let literal = format_value(ParameterType::Text, original).unwrap().unwrap();
        assert!(literal.starts_with('\'') && literal.ends_with('\''));
        let inner = &literal[1..literal.len() - 1];
        assert_eq!(inner.replace("''", "'"), original);
    }

    #[test]
    fn test_integer_renders_plain_digits() {
        assert_eq!(
            format_value(ParameterType::Integer, "42").unwrap(),
            Some("42".to_string())
        );
        assert_eq!(
            format_value(ParameterType::Integer, "-7").unwrap(),
            Some("-7".to_string())
        );
    }

    #[test]
    fn test_integer_rejects_non_integer() {
        assert!(format_value(ParameterType::Integer, "1.5").is_err());
        assert!(format_value(ParameterType::Integer, "abc").is_err());
    }

    #[test]
    fn test_decimal_canonical_rendering() {
        assert_eq!(
            format_value(ParameterType::Decimal, "100").unwrap(),
            Some("100.0".to_string())
        );
        assert_eq!(
            format_value(ParameterType::Decimal, "3.14").unwrap(),
            Some("3.14".to_string())
        );
        assert!(format_value(ParameterType::Decimal, "not a number").is_err());
    }

    #[test]
    fn test_date_wrapped_verbatim() {
        assert_eq!(
            format_value(ParameterType::Date, "2025-01-31").unwrap(),
            Some("'2025-01-31'".to_string())
        );
    }

    #[test]
    fn test_boolean_truthiness() {
        for truthy in ["true", "True", "TRUE", "1", "si", "Si"] {
            assert_eq!(
                format_value(ParameterType::Boolean, truthy).unwrap(),
                Some("1".to_string()),
                "value: {}",
                truthy
            );
        }
        for falsy in ["false", "0", "no", "anything"] {
            assert_eq!(
                format_value(ParameterType::Boolean, falsy).unwrap(),
                Some("0".to_string()),
                "value: {}",
                falsy
            );
        }
    }

    #[test]
    fn test_empty_value_formats_to_none() {
        for data_type in [
            ParameterType::Text,
            ParameterType::Integer,
            ParameterType::Decimal,
            ParameterType::Date,
            ParameterType::Boolean,
        ] {
            assert_eq!(format_value(data_type, "").unwrap(), None);
        }
    }

    #[test]
    fn test_test_values_parse_under_their_type() {
        for data_type in [
            ParameterType::Text,
            ParameterType::Integer,
            ParameterType::Decimal,
            ParameterType::Date,
            ParameterType::Boolean,
        ] {
            let value = test_value(data_type);
            assert!(format_value(data_type, value).unwrap().is_some());
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(validate_default(ParameterType::Integer, "10").is_ok());
        assert!(validate_default(ParameterType::Integer, "ten").is_err());
        assert!(validate_default(ParameterType::Decimal, "1.5").is_ok());
        assert!(validate_default(ParameterType::Date, "2025-01-01").is_ok());
        assert!(validate_default(ParameterType::Date, "01/01/2025").is_err());
        assert!(validate_default(ParameterType::Boolean, "si").is_ok());
        assert!(validate_default(ParameterType::Boolean, "maybe").is_err());
        assert!(validate_default(ParameterType::Text, "anything at all").is_ok());
        assert!(validate_default(ParameterType::Integer, "").is_ok());
    }
}
