//! Evaluator output artifact: one line `ms,ma,mr`.

use crate::error::OutputError;
use crate::experiment::state::Metrics;

/// Parse the evaluator's output text into metrics.
///
/// Exactly three comma-separated fields; each must parse as a finite f64.
/// Whitespace around fields (including a trailing newline) is ignored.
pub fn parse_metrics(text: &str) -> Result<Metrics, OutputError> {
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() != 3 {
        return Err(OutputError::FieldCount {
            found: fields.len(),
        });
    }

    let mut values = [0.0f64; 3];
    for (slot, field) in values.iter_mut().zip(&fields) {
        let field = field.trim();
        *slot = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| OutputError::NotNumeric {
                field: field.to_string(),
            })?;
    }

    Ok(Metrics::new(values[0], values[1], values[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_fields() {
        let m = parse_metrics("0.42,0.87,0.65").unwrap();
        assert_eq!(m, Metrics::new(0.42, 0.87, 0.65));
    }

    #[test]
    fn tolerates_whitespace_and_newline() {
        let m = parse_metrics(" 0.5 , 1 ,0.25\n").unwrap();
        assert_eq!(m, Metrics::new(0.5, 1.0, 0.25));
    }

    #[test]
    fn wrong_field_count() {
        assert!(matches!(
            parse_metrics("0.1,0.2"),
            Err(OutputError::FieldCount { found: 2 })
        ));
        assert!(matches!(
            parse_metrics("0.1,0.2,0.3,0.4"),
            Err(OutputError::FieldCount { found: 4 })
        ));
        assert!(matches!(
            parse_metrics(""),
            Err(OutputError::FieldCount { found: 1 })
        ));
    }

    #[test]
    fn non_numeric_field() {
        match parse_metrics("0.1,abc,0.3") {
            Err(OutputError::NotNumeric { field }) => assert_eq!(field, "abc"),
            other => panic!("expected NotNumeric, got {other:?}"),
        }
        assert!(matches!(
            parse_metrics("0.1,,0.3"),
            Err(OutputError::NotNumeric { .. })
        ));
    }

    #[test]
    fn rejects_non_finite() {
        assert!(parse_metrics("NaN,0.1,0.2").is_err());
        assert!(parse_metrics("0.1,inf,0.2").is_err());
    }
}
