use crate::template::TemplateError;

/// Parses a bank-formatted decimal, accepting `,` as the decimal separator.
///
/// Values that do not fit a finite `f64` (too many digits) are rejected
/// rather than saturated.
pub fn parse_number(value: &str) -> Result<f64, TemplateError> {
    let normalized = value.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(TemplateError::InvalidNumber(value.to_string())),
    }
}
