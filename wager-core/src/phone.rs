use crate::error::Error;

/// Normalizes a phone number to E.164 (`+<country><subscriber>`), accepting
/// local-format input prefixed with a trunk `0` the way the source platform's
/// target market dials numbers. `default_country_code` is e.g. `"254"` for
/// Kenya; callers outside that market pass their own.
pub fn normalize_e164(input: &str, default_country_code: &str) -> Result<String, Error> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(Error::validation("phone number is required"));
    }

    let normalized = if input.trim_start().starts_with('+') {
        digits
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{default_country_code}{rest}")
    } else if digits.starts_with(default_country_code) {
        digits
    } else {
        format!("{default_country_code}{digits}")
    };

    if normalized.len() < 9 || normalized.len() > 15 {
        return Err(Error::validation("phone number has an invalid length"));
    }

    Ok(format!("+{normalized}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_local_format_with_trunk_zero() {
        assert_eq!(normalize_e164("0712345678", "254").unwrap(), "+254712345678");
    }

    #[test]
    fn passes_through_already_international_numbers() {
        assert_eq!(normalize_e164("+254712345678", "254").unwrap(), "+254712345678");
    }

    #[test]
    fn accepts_bare_subscriber_number_without_trunk_zero() {
        assert_eq!(normalize_e164("712345678", "254").unwrap(), "+254712345678");
    }

    #[test]
    fn rejects_empty_or_too_short_numbers() {
        assert!(normalize_e164("", "254").is_err());
        assert!(normalize_e164("12", "254").is_err());
    }
}
