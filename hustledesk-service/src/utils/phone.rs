use once_cell::sync::Lazy;
use regex::Regex;

/// Kenyan mobile number in international form without the plus sign.
pub static KENYAN_MSISDN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^254\d{9}$").expect("valid msisdn regex"));

/// Normalize `+2547..`, `07..` and `2547..` into `2547..`.
///
/// Returns `None` when the result is not a 12-digit Kenyan number.
pub fn normalize_msisdn(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let normalized = match trimmed.strip_prefix('0') {
        Some(rest) => format!("254{}", rest),
        None => trimmed.to_string(),
    };
    KENYAN_MSISDN.is_match(&normalized).then_some(normalized)
}
