//! Parser for human-readable counts such as "12.3K" or "1,204"

/// Converts a human-readable, optionally magnitude-suffixed count to an integer
///
/// Accepts an optional `K`, `M` or `B` suffix (case-insensitive) scaling the
/// number by a thousand, a million or a billion. Thousands separators and
/// surrounding whitespace are ignored. Fractional digits are applied exactly
/// at the suffix scale; any that remain below one unit are dropped.
///
/// Returns `None` for anything that does not parse, including negative
/// numbers and values that do not fit in a `u64`.
///
/// # Example
///
/// ```
/// use metascrape::crawler::parse_count;
///
/// assert_eq!(parse_count("12.3K"), Some(12_300));
/// assert_eq!(parse_count("4M"), Some(4_000_000));
/// assert_eq!(parse_count("532"), Some(532));
/// assert_eq!(parse_count("garbage"), None);
/// ```
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let (number, scale_digits) = match cleaned.chars().last()? {
        'K' => (&cleaned[..cleaned.len() - 1], 3),
        'M' => (&cleaned[..cleaned.len() - 1], 6),
        'B' => (&cleaned[..cleaned.len() - 1], 9),
        _ => (cleaned.as_str(), 0),
    };

    scale_decimal(number, scale_digits)
}

/// Multiplies a plain decimal string by `10^scale_digits` without going
/// through floating point
fn scale_decimal(number: &str, scale_digits: usize) -> Option<u64> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut digits = String::with_capacity(whole.len() + scale_digits);
    digits.push_str(whole);
    for i in 0..scale_digits {
        digits.push(fraction.as_bytes().get(i).map_or('0', |b| *b as char));
    }

    if digits.is_empty() {
        return Some(0);
    }

    digits.parse::<u64>().ok()
}
