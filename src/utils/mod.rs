use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::path::Path;

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

const MONTH_ABBREVIATIONS: [(&str, u32); 12] = [
    ("JAN", 1),
    ("FEV", 2),
    ("MAR", 3),
    ("ABR", 4),
    ("MAI", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AGO", 8),
    ("SET", 9),
    ("OUT", 10),
    ("NOV", 11),
    ("DEZ", 12),
];

/// Canonicalizes a billing period label to `MM/YYYY`.
///
/// Faturas print the period as `JAN/2025`; the backend expects `01/2025`.
/// Already-numeric labels pass through unchanged, anything else is rejected.
pub fn canonical_period(raw: &str) -> Option<String> {
    let (month_part, year_part) = raw.trim().split_once('/')?;
    let year: i32 = year_part.trim().parse().ok()?;
    let month = match month_part.trim().parse::<u32>() {
        Ok(numeric) => numeric,
        Err(_) => month_number(month_part)?,
    };
    NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(format!("{:02}/{}", month, year))
}

fn month_number(abbreviation: &str) -> Option<u32> {
    let upper = abbreviation.trim().to_ascii_uppercase();
    MONTH_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, number)| *number)
}
