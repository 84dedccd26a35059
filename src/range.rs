// src/range.rs

use once_cell::sync::Lazy;
use regex::Regex;

/// `'Sheet'!A1:B2` or `"Sheet"!A1:B2`, sheet name without quotes inside.
static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:'([^"']+)'|"([^"']+)")!(.+)$"#).expect("quoted range pattern is valid")
});

/// `Sheet!A1:B2`
static QUALIFIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^!]+)!(.+)$").expect("qualified range pattern is valid"));

static NEEDS_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("sheet name pattern is valid"));

/// Canonical form of an A1 range reference.
///
/// Quoted sheet names are re-emitted with single quotes; unquoted ones are
/// quoted only when they contain anything outside `[A-Za-z0-9_]`. A bare
/// range comes back trimmed but otherwise unchanged. Idempotent.
pub fn normalize_range(range_ref: &str) -> String {
    let s = range_ref.trim();

    if let Some(caps) = QUOTED.captures(s) {
        let sheet = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        return format!("'{}'!{}", sheet, &caps[3]);
    }

    let Some(caps) = QUALIFIED.captures(s) else {
        return s.to_string();
    };
    let sheet = strip_edge_quotes(caps[1].trim());
    if NEEDS_QUOTE.is_match(sheet) {
        format!("'{}'!{}", sheet, &caps[2])
    } else {
        format!("{}!{}", sheet, &caps[2])
    }
}

/// Qualify a bare range with `sheet`, then normalize. Ranges that already
/// carry a sheet qualifier are only normalized.
pub fn qualify_range(sheet: &str, range_ref: &str) -> String {
    let range_ref = range_ref.trim();
    if range_ref.contains('!') || sheet.is_empty() {
        normalize_range(range_ref)
    } else {
        normalize_range(&format!("{sheet}!{range_ref}"))
    }
}

fn strip_edge_quotes(s: &str) -> &str {
    let s = s.strip_prefix(['\'', '"']).unwrap_or(s);
    s.strip_suffix(['\'', '"']).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_sheet_names_with_spaces_or_accents() {
        assert_eq!(
            normalize_range("Rémunération annuelle!A1:E5"),
            "'Rémunération annuelle'!A1:E5"
        );
        assert_eq!(normalize_range("Sheet-2!B2:C3"), "'Sheet-2'!B2:C3");
    }

    #[test]
    fn leaves_plain_sheet_names_unquoted() {
        assert_eq!(normalize_range("Sheet1!A1:E5"), "Sheet1!A1:E5");
        assert_eq!(normalize_range("  data_2024!A:A "), "data_2024!A:A");
    }

    #[test]
    fn double_quotes_become_single_quotes() {
        assert_eq!(normalize_range("\"My Sheet\"!A1:B2"), "'My Sheet'!A1:B2");
        assert_eq!(normalize_range("'Sheet1'!A1:B2"), "'Sheet1'!A1:B2");
    }

    #[test]
    fn bare_ranges_are_unchanged() {
        assert_eq!(normalize_range("A1:Z100"), "A1:Z100");
        assert_eq!(normalize_range("Kpis"), "Kpis");
        assert_eq!(normalize_range(""), "");
    }

    #[test]
    fn stray_edge_quote_is_dropped() {
        assert_eq!(normalize_range("'Totaux!A1:B2"), "Totaux!A1:B2");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "Rémunération annuelle!A1:E5",
            "Sheet1!A1:E5",
            "\"My Sheet\"!A1:B2",
            "'Sheet1'!A1",
            "A1:Z100",
            "'Totaux!A1:B2",
            "My Sheet!'x'!A1",
            " spaced !C3",
        ];
        for input in inputs {
            let once = normalize_range(input);
            assert_eq!(normalize_range(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn qualify_adds_sheet_only_to_bare_ranges() {
        assert_eq!(
            qualify_range("Rémunération annuelle", "A1:Z100"),
            "'Rémunération annuelle'!A1:Z100"
        );
        assert_eq!(qualify_range("Ignored", "Data!A1:B2"), "Data!A1:B2");
        assert_eq!(qualify_range("", "A1:B2"), "A1:B2");
    }
}
