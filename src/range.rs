use tracing::warn;

use crate::manifest::RawRow;

/// Separators accepted between the endpoints of a page range.
const RANGE_SEPARATORS: &[char] = &['-', '\u{2013}', '\u{2014}'];

/// Parse a page reference into concrete page numbers.
///
/// `"3-5"` → `[3, 4, 5]`, `"15"` → `[15]`. En-dash and em-dash work as range
/// separators. Anything non-numeric, non-positive, or reversed yields an
/// empty vec and a warning; the caller drops the row.
pub fn parse_page_range(raw: &str) -> Vec<u32> {
    let value = raw.trim();
    if value.is_empty() {
        return Vec::new();
    }

    if value.contains(RANGE_SEPARATORS) {
        return parse_separated_range(value);
    }

    match value.parse::<i64>() {
        Ok(page) if page > 0 => vec![page as u32],
        Ok(_) => {
            warn!(value, "page number must be positive");
            Vec::new()
        }
        Err(_) => {
            warn!(value, "page reference is not numeric");
            Vec::new()
        }
    }
}

fn parse_separated_range(value: &str) -> Vec<u32> {
    let parts: Vec<&str> = value.split(RANGE_SEPARATORS).collect();
    if parts.len() != 2 {
        warn!(value, "page range must have exactly two endpoints");
        return Vec::new();
    }

    let (start, end) = match (
        parts[0].trim().parse::<i64>(),
        parts[1].trim().parse::<i64>(),
    ) {
        (Ok(start), Ok(end)) => (start, end),
        _ => {
            warn!(value, "page range endpoints are not numeric");
            return Vec::new();
        }
    };

    if start <= 0 || end <= 0 {
        warn!(value, "page range endpoints must be positive");
        return Vec::new();
    }
    if start > end {
        warn!(value, "page range start exceeds end");
        return Vec::new();
    }

    (start as u32..=end as u32).collect()
}

/// Does any row carry a range-style page reference?
pub fn has_page_ranges(rows: &[RawRow], page_column: &str) -> bool {
    rows.iter().any(|row| {
        row.get(page_column)
            .map(|value| value.contains(RANGE_SEPARATORS))
            .unwrap_or(false)
    })
}

/// Expand every row so each output row references exactly one page.
///
/// Rows whose page field is empty or missing pass through untouched (left to
/// downstream validation). Rows with an invalid reference are dropped and
/// counted. Expansion preserves input order and emits range pages ascending.
pub fn expand_rows(rows: &[RawRow], page_column: &str) -> (Vec<RawRow>, usize) {
    let mut expanded = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        let reference = match row.get(page_column) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => {
                expanded.push(row.clone());
                continue;
            }
        };

        let pages = parse_page_range(&reference);
        if pages.is_empty() {
            dropped += 1;
            continue;
        }

        for page in pages {
            let mut copy = row.clone();
            copy.insert(page_column.to_string(), page.to_string());
            expanded.push(copy);
        }
    }

    (expanded, dropped)
}
