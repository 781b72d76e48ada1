use crate::models::address::Origin;
use crate::models::row::RawRow;
use crate::scraping::constants::*;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static ROWS: Lazy<Selector> = Lazy::new(|| selector(ROW_SELECTOR));
static NAME_FIELD: Lazy<Selector> = Lazy::new(|| selector(NAME_FIELD_SELECTOR));
static STREET: Lazy<Selector> = Lazy::new(|| selector(STREET_SELECTOR));
static CITY: Lazy<Selector> = Lazy::new(|| selector(CITY_SELECTOR));

/// What a row contributes to a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RowAddress {
    Origin(Origin),
    /// Data row without street or city text.
    Missing,
    /// The table's own header or placeholder row.
    Header,
    /// Not a data row at all (no name cell).
    NotData,
}

/// Reads every table row of a page source in document order.
pub fn parse_rows(html: &str) -> Vec<RawRow> {
    let document = Html::parse_document(html);
    document
        .select(&ROWS)
        .enumerate()
        .map(|(index, row)| RawRow {
            index,
            has_name: row.select(&NAME_FIELD).next().is_some(),
            street: field_text(row, &STREET),
            city: field_text(row, &CITY),
            text: text_without_label(row),
        })
        .collect()
}

fn field_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let text = collapse_whitespace(&row.select(selector).next()?.text().collect::<String>());
    if text.is_empty() { None } else { Some(text) }
}

fn text_without_label(row: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in row.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let inside_label = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| element.classes().any(|class| class == LABEL_CLASS))
        });
        if !inside_label {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn classify(row: &RawRow) -> RowAddress {
    if !row.has_name {
        return RowAddress::NotData;
    }
    let street = row.street.as_deref().unwrap_or_default();
    let city = row.city.as_deref().unwrap_or_default();
    if street.to_lowercase().contains(STREET_HEADER_MARKER)
        || city.to_lowercase() == CITY_HEADER_MARKER
    {
        return RowAddress::Header;
    }
    match compose_origin(street, city) {
        Some(origin) => RowAddress::Origin(Origin::new(origin)),
        None => RowAddress::Missing,
    }
}

/// One entry per input row; `None` marks a row the pass skips.
pub fn extract_origins(rows: &[RawRow]) -> Vec<Option<Origin>> {
    rows.iter()
        .map(|row| match classify(row) {
            RowAddress::Origin(origin) => Some(origin),
            _ => None,
        })
        .collect()
}

/// Joins street and city, dropping the city when the street already names it.
pub fn compose_origin(street: &str, city: &str) -> Option<String> {
    let street = street.trim();
    let city = city.trim();
    match (street.is_empty(), city.is_empty()) {
        (true, true) => None,
        (false, true) => Some(street.to_string()),
        (true, false) => Some(city.to_string()),
        (false, false) if street.to_lowercase().contains(&city.to_lowercase()) => {
            Some(street.to_string())
        }
        (false, false) => Some(format!("{}, {}", street, city)),
    }
}

/// Cheap fingerprint of the table used by the polling watcher.
pub fn signature(rows: &[RawRow]) -> String {
    rows.iter()
        .map(|row| row.text.chars().take(SIGNATURE_ROW_CHARS).collect::<String>())
        .collect::<Vec<_>>()
        .join("|")
}
