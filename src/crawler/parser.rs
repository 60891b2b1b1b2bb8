//! Page extractor
//!
//! Turns a fetched reference page into the identifiers it links to and the
//! metadata of each. Extraction is a single pre-order walk over the parsed
//! document:
//!
//! 1. An `<h3>` containing the related-listing marker stops extraction for
//!    the rest of the page. Everything after it lists siblings, not children.
//! 2. Each table row whose first cell is not a header label contributes its
//!    remaining cells to a field accumulator (at most five fields).
//! 3. Each link that looks like a child identifier takes the accumulated
//!    fields as its record, and the accumulator starts over.
//!
//! Unrecognized markup is not an error; it just yields nothing.

use crate::state::OidRecord;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;
use thiserror::Error;

/// Heading text that marks the start of the related-nodes listing
pub const RELATED_LISTING_MARKER: &str = "Brothers";

/// First-cell labels of column header rows
const HEADER_LABELS: [&str; 2] = ["Node", "OID"];

/// Number of positional fields in a row
const ROW_FIELDS: usize = 5;

/// Errors produced while extracting a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Page body is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Child identifiers discovered on one page, with their records
pub type Extracted = HashMap<String, OidRecord>;

/// Extracts child identifiers and their records from a page body
///
/// # Returns
///
/// * `Ok(Extracted)` - Discovered identifiers, possibly empty
/// * `Err(ExtractError)` - The body could not be decoded
///
/// # Example
///
/// ```
/// use oid_walker::crawler::extract;
///
/// let page = r#"<table>
///     <tr><th>Node</th><th>Name</th></tr>
///     <tr><td><a href="/1">1</a></td><td>iso</td><td>4</td></tr>
/// </table>"#;
/// let found = extract(page.as_bytes()).unwrap();
/// assert_eq!(found["/1"].name, "iso");
/// assert_eq!(found["/1"].sub_children, 4);
/// ```
pub fn extract(body: &[u8]) -> Result<Extracted, ExtractError> {
    let text = std::str::from_utf8(body)?;
    Ok(extract_str(text))
}

/// Extracts from already-decoded page text
pub fn extract_str(html: &str) -> Extracted {
    let document = Html::parse_document(html);
    let mut found = Extracted::new();
    let mut fields: Vec<String> = Vec::with_capacity(ROW_FIELDS);

    for node in document.tree.root().descendants() {
        let element = match ElementRef::wrap(node) {
            Some(element) => element,
            None => continue,
        };

        match element.value().name() {
            "h3" if is_related_heading(element) => break,
            "tr" => {
                if is_header_row(element) {
                    continue;
                }
                for field in row_fields(element) {
                    if fields.len() >= ROW_FIELDS {
                        break;
                    }
                    fields.push(field);
                }
            }
            "a" => {
                if let Some(href) = element.value().attr("href") {
                    if is_child_link(href) {
                        found.insert(href.to_string(), OidRecord::from_fields(&fields));
                        fields.clear();
                    }
                }
            }
            _ => {}
        }
    }

    found
}

/// True for the heading that introduces the related-nodes listing
fn is_related_heading(heading: ElementRef) -> bool {
    heading
        .text()
        .collect::<String>()
        .contains(RELATED_LISTING_MARKER)
}

/// Cells of a row, in order, regardless of whitespace between them
fn cells<'a>(row: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
}

/// True for column header rows and rows without cells
fn is_header_row(row: ElementRef) -> bool {
    match cells(row).next() {
        Some(first) => HEADER_LABELS.contains(&leading_text(first).as_str()),
        None => true,
    }
}

/// Field values of a data row: every cell after the first (which holds the
/// identifier link), up to five
pub fn row_fields(row: ElementRef) -> Vec<String> {
    cells(row).skip(1).take(ROW_FIELDS).map(leading_text).collect()
}

/// Leading text of a cell
///
/// The first non-blank text directly inside the cell, or the full text of
/// the cell's first child element when the cell starts with markup. Long
/// information cells only contribute their opening sentence this way.
fn leading_text(cell: ElementRef) -> String {
    for child in cell.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    return element.text().collect::<String>().trim().to_string();
                }
            }
            _ => {}
        }
    }
    String::new()
}

/// True when `href` looks like a relative child identifier
///
/// Short paths such as `/` or `/1`, or dotted paths such as `/1.3.6`.
/// Absolute addresses and MIB registry pages are excluded.
pub fn is_child_link(href: &str) -> bool {
    href.starts_with('/')
        && (href.len() < 3 || href.contains('.'))
        && !href.contains("http")
        && !href.contains("mib")
}
