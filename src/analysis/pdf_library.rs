//! Narrow facade over the PDF parsing library.
//!
//! The orchestrator consumes PDF internals only through this module:
//! format version, encryption flags, the document information dictionary,
//! dates, the font list, page count, first-page size, and plain text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use lopdf::{Dictionary, Document, Object};
use regex::Regex;
use tracing::debug;

/// Subset-tagged font names carry an `ABCDEF+` prefix.
static SUBSET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{6}\+").unwrap());

#[derive(Debug, Clone)]
pub struct FontRecord {
    pub name: String,
    pub type_name: String,
    pub embedded: bool,
    pub subset: bool,
}

#[derive(Debug, Default)]
pub struct PdfInspection {
    pub version_major: u32,
    pub version_minor: u32,
    pub encrypted: bool,
    pub locked: bool,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub modification_date: Option<NaiveDate>,
    pub fonts: Vec<FontRecord>,
    pub num_pages: usize,
    /// Width and height of the first page, in points.
    pub page_size: Option<(f64, f64)>,
    pub text: Option<String>,
}

/// Open a PDF and extract the inspection record.
///
/// Returns `None` when the library cannot parse the file at all. On locked
/// files the font list and text extraction are skipped.
pub fn inspect(path: &Path, extract_text: bool) -> Option<PdfInspection> {
    let document = match Document::load(path) {
        Ok(document) => document,
        Err(e) => {
            debug!("pdf library rejected {}: {}", path.display(), e);
            return None;
        }
    };

    let mut inspection = PdfInspection::default();

    let mut version_parts = document.version.splitn(2, '.');
    inspection.version_major = version_parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    inspection.version_minor = version_parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    inspection.encrypted = document.trailer.get(b"Encrypt").is_ok();
    inspection.locked = inspection.encrypted;

    if let Some(info) = info_dictionary(&document) {
        inspection.creator = info_string(&document, info, b"Creator");
        inspection.producer = info_string(&document, info, b"Producer");
        inspection.author = info_string(&document, info, b"Author");
        inspection.title = info_string(&document, info, b"Title");
        inspection.subject = info_string(&document, info, b"Subject");
        inspection.keywords = info_string(&document, info, b"Keywords");
        inspection.creation_date =
            info_string(&document, info, b"CreationDate").and_then(|d| parse_pdf_date(&d));
        inspection.modification_date =
            info_string(&document, info, b"ModDate").and_then(|d| parse_pdf_date(&d));
    }

    let pages = document.get_pages();
    inspection.num_pages = pages.len();

    if let Some((_, &first_page)) = pages.iter().next() {
        if let Ok(page_dict) = document.get_dictionary(first_page) {
            inspection.page_size = media_box(&document, page_dict);
        }
    }

    if !inspection.locked {
        inspection.fonts = collect_fonts(&document, &pages);
        if extract_text {
            let numbers: Vec<u32> = pages.keys().copied().collect();
            inspection.text = document.extract_text(&numbers).ok();
        }
    }

    Some(inspection)
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    if let Object::Reference(id) = object {
        document.get_object(*id).unwrap_or(object)
    } else {
        object
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    resolve(document, info).as_dict().ok()
}

/// Decode a PDF text string: UTF-16BE with BOM, or byte-per-char.
fn decode_text(object: &Object) -> Option<String> {
    if let Object::String(bytes, _) = object {
        if bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        } else {
            Some(bytes.iter().map(|&b| b as char).collect())
        }
    } else {
        None
    }
}

fn info_string(document: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let object = info.get(key).ok()?;
    decode_text(resolve(document, object)).filter(|s| !s.is_empty())
}

/// Parse `D:YYYYMMDD…` date strings.
fn parse_pdf_date(raw: &str) -> Option<NaiveDate> {
    let digits: String = raw
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 8 {
        return None;
    }
    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// A page attribute, following the `Parent` chain for inherited entries.
fn page_attr<'a>(
    document: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    for _ in 0..32 {
        if let Ok(object) = dict.get(key) {
            return Some(resolve(document, object));
        }
        let parent = dict.get(b"Parent").ok()?;
        dict = resolve(document, parent).as_dict().ok()?;
    }
    None
}

fn media_box(document: &Document, page_dict: &Dictionary) -> Option<(f64, f64)> {
    let array = page_attr(document, page_dict, b"MediaBox")?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let coords: Vec<f64> = array
        .iter()
        .filter_map(|o| number(resolve(document, o)))
        .collect();
    if coords.len() != 4 {
        return None;
    }
    Some(((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs()))
}

fn collect_fonts(
    document: &Document,
    pages: &std::collections::BTreeMap<u32, lopdf::ObjectId>,
) -> Vec<FontRecord> {
    let mut known: HashSet<String> = HashSet::new();
    let mut fonts = Vec::new();

    for &page_id in pages.values() {
        let Ok(page_dict) = document.get_dictionary(page_id) else {
            continue;
        };
        let Some(resources) = page_attr(document, page_dict, b"Resources")
            .and_then(|o| o.as_dict().ok())
        else {
            continue;
        };
        let Some(font_map) = resources
            .get(b"Font")
            .ok()
            .map(|o| resolve(document, o))
            .and_then(|o| o.as_dict().ok())
        else {
            continue;
        };

        for (_, font_ref) in font_map.iter() {
            let Some(font_dict) = resolve(document, font_ref).as_dict().ok() else {
                continue;
            };
            if let Some(record) = font_record(document, font_dict) {
                let bare = SUBSET_TAG.replace(&record.name, "").into_owned();
                if bare.is_empty() || !known.insert(bare.clone()) {
                    continue;
                }
                fonts.push(FontRecord {
                    name: bare,
                    ..record
                });
            }
        }
    }

    fonts
}

fn font_record(document: &Document, font_dict: &Dictionary) -> Option<FontRecord> {
    let base_font = font_dict
        .get(b"BaseFont")
        .ok()
        .and_then(|o| resolve(document, o).as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())?;
    let type_name = font_dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| resolve(document, o).as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_default();

    // Composite fonts keep their descriptor on the descendant font.
    let descriptor_holder = font_dict
        .get(b"DescendantFonts")
        .ok()
        .map(|o| resolve(document, o))
        .and_then(|o| o.as_array().ok())
        .and_then(|a| a.first())
        .map(|o| resolve(document, o))
        .and_then(|o| o.as_dict().ok())
        .unwrap_or(font_dict);

    let embedded = descriptor_holder
        .get(b"FontDescriptor")
        .ok()
        .map(|o| resolve(document, o))
        .and_then(|o| o.as_dict().ok())
        .map(|descriptor| {
            descriptor.has(b"FontFile")
                || descriptor.has(b"FontFile2")
                || descriptor.has(b"FontFile3")
        })
        .unwrap_or(false);

    let subset = SUBSET_TAG.is_match(&base_font);

    Some(FontRecord {
        name: base_font,
        type_name,
        embedded,
        subset,
    })
}
