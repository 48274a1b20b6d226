//! XML fragment helpers for the report log.
//!
//! Report payloads are assembled as plain strings; only text and attribute
//! values pass through the escaper. `format_map` renders the attribute-map
//! fragments used by the tool and font classifiers.

use quick_xml::escape::{escape, unescape};

/// Escape a string for use as XML text or attribute value.
pub fn xmlify(text: &str) -> String {
    escape(text).into_owned()
}

/// Reverse of [`xmlify`], tolerant of input without entities.
pub fn dexmlify(text: &str) -> String {
    unescape(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Render a tag from an ordered list of entries.
///
/// The entry with an empty key is the element text; all other entries become
/// attributes in the order given. An empty entry list produces no output, an
/// empty text produces a self-closing tag.
pub fn format_map(tag: &str, entries: &[(&str, String)]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut text = None;
    let mut out = format!("<{}", tag);
    for (key, value) in entries {
        if key.is_empty() {
            text = Some(value.as_str());
        } else {
            out.push_str(&format!(" {}=\"{}\"", key, xmlify(value)));
        }
    }

    match text {
        Some(t) if !t.is_empty() => out.push_str(&format!(">{}</{}>\n", xmlify(t), tag)),
        _ => out.push_str(" />\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xmlify_roundtrip() {
        let raw = "a<b>&\"c\"";
        assert_eq!(dexmlify(&xmlify(raw)), raw);
    }

    #[test]
    fn test_format_map_attributes_and_text() {
        let fragment = format_map(
            "name",
            &[
                ("", "Adobe Acrobat 11.0.7".to_string()),
                ("manufacturer", "adobe".to_string()),
                ("product", "acrobat".to_string()),
            ],
        );
        assert_eq!(
            fragment,
            "<name manufacturer=\"adobe\" product=\"acrobat\">Adobe Acrobat 11.0.7</name>\n"
        );
    }

    #[test]
    fn test_format_map_self_closing() {
        assert_eq!(
            format_map("technology", &[("type", "truetype".to_string())]),
            "<technology type=\"truetype\" />\n"
        );
        assert_eq!(format_map("license", &[]), "");
    }
}
