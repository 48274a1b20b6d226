//! Font name classification.
//!
//! Produces, for a PDF font record, the raw name, a beautified name with
//! weight/style/subsetting decorations stripped, a license block, and the
//! font technology. The signature decisions are contractual.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::xml::format_map;

/// Subset tag prefix such as `ABCDEF+`.
static SUBSET_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]+\+").unwrap());
/// TeX font families carry trailing size digits: `CMR10`, `wasy10`.
static TEX_FONT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((CM|SF|MS)[A-Z]+|wasy)([0-9]+)$").unwrap());
static TEX_FAMILY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CM|SF|MS)[A-Z]+[0-9]+$").unwrap());

/// Literal suffixes stripped during beautification, checked in order.
const SUFFIXES: [&str; 41] = [
    "MT",
    "PS",
    "BT",
    "Bk",
    "-Normal",
    "-Book",
    "-Md",
    "-Medium",
    "-Caps",
    "-Roman",
    "-Roma",
    "-Regular",
    "-Regu",
    "-DisplayRegular",
    "-Demi",
    "-Blk",
    "-Black",
    "Bla",
    "-Ultra",
    "-Extra",
    "-ExtraBold",
    "Obl",
    "-Hv",
    "-HvIt",
    "-Heavy",
    "-BoldIt",
    "-BoldItal",
    "-BdIt",
    "-Bd",
    "-It",
    "-Condensed",
    "-Light",
    "-Lt",
    "-Slant",
    "-LightCond",
    "Lig",
    "-Narrow",
    "Ext",
    "SWA",
    "-Identity-H",
    "-DTC",
];

static SUFFIX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[,-]?(Ital(ic)?|Oblique|Black|Bold)$",
        r"[,-](BdCn|SC)[0-9]*$",
        r"[,-][A-Z][0-9]$",
        r"_[0-9]+$",
        r"^[A-Z]+[+]",
        r"[+][A-Z]+$",
        r"[*][0-9]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

struct License {
    kind: &'static str,
    name: Option<&'static str>,
}

fn open(name: Option<&'static str>) -> License {
    License { kind: "open", name }
}

fn proprietary() -> License {
    License {
        kind: "proprietary",
        name: None,
    }
}

fn classify_license(name: &str) -> License {
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));
    let contains = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

    if name.contains("Libertine") {
        open(Some("SIL Open Font License;GNU General Public License"))
    } else if name.contains("Nimbus") {
        open(Some(
            "GNU General Public License;Aladdin Free Public License",
        ))
    } else if name.starts_with("URWPalladio") {
        open(None)
    } else if contains(&["Liberation", "DejaVu"]) {
        open(None)
    } else if name.contains("Ubuntu") {
        open(Some("Ubuntu Font Licence"))
    } else if name.contains("Gentium") {
        open(None)
    } else if starts(&["FreeSans", "FreeSerif", "FreeMono"]) {
        open(None)
    } else if contains(&["Vera", "Bera"]) {
        open(None)
    } else if name.contains("Computer Modern") {
        open(Some("SIL Open Font License"))
    } else if name.starts_with("wasy") || TEX_FAMILY.is_match(name) {
        open(Some("SIL Open Font License"))
    } else if name.contains("Marvosym") {
        open(Some("SIL Open Font License"))
    } else if name.contains("OpenSymbol") {
        open(Some("LGPLv3?"))
    } else if name.starts_with("MnSymbol") {
        open(Some("PD"))
    } else if name.starts_with("Antenna") {
        proprietary()
    } else if starts(&["Gotham", "NewLibrisSerif"]) {
        proprietary()
    } else if starts(&["Zapf", "Frutiger"]) {
        proprietary()
    } else if starts(&["Arial", "Verdana", "TimesNewRoman", "CourierNew", "Georgia"])
        || name == "Symbol"
    {
        proprietary()
    } else if starts(&[
        "Lucinda",
        "Trebuchet",
        "Franklin Gothic",
        "Century Schoolbook",
        "CenturySchoolbook",
    ]) {
        proprietary()
    } else if starts(&[
        "Calibri",
        "Cambria",
        "Constantia",
        "Candara",
        "Corbel",
        "Consolas",
    ]) {
        proprietary()
    } else if starts(&["Futura", "NewCenturySchlbk", "TradeGothic", "Univers"])
        || name.contains("Palatino")
    {
        proprietary()
    } else if contains(&["Monospace821", "Swiss721", "Dutch801"]) {
        proprietary()
    } else if name.contains("Helvetica") && name.contains("Neue") {
        proprietary()
    } else if starts(&["Times", "Tahoma"]) || contains(&["Helvetica", "Wingdings"]) {
        proprietary()
    } else if name.starts_with("SymbolMT") {
        proprietary()
    } else if starts(&[
        "CenturyGothic",
        "Bembo",
        "GillSans",
        "Rockwell",
        "Lucida",
        "Perpetua",
    ]) {
        proprietary()
    } else if starts(&["ACaslon", "Minion", "Myriad"]) || name.contains("EuroSans") {
        proprietary()
    } else if name.starts_with("DIN") {
        proprietary()
    } else if contains(&["Officina", "Kabel", "Cheltenham"]) {
        proprietary()
    } else if starts(&["Bookman Old Style", "Gill Sans"]) {
        proprietary()
    } else {
        // "Courier" could be either.
        License {
            kind: "unknown",
            name: None,
        }
    }
}

/// Strip decorations until nothing changes anymore.
fn beautify(name: &str) -> String {
    let mut current = name.to_string();
    loop {
        let before = current.clone();

        for suffix in SUFFIXES {
            if let Some(stripped) = current.strip_suffix(suffix) {
                current = stripped.to_string();
            }
        }
        for pattern in SUFFIX_PATTERNS.iter() {
            current = pattern.replace(&current, "").into_owned();
        }
        current = TEX_FONT.replace(&current, "$1").into_owned();

        if current == before {
            return current;
        }
    }
}

/// Classify one font into its XML fragment: name, beautified name,
/// technology, and license.
pub fn classify_font(font_name: &str, type_name: &str) -> String {
    let base = SUBSET_PREFIX.replace(font_name, "").into_owned();
    let license = classify_license(&base);
    let beautified = beautify(&base);

    let technology = {
        let text = type_name.to_lowercase();
        if text.contains("truetype") {
            Some("truetype")
        } else if text.contains("type1") {
            Some("type1")
        } else if text.contains("type3") {
            Some("type3")
        } else {
            None
        }
    };

    let mut fragment = format_map("name", &[("", font_name.to_string())]);
    fragment.push_str(&format_map("beautified", &[("", beautified)]));
    if let Some(technology) = technology {
        fragment.push_str(&format_map("technology", &[("type", technology.to_string())]));
    }
    let mut license_entries: Vec<(&str, String)> = vec![("type", license.kind.to_string())];
    if let Some(name) = license.name {
        license_entries.push(("name", name.to_string()));
    }
    fragment.push_str(&format_map("license", &license_entries));

    fragment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_truetype_font() {
        let fragment = classify_font("ABCDEF+TimesNewRomanPS-BoldMT", "TrueType (CID)");
        assert!(fragment.contains("<name>ABCDEF+TimesNewRomanPS-BoldMT</name>"));
        assert!(fragment.contains("<beautified>TimesNewRoman</beautified>"));
        assert!(fragment.contains("<technology type=\"truetype\" />"));
        assert!(fragment.contains("<license type=\"proprietary\" />"));
    }

    #[test]
    fn test_open_font_with_license_name() {
        let fragment = classify_font("LinLibertine-Italic", "Type 1");
        assert!(fragment.contains("<license type=\"open\""));
        assert!(fragment.contains("SIL Open Font License;GNU General Public License"));
        assert!(fragment.contains("<technology type=\"type1\" />"));
        assert!(fragment.contains("<beautified>LinLibertine</beautified>"));
    }

    #[test]
    fn test_tex_font_collapses_size() {
        let fragment = classify_font("CMR10", "Type 3");
        assert!(fragment.contains("<beautified>CMR</beautified>"));
        assert!(fragment.contains("<license type=\"open\""));
        assert!(fragment.contains("<technology type=\"type3\" />"));
    }

    #[test]
    fn test_beautify_iterates_to_fixed_point() {
        assert_eq!(beautify("ArialMT"), "Arial");
        assert_eq!(beautify("Arial-BoldMT"), "Arial");
        assert_eq!(beautify("Helvetica,Italic"), "Helvetica");
        assert_eq!(beautify("Garamond_0"), "Garamond");
        assert_eq!(beautify("Courier"), "Courier");
    }

    #[test]
    fn test_unknown_license() {
        let fragment = classify_font("Courier", "Type 1");
        assert!(fragment.contains("<license type=\"unknown\" />"));
    }

    #[test]
    fn test_no_technology_when_type_unknown() {
        let fragment = classify_font("Arial", "");
        assert!(!fragment.contains("<technology"));
        assert!(fragment.contains("<license type=\"proprietary\" />"));
    }
}
