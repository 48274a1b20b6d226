//! Creator/producer string classification.
//!
//! Maps the free-text tool names found in document metadata onto a
//! manufacturer/product/version fragment. Matching is by ordered substring
//! tests; the first signature wins. All regexes compile once at startup.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::xml::format_map;

static VERSION_DOTTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)+\b").unwrap());
static VERSION_RADICALEYE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\.\d+[a-z]*\b").unwrap());
static VERSION_TEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+([.:]\d+)+\b").unwrap());
static VERSION_SLASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+([.]\d+)*)\b").unwrap());
static VERSION_V_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+(\.\d+)+)\b").unwrap());
static VERSION_OPT_V: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[v]?\d+(\.\d+)+\b").unwrap());
static VERSION_SUFFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)+[a-z]?\b").unwrap());
static VERSION_FRAMEMAKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)+(\b|\.|p\d+)").unwrap());
static VERSION_PDFLIB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.[0-9p]+)+\b").unwrap());
static VERSION_DVIPDFM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)+[a-z]*\b").unwrap());
static VERSION_3B2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(\.[0-9a-z]+)+").unwrap());
static VERSION_EDOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ver (\d+(\.\d+)+)\b").unwrap());
static VERSION_PDFCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{8}|\d+(\.\d+)+)\b").unwrap());
static VERSION_ALIVEPDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(\.\d+)+( rc)?\b").unwrap());
static VERSION_SCANSOFT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-zA-Z]+[ ])?[A-Za-z0-9]+\b").unwrap());
static VERSION_SYMPHONY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"symphony (\d+(\.\d+)*)").unwrap());
static VERSION_ITEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((\d+)(\.\d+)+)\b").unwrap());
static VERSION_PHOTOSHOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCS|(CS)?\d+(\.\d+)+\b").unwrap());
static CREATIVE_SUITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcs(\d*)\b").unwrap());
static MICROSOFT_PRODUCTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"powerpoint|excel|word|outlook|visio|access").unwrap());
static MICROSOFT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(starter )?(20[01][0-9]|1?[0-9]\.[0-9]+|9[5-9])\b").unwrap()
});
static OOO_PLATFORM_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[a-z]/(\d(\.\d+)+)(_beta|pre)?").unwrap());
static OOO_PLAIN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+(\.\d+)+)\b").unwrap());

/// Classification result, rendered as one `<name …>` fragment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ToolGuess {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub based_on: Option<String>,
    pub version: Option<String>,
    pub subversion: Option<String>,
    pub license: Option<String>,
    pub opsys: Option<String>,
}

impl ToolGuess {
    fn fragment(&self, raw: &str) -> String {
        let mut entries: Vec<(&str, String)> = vec![("", raw.to_string())];
        if let Some(v) = &self.manufacturer {
            entries.push(("manufacturer", v.clone()));
        }
        if let Some(v) = &self.product {
            entries.push(("product", v.clone()));
        }
        if let Some(v) = &self.based_on {
            entries.push(("based-on", v.clone()));
        }
        if let Some(v) = &self.version {
            entries.push(("version", v.clone()));
        }
        if let Some(v) = &self.subversion {
            entries.push(("subversion", v.clone()));
        }
        if let Some(v) = &self.license {
            entries.push(("license", v.clone()));
        }
        if let Some(v) = &self.opsys {
            entries.push(("opsys", v.clone()));
        }
        format_map("name", &entries)
    }
}

fn capture(regex: &Regex, text: &str, group: usize) -> Option<String> {
    regex
        .captures(text)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().to_string())
}

/// Product name left over once the vendor keyword and version are removed.
fn scrubbed_product(text: &str, remove: &[&str], version: Option<&str>) -> String {
    let mut product = text.to_string();
    for needle in remove {
        product = product.replace(needle, "");
    }
    if let Some(version) = version {
        product = product.replace(version, "");
    }
    product = product.replace(' ', "");
    format!("{}?", product)
}

/// Map an Adobe Creative Suite tag to an explicit version number.
fn creative_suite_version(text: &str, base: f64) -> Option<String> {
    let caps = CREATIVE_SUITE.captures(text)?;
    let digits = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    if digits.is_empty() {
        // Plain "CS" is the first release of the suite.
        return Some(format!("{:.1}", base));
    }
    let n: f64 = digits.parse().ok()?;
    if n > 1.0 {
        Some(format!("{:.1}", n + base - 1.0))
    } else {
        None
    }
}

/// Classify a creator/producer string into a `<name …>` fragment.
pub fn classify_tool(program: &str) -> String {
    let text = program.to_lowercase();
    let mut guess = ToolGuess::default();
    let mut check_ooo_version = false;

    if text.contains("dvips") {
        guess.manufacturer = Some("radicaleye".into());
        guess.version = capture(&VERSION_RADICALEYE, &text, 0);
    } else if text.contains("ghostscript") {
        guess.manufacturer = Some("artifex".into());
        guess.product = Some("ghostscript".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("cairo ") {
        guess.manufacturer = Some("cairo".into());
        guess.product = Some("cairo".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pdftex") {
        guess.manufacturer = Some("pdftex".into());
        guess.product = Some("pdftex".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("latex") {
        guess.manufacturer = Some("latex".into());
        guess.product = Some("latex".into());
    } else if text.contains("dvipdfm") {
        guess.manufacturer = Some("dvipdfm".into());
        guess.product = Some("dvipdfm".into());
        guess.version = capture(&VERSION_DVIPDFM, &text, 0);
    } else if text.contains("tex output") {
        guess.manufacturer = Some("tex".into());
        guess.product = Some("tex".into());
        guess.version = capture(&VERSION_TEX, &text, 0);
    } else if text.contains("koffice") {
        guess.manufacturer = Some("kde".into());
        guess.product = Some("koffice".into());
        guess.version = capture(&VERSION_SLASHED, &text, 1);
    } else if text.contains("calligra") {
        guess.manufacturer = Some("kde".into());
        guess.product = Some("calligra".into());
        guess.version = capture(&VERSION_SLASHED, &text, 1);
    } else if text.contains("abiword") {
        guess.manufacturer = Some("abisource".into());
        guess.product = Some("abiword".into());
    } else if text.contains("office_one") {
        check_ooo_version = true;
        guess.product = Some("office_one".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("infraoffice") {
        check_ooo_version = true;
        guess.product = Some("infraoffice".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("aksharnaveen") {
        check_ooo_version = true;
        guess.product = Some("aksharnaveen".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("redoffice") {
        check_ooo_version = true;
        guess.manufacturer = Some("china".into());
        guess.product = Some("redoffice".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("sun_odf_plugin") {
        check_ooo_version = true;
        guess.manufacturer = Some("oracle".into());
        guess.product = Some("odfplugin".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("libreoffice") {
        check_ooo_version = true;
        guess.manufacturer = Some("tdf".into());
        guess.product = Some("libreoffice".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("lotus symphony") {
        guess.manufacturer = Some("ibm".into());
        guess.product = Some("lotus-symphony".into());
        guess.based_on = Some("openoffice".into());
        guess.version = capture(&VERSION_SYMPHONY, &text, 1);
    } else if text.contains("lotus_symphony") {
        check_ooo_version = true;
        guess.manufacturer = Some("ibm".into());
        guess.product = Some("lotus-symphony".into());
        guess.based_on = Some("openoffice".into());
    } else if text.contains("openoffice") {
        check_ooo_version = true;
        if text.contains("staroffice") {
            guess.manufacturer = Some("oracle".into());
            guess.based_on = Some("openoffice".into());
            guess.product = Some("staroffice".into());
        } else if text.contains("broffice") {
            guess.product = Some("broffice".into());
            guess.based_on = Some("openoffice".into());
        } else if text.contains("neooffice") {
            guess.manufacturer = Some("planamesa".into());
            guess.product = Some("neooffice".into());
            guess.based_on = Some("openoffice".into());
        } else {
            guess.manufacturer = Some("oracle".into());
            guess.product = Some("openoffice".into());
        }
    } else if text == "writer" || text == "calc" || text == "impress" {
        // Bare module names appear in creator strings.
        guess.manufacturer = Some("oracle;tdf".into());
        guess.product = Some("openoffice;libreoffice".into());
        guess.based_on = Some("openoffice".into());
    } else if text.starts_with("pdfscanlib ") {
        guess.manufacturer = Some("kodak?".into());
        guess.product = Some("pdfscanlib".into());
        guess.version = capture(&VERSION_V_PREFIXED, &text, 1);
    } else if text.contains("framemaker") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("framemaker".into());
        guess.version = capture(&VERSION_FRAMEMAKER, &text, 0);
    } else if text.contains("distiller") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("distiller".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("pdflib plop") {
        guess.manufacturer = Some("pdflib".into());
        guess.product = Some("plop".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("pdflib") {
        guess.manufacturer = Some("pdflib".into());
        guess.product = Some("pdflib".into());
        guess.version = capture(&VERSION_PDFLIB, &text, 0);
    } else if text.contains("pdf library") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("pdflibrary".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pdfwriter") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("pdfwriter".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("easypdf") {
        guess.manufacturer = Some("bcl".into());
        guess.product = Some("easypdf".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pdfmaker") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("pdfmaker".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("fill-in ") {
        guess.manufacturer = Some("textcenter".into());
        guess.product = Some("fill-in".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("itext ") {
        guess.manufacturer = Some("itext".into());
        guess.product = Some("itext".into());
        if let Some(caps) = VERSION_ITEXT.captures(&text) {
            guess.version = Some(caps[1].to_string());
            if let Ok(major) = caps[2].parse::<u32>() {
                if major > 0 && major <= 4 {
                    guess.license = Some("MPL;LGPL".into());
                } else if major >= 5 {
                    guess.license = Some("commercial;AGPLv3".into());
                }
            }
        }
    } else if text.starts_with("amyuni pdf converter ") {
        guess.manufacturer = Some("amyuni".into());
        guess.product = Some("pdfconverter".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pdfout v") {
        guess.manufacturer = Some("verypdf".into());
        guess.product = Some("docconverter".into());
        guess.version = capture(&VERSION_V_PREFIXED, &text, 1);
    } else if text.contains("jaws pdf creator") {
        guess.manufacturer = Some("jaws".into());
        guess.product = Some("pdfcreator".into());
        guess.version = capture(&VERSION_V_PREFIXED, &text, 1);
    } else if text.starts_with("arbortext ") {
        guess.manufacturer = Some("ptc".into());
        guess.product = Some("arbortext".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("3b2") {
        guess.manufacturer = Some("ptc".into());
        guess.product = Some("3b2".into());
        guess.version = capture(&VERSION_3B2, &text, 0);
    } else if text.starts_with("3-heights") {
        guess.manufacturer = Some("pdftoolsag".into());
        guess.product = Some("3-heights".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("abcpdf") {
        guess.manufacturer = Some("websupergoo".into());
        guess.product = Some("abcpdf".into());
    } else if text.contains("primopdf") {
        guess.manufacturer = Some("nitro".into());
        guess.product = Some("primopdf".into());
        guess.based_on = Some("nitropro".into());
    } else if text.contains("nitro") {
        guess.manufacturer = Some("nitro".into());
        guess.product = Some("nitropro".into());
    } else if text.contains("pdffactory") {
        guess.manufacturer = Some("softwarelabs".into());
        guess.product = Some("pdffactory".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("ibex pdf") {
        guess.manufacturer = Some("visualprogramming".into());
        guess.product = Some("ibexpdfcreator".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("arc/info") || text.starts_with("arcinfo") {
        guess.manufacturer = Some("esri".into());
        guess.product = Some("arcinfo".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("paperport ") {
        guess.manufacturer = Some("nuance".into());
        guess.product = Some("paperport".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("indesign") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("indesign".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0)
            .or_else(|| creative_suite_version(&text, 3.0));
    } else if text.contains("illustrator") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("illustrator".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0)
            .or_else(|| creative_suite_version(&text, 11.0));
    } else if text.contains("pagemaker") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("pagemaker".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("acrobat capture") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("acrobatcapture".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("acrobat pro") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("acrobatpro".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("acrobat") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("acrobat".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("livecycle") {
        guess.manufacturer = Some("adobe".into());
        guess.version = capture(&VERSION_SUFFIXED, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["adobe"], Some(&version)));
    } else if text.starts_with("adobe photoshop elements") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("photoshopelements".into());
    } else if text.starts_with("adobe photoshop") {
        guess.manufacturer = Some("adobe".into());
        guess.product = Some("photoshop".into());
        guess.version = capture(&VERSION_PHOTOSHOP, &text, 0);
    } else if text.contains("adobe") {
        // Some unknown Adobe product.
        guess.manufacturer = Some("adobe".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["adobe"], Some(&version)));
    } else if text.contains("pages") {
        guess.manufacturer = Some("apple".into());
        guess.product = Some("pages".into());
    } else if text.contains("keynote") {
        guess.manufacturer = Some("apple".into());
        guess.product = Some("keynote".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("quartz") {
        guess.manufacturer = Some("apple".into());
        guess.product = Some("quartz".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pscript5.dll") || text.contains("pscript.dll") {
        guess.manufacturer = Some("microsoft".into());
        guess.product = Some("pscript".into());
        guess.opsys = Some("windows".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("quarkxpress") {
        guess.manufacturer = Some("quark".into());
        guess.product = Some("xpress".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("pdfcreator") {
        guess.manufacturer = Some("pdfforge".into());
        guess.product = Some("pdfcreator".into());
        guess.opsys = Some("windows".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("stamppdf batch") {
        guess.manufacturer = Some("appligent".into());
        guess.product = Some("stamppdfbatch".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("xyenterprise ") {
        guess.manufacturer = Some("dakota".into());
        guess.product = Some("xyenterprise".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.starts_with("edocprinter ") {
        guess.manufacturer = Some("itek".into());
        guess.product = Some("edocprinter".into());
        guess.version = capture(&VERSION_EDOC, &text, 1);
    } else if text.starts_with("pdf code ") {
        guess.manufacturer = Some("europeancommission".into());
        guess.product = Some("pdfcode".into());
        guess.version = capture(&VERSION_PDFCODE, &text, 1);
    } else if text.contains("pdf printer") {
        guess.manufacturer = Some("bullzip".into());
        guess.product = Some("pdfprinter".into());
    } else if text.contains("aspose") && text.contains("words") {
        guess.manufacturer = Some("aspose".into());
        guess.product = Some("aspose.words".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("arcmap") {
        guess.manufacturer = Some("esri".into());
        guess.product = Some("arcmap".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("ocad") {
        guess.manufacturer = Some("ocad".into());
        guess.product = Some("ocad".into());
        guess.version = capture(&VERSION_DOTTED, &text, 0);
    } else if text.contains("gnostice") {
        guess.manufacturer = Some("gnostice".into());
        guess.version = capture(&VERSION_OPT_V, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["gnostice"], Some(&version)));
    } else if text.contains("canon") {
        guess.manufacturer = Some("canon".into());
        guess.version = capture(&VERSION_OPT_V, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["canon"], Some(&version)));
    } else if text.starts_with("creo") {
        guess.manufacturer = Some("creo".into());
        guess.product = Some(scrubbed_product(&text, &["creo"], None));
    } else if text.contains("apogee") {
        guess.manufacturer = Some("agfa".into());
        guess.product = Some("apogee".into());
    } else if text.contains("ricoh") {
        guess.manufacturer = Some("ricoh".into());
        if let Some(i) = text.find("aficio") {
            guess.product = Some(text[i..].replace(' ', ""));
        }
    } else if text.contains("toshiba") || text.contains("mfpimglib") {
        guess.manufacturer = Some("toshiba".into());
        guess.version = capture(&VERSION_OPT_V, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["toshiba"], Some(&version)));
    } else if text.starts_with("hp ") || text.starts_with("hewlett packard ") {
        guess.manufacturer = Some("hewlettpackard".into());
        guess.product = Some(scrubbed_product(&text, &["hp ", "hewlett packard"], None));
    } else if text.starts_with("xerox ") {
        guess.manufacturer = Some("xerox".into());
        guess.product = Some(scrubbed_product(&text, &["xerox "], None));
    } else if text.starts_with("kodak ") {
        guess.manufacturer = Some("kodak".into());
        guess.product = Some(scrubbed_product(&text, &["kodak ", "scanner: "], None));
    } else if text.contains("konica") || text.contains("minolta") {
        guess.manufacturer = Some("konica;minolta".into());
        guess.version = capture(&VERSION_OPT_V, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(
            &text,
            &["konica", "minolta"],
            Some(&version),
        ));
    } else if text.contains("corel") {
        guess.manufacturer = Some("corel".into());
        guess.version = capture(&VERSION_OPT_V, &text, 0);
        let version = guess.version.clone().unwrap_or_default();
        guess.product = Some(scrubbed_product(&text, &["corel"], Some(&version)));
    } else if text.contains("scansoft pdf create") {
        guess.manufacturer = Some("scansoft".into());
        guess.product = Some("pdfcreate".into());
        guess.version = capture(&VERSION_SCANSOFT, &text, 0);
    } else if text.contains("alivepdf") {
        guess.manufacturer = Some("thibault.imbert".into());
        guess.product = Some("alivepdf".into());
        guess.version = capture(&VERSION_ALIVEPDF, &text, 0);
        guess.opsys = Some("flash".into());
    } else if text == "google" {
        guess.manufacturer = Some("google".into());
        guess.product = Some("docs".into());
    } else if !text.contains("words") {
        // Final sweep for Microsoft Office products.
        if let Some(product) = capture(&MICROSOFT_PRODUCTS, &text, 0) {
            guess.manufacturer = Some("microsoft".into());
            guess.product = Some(product);
            if let Some(caps) = MICROSOFT_VERSION.captures(&text) {
                if guess.version.is_none() {
                    guess.version = Some(caps[2].to_string());
                }
                if guess.subversion.is_none() {
                    if let Some(starter) = caps.get(1) {
                        guess.subversion = Some(starter.as_str().to_string());
                    }
                }
            }
            if text.contains("macintosh") || text.contains("mac os x") {
                guess.opsys = Some("macosx".into());
            } else {
                guess.opsys = Some("windows?".into());
            }
        }
    }

    if check_ooo_version {
        // Version tails look like "Win32/2.3.1".
        guess.version = capture(&OOO_PLATFORM_VERSION, &text, 1)
            .or_else(|| capture(&OOO_PLAIN_VERSION, &text, 1));

        if text.contains("unix") {
            guess.opsys = Some("generic-unix".into());
        } else if text.contains("linux") {
            guess.opsys = Some("linux".into());
        } else if text.contains("win32") {
            guess.opsys = Some("windows".into());
        } else if text.contains("solaris") {
            guess.opsys = Some("solaris".into());
        } else if text.contains("freebsd") {
            guess.opsys = Some("bsd".into());
        }
    }

    if guess.manufacturer.is_none() && (text.contains("adobe") || text.contains("acrobat")) {
        guess.manufacturer = Some("adobe".into());
    }

    if guess.opsys.is_none() {
        if text.contains("macint") {
            guess.opsys = Some("macosx".into());
        } else if text.contains("solaris") {
            guess.opsys = Some("solaris".into());
        } else if text.contains("linux") {
            guess.opsys = Some("linux".into());
        } else if text.contains("windows") || text.contains("win32") || text.contains("win64") {
            guess.opsys = Some("windows".into());
        }
    }

    guess.fragment(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adobe_acrobat() {
        let fragment = classify_tool("Adobe Acrobat 11.0.7");
        assert!(fragment.contains("manufacturer=\"adobe\""));
        assert!(fragment.contains("product=\"acrobat\""));
        assert!(fragment.contains("version=\"11.0.7\""));
        assert!(fragment.contains(">Adobe Acrobat 11.0.7</name>"));
    }

    #[test]
    fn test_first_signature_wins() {
        // "acrobat distiller" must classify as distiller, not acrobat.
        let fragment = classify_tool("Acrobat Distiller 9.5.5 (Windows)");
        assert!(fragment.contains("product=\"distiller\""));
        assert!(fragment.contains("version=\"9.5.5\""));
        assert!(fragment.contains("opsys=\"windows\""));
    }

    #[test]
    fn test_ghostscript() {
        let fragment = classify_tool("GPL Ghostscript 9.26");
        assert!(fragment.contains("manufacturer=\"artifex\""));
        assert!(fragment.contains("product=\"ghostscript\""));
        assert!(fragment.contains("version=\"9.26\""));
    }

    #[test]
    fn test_libreoffice_platform_version() {
        let fragment = classify_tool("LibreOffice/Win32/6.4.2_beta2");
        assert!(fragment.contains("manufacturer=\"tdf\""));
        assert!(fragment.contains("product=\"libreoffice\""));
        assert!(fragment.contains("based-on=\"openoffice\""));
        assert!(fragment.contains("version=\"6.4.2\""));
        assert!(fragment.contains("opsys=\"windows\""));
    }

    #[test]
    fn test_creative_suite_mapping() {
        let fragment = classify_tool("Adobe InDesign CS5 (7.0)");
        // The explicit dotted version wins over the CS tag.
        assert!(fragment.contains("version=\"7.0\""));

        let fragment = classify_tool("Adobe InDesign CS2");
        assert!(fragment.contains("version=\"4.0\""));
        let fragment = classify_tool("Adobe InDesign CS");
        assert!(fragment.contains("version=\"3.0\""));
        let fragment = classify_tool("Adobe Illustrator CS");
        assert!(fragment.contains("version=\"11.0\""));
        let fragment = classify_tool("Adobe Illustrator CS3");
        assert!(fragment.contains("version=\"13.0\""));
    }

    #[test]
    fn test_microsoft_sweep() {
        let fragment = classify_tool("Microsoft Word 2010");
        assert!(fragment.contains("manufacturer=\"microsoft\""));
        assert!(fragment.contains("product=\"word\""));
        assert!(fragment.contains("version=\"2010\""));
        assert!(fragment.contains("opsys=\"windows?\""));

        let fragment = classify_tool("Microsoft Excel 14.0 for Mac OS X");
        assert!(fragment.contains("product=\"excel\""));
        assert!(fragment.contains("version=\"14.0\""));
        assert!(fragment.contains("opsys=\"macosx\""));

        let fragment = classify_tool("Microsoft PowerPoint Starter 2010");
        assert!(fragment.contains("product=\"powerpoint\""));
        assert!(fragment.contains("subversion=\"starter \""));
    }

    #[test]
    fn test_itext_license_by_major_version() {
        let fragment = classify_tool("iText 2.1.7 by 1T3XT");
        assert!(fragment.contains("license=\"MPL;LGPL\""));
        let fragment = classify_tool("iText 5.5.10");
        assert!(fragment.contains("license=\"commercial;AGPLv3\""));
    }

    #[test]
    fn test_tex_toolchain() {
        let fragment = classify_tool("dvips(k) 5.98 Copyright 2009 Radical Eye Software");
        assert!(fragment.contains("manufacturer=\"radicaleye\""));
        assert!(fragment.contains("version=\"5.98\""));

        let fragment = classify_tool("pdfTeX-1.40.21");
        assert!(fragment.contains("product=\"pdftex\""));
        assert!(fragment.contains("version=\"1.40.21\""));

        let fragment = classify_tool("TeX output 2019.03.01:1337");
        assert!(fragment.contains("product=\"tex\""));
        assert!(fragment.contains("version=\"2019.03.01:1337\""));
    }

    #[test]
    fn test_openoffice_family() {
        let fragment = classify_tool("OpenOffice.org 3.2");
        assert!(fragment.contains("manufacturer=\"oracle\""));
        assert!(fragment.contains("product=\"openoffice\""));
        assert!(fragment.contains("version=\"3.2\""));

        let fragment = classify_tool("StarOffice 8 / OpenOffice.org Win32/2.0");
        assert!(fragment.contains("product=\"staroffice\""));
        assert!(fragment.contains("opsys=\"windows\""));

        let fragment = classify_tool("Writer");
        assert!(fragment.contains("product=\"openoffice;libreoffice\""));
    }

    #[test]
    fn test_apple_and_printer_vendors() {
        let fragment = classify_tool("Mac OS X 10.6.8 Quartz PDFContext");
        assert!(fragment.contains("manufacturer=\"apple\""));
        assert!(fragment.contains("product=\"quartz\""));
        assert!(fragment.contains("version=\"10.6.8\""));

        let fragment = classify_tool("HP LaserJet Scanner");
        assert!(fragment.contains("manufacturer=\"hewlettpackard\""));
        assert!(fragment.contains("product=\"laserjetscanner?\""));

        let fragment = classify_tool("PScript5.dll Version 5.2.2");
        assert!(fragment.contains("manufacturer=\"microsoft\""));
        assert!(fragment.contains("product=\"pscript\""));
        assert!(fragment.contains("opsys=\"windows\""));
    }

    #[test]
    fn test_unknown_tool_keeps_raw_text_only() {
        let fragment = classify_tool("Mystery Writer 1000");
        assert!(fragment.contains(">Mystery Writer 1000</name>"));
        assert!(!fragment.contains("manufacturer="));
    }

    #[test]
    fn test_adobe_fallback_manufacturer() {
        let fragment = classify_tool("acrobat-like tool");
        assert!(fragment.contains("product=\"acrobat\""));
        assert!(fragment.contains("manufacturer=\"adobe\""));
    }
}
