//! Analysis: per-format forensics on downloaded files.
//!
//! Every analyzer produces one `<fileanalysis>` record as a string; the
//! pipeline wraps records into log items under the analyzer's source tag.

mod font_classifier;
mod jpeg;
mod language;
mod odf;
mod openxml;
mod pdf;
mod pdf_library;
mod rtf;
mod tool_classifier;
mod zip_container;

pub use font_classifier::classify_font;
pub use jpeg::JpegAnalyzer;
pub use language::{aspell_languages, guess_language};
pub use odf::OdfAnalyzer;
pub use openxml::OpenXmlAnalyzer;
pub use pdf::PdfAnalyzer;
pub use rtf::RtfAnalyzer;
pub use tool_classifier::classify_tool;

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::config::{PdfToolConfig, TextExtraction};
use crate::utils::xml::xmlify;

/// Microsoft applications prefix the window title into document titles,
/// e.g. `Microsoft Word - Report.doc`.
static MICROSOFT_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Microsoft\s+.+\S)\s+-\s+(\S.*)$").unwrap());

/// Base tag of creation dates in `<date>` elements.
pub(crate) const CREATION_DATE: &str = "creation";
/// Base tag of modification dates in `<date>` elements.
pub(crate) const MODIFICATION_DATE: &str = "modification";

/// One analyzer for one family of file formats.
#[async_trait]
pub trait FileAnalyzer: Send + Sync {
    /// Source tag used for this analyzer's log items.
    fn source_tag(&self) -> &'static str;

    /// Analyze one file, returning its `<fileanalysis>` record.
    async fn analyze(&self, path: &Path) -> Option<String>;
}

/// Chooses the analyzer for a file by extension and runs it.
pub struct AnalyzerMux {
    pdf: PdfAnalyzer,
    openxml: OpenXmlAnalyzer,
    odf: OdfAnalyzer,
    rtf: RtfAnalyzer,
    jpeg: JpegAnalyzer,
}

impl AnalyzerMux {
    pub fn new(tools: PdfToolConfig, text_extraction: TextExtraction) -> Self {
        Self {
            pdf: PdfAnalyzer::new(tools, text_extraction),
            openxml: OpenXmlAnalyzer::new(text_extraction),
            odf: OdfAnalyzer::new(text_extraction),
            rtf: RtfAnalyzer::new(),
            jpeg: JpegAnalyzer::new(),
        }
    }

    fn analyzer_for(&self, extension: &str) -> Option<&dyn FileAnalyzer> {
        match extension {
            "pdf" => Some(&self.pdf),
            "docx" | "xlsx" | "pptx" => Some(&self.openxml),
            "odt" | "ods" | "odp" => Some(&self.odf),
            "rtf" => Some(&self.rtf),
            "jpg" | "jpeg" => Some(&self.jpeg),
            _ => None,
        }
    }

    /// Analyze one file; ZIP containers recurse over their document entries.
    pub async fn analyze_path(&self, path: &Path) -> Option<(&'static str, String)> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if extension == "zip" {
            let record = zip_container::analyze_zip(self, path).await?;
            return Some((zip_container::SOURCE_TAG, record));
        }

        let analyzer = self.analyzer_for(&extension)?;
        let record = analyzer.analyze(path).await?;
        Some((analyzer.source_tag(), record))
    }
}

/// Pick the tool description to classify: a Microsoft window-title prefix in
/// the alternative string wins, then the primary string.
pub(crate) fn guess_tool(tool_string: &str, alt_tool_string: &str) -> Option<String> {
    let text = if let Some(caps) = MICROSOFT_TITLE.captures(alt_tool_string) {
        caps[1].to_string()
    } else if !tool_string.is_empty() {
        tool_string.to_string()
    } else {
        alt_tool_string.to_string()
    };
    if text.is_empty() {
        None
    } else {
        Some(classify_tool(&text))
    }
}

/// Strip a Microsoft window-title prefix from a document title.
pub(crate) fn cleanup_title(title: &str) -> String {
    match MICROSOFT_TITLE.captures(title) {
        Some(caps) => caps[2].to_string(),
        None => title.to_string(),
    }
}

/// Collapse internal whitespace the way document metadata is displayed.
pub(crate) fn simplified(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn format_date(date: NaiveDate, base: &str) -> String {
    let epoch = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0);
    format!(
        "<date epoch=\"{}\" base=\"{}\" year=\"{}\" month=\"{}\" day=\"{}\">{}</date>\n",
        epoch,
        base,
        date.year(),
        date.month(),
        date.day(),
        date.format("%Y-%m-%d")
    )
}

/// Classify a page size in millimeters, naming the common formats.
pub(crate) fn evaluate_paper_size(mmw: i64, mmh: i64) -> String {
    let within = |value: i64, low: i64, high: i64| value >= low && value <= high;
    let name = if (within(mmw, 208, 212) && within(mmh, 295, 299))
        || (within(mmh, 208, 212) && within(mmw, 295, 299))
    {
        Some("A4")
    } else if (within(mmw, 214, 218) && within(mmh, 277, 281))
        || (within(mmh, 214, 218) && within(mmw, 277, 281))
    {
        Some("Letter")
    } else if (within(mmw, 214, 218) && within(mmh, 254, 258))
        || (within(mmh, 214, 218) && within(mmw, 254, 258))
    {
        Some("Legal")
    } else {
        None
    };

    let orientation = if mmw > mmh { "landscape" } else { "portrait" };
    match name {
        Some(name) => format!(
            "<papersize height=\"{}\" width=\"{}\" orientation=\"{}\">{}</papersize>\n",
            mmh, mmw, orientation, name
        ),
        None => format!(
            "<papersize height=\"{}\" width=\"{}\" orientation=\"{}\" />\n",
            mmh, mmw, orientation
        ),
    }
}

/// Render a `<tools>` block from creator/producer strings.
pub(crate) fn tools_fragment(creator: Option<&str>, producer: Option<&str>, title: &str) -> String {
    let mut tools = String::new();
    if let Some(creator) = creator {
        if let Some(guess) = guess_tool(creator, title) {
            tools.push_str(&format!("<tool type=\"editor\">\n{}</tool>\n", guess));
        }
    }
    if let Some(producer) = producer {
        if let Some(guess) = guess_tool(producer, title) {
            tools.push_str(&format!("<tool type=\"producer\">\n{}</tool>\n", guess));
        }
    }
    if tools.is_empty() {
        tools
    } else {
        format!("<tools>\n{}</tools>\n", tools)
    }
}

/// `<header>` entries shared by the simpler analyzers.
pub(crate) struct HeaderBuilder {
    entries: String,
}

impl HeaderBuilder {
    pub(crate) fn new() -> Self {
        Self {
            entries: String::new(),
        }
    }

    pub(crate) fn date(&mut self, date: Option<NaiveDate>, base: &str) -> &mut Self {
        if let Some(date) = date {
            self.entries.push_str(&format_date(date, base));
        }
        self
    }

    pub(crate) fn text_element(&mut self, tag: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            let value = simplified(value);
            if !value.is_empty() {
                self.entries
                    .push_str(&format!("<{}>{}</{}>\n", tag, xmlify(&value), tag));
            }
        }
        self
    }

    pub(crate) fn language(&mut self, language: Option<&str>) -> &mut Self {
        if let Some(language) = language {
            self.entries.push_str(&format!(
                "<language origin=\"aspell\">{}</language>\n",
                xmlify(language)
            ));
        }
        self
    }

    pub(crate) fn num_pages(&mut self, pages: Option<usize>) -> &mut Self {
        if let Some(pages) = pages {
            self.entries
                .push_str(&format!("<num-pages>{}</num-pages>\n", pages));
        }
        self
    }

    pub(crate) fn raw(&mut self, fragment: &str) -> &mut Self {
        self.entries.push_str(fragment);
        self
    }

    pub(crate) fn build(&self) -> String {
        if self.entries.is_empty() {
            String::new()
        } else {
            format!("<header>\n{}</header>\n", self.entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_size_names() {
        assert!(evaluate_paper_size(210, 297).contains(">A4</papersize>"));
        assert!(evaluate_paper_size(297, 210).contains("orientation=\"landscape\""));
        assert!(evaluate_paper_size(216, 279).contains(">Letter</papersize>"));
        assert!(evaluate_paper_size(216, 256).contains(">Legal</papersize>"));
        let odd = evaluate_paper_size(100, 100);
        assert!(odd.contains("<papersize height=\"100\" width=\"100\""));
        assert!(!odd.contains(">A4<"));
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let fragment = format_date(date, CREATION_DATE);
        assert!(fragment.contains("base=\"creation\""));
        assert!(fragment.contains("year=\"2024\""));
        assert!(fragment.contains("month=\"1\""));
        assert!(fragment.contains("day=\"15\""));
        assert!(fragment.contains(">2024-01-15</date>"));
        assert!(fragment.contains("epoch=\"1705276800\""));
    }

    #[test]
    fn test_microsoft_title_cleanup() {
        assert_eq!(
            cleanup_title("Microsoft Word - Report.doc"),
            "Report.doc".to_string()
        );
        assert_eq!(cleanup_title("Plain title"), "Plain title".to_string());
    }

    #[test]
    fn test_guess_tool_prefers_title_prefix() {
        let fragment = guess_tool("Acrobat Distiller 5.0", "Microsoft Word 2010 - Thesis.doc");
        let fragment = fragment.unwrap();
        assert!(fragment.contains("manufacturer=\"microsoft\""));
        assert!(fragment.contains("product=\"word\""));
    }

    #[test]
    fn test_simplified() {
        assert_eq!(simplified("  a \t b\n c  "), "a b c");
    }
}
