//! RTF analyzer.
//!
//! The RTF reader proper is an external concern; this facade only lifts the
//! information group fields the report needs: title, author, creation and
//! revision times, and the generator application.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use chrono::NaiveDate;
use regex::Regex;

use super::{guess_tool, HeaderBuilder, CREATION_DATE, MODIFICATION_DATE};
use crate::utils::xml::xmlify;

static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\\title ([^{}]*)\}").unwrap());
static AUTHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\\author ([^{}]*)\}").unwrap());
static GENERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\\\*\\generator ([^;{}]*)").unwrap());
static CREATIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\creatim\s*\\yr(\d+)\s*\\mo(\d+)\s*\\dy(\d+)").unwrap()
});
static REVTIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\revtim\s*\\yr(\d+)\s*\\mo(\d+)\s*\\dy(\d+)").unwrap()
});

pub struct RtfAnalyzer;

impl RtfAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RtfAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_date(regex: &Regex, text: &str) -> Option<NaiveDate> {
    let caps = regex.captures(text)?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

#[async_trait::async_trait]
impl super::FileAnalyzer for RtfAnalyzer {
    fn source_tag(&self) -> &'static str {
        "rtfanalyzer"
    }

    async fn analyze(&self, path: &Path) -> Option<String> {
        let start_time = Instant::now();
        let name = path.display().to_string();

        let bytes = tokio::fs::read(path).await.ok()?;
        let file_size = bytes.len() as u64;
        // RTF is 7-bit; byte-per-char keeps the control words intact.
        let text: String = bytes.iter().map(|&b| b as char).collect();

        if !text.starts_with("{\\rtf") {
            return Some(format!(
                "<fileanalysis filename=\"{}\" message=\"invalid-fileformat\" status=\"error\" time=\"{}\"><meta><file size=\"{}\" /></meta></fileanalysis>\n",
                xmlify(&name),
                start_time.elapsed().as_millis(),
                file_size
            ));
        }

        let title = TITLE.captures(&text).map(|c| c[1].to_string());
        let author = AUTHOR.captures(&text).map(|c| c[1].to_string());
        let generator = GENERATOR.captures(&text).map(|c| c[1].trim().to_string());

        let mut header = HeaderBuilder::new();
        header
            .date(capture_date(&CREATIM, &text), CREATION_DATE)
            .date(capture_date(&REVTIM, &text), MODIFICATION_DATE)
            .text_element("author", author.as_deref())
            .text_element("title", title.as_deref());

        let tools = generator
            .as_deref()
            .and_then(|g| guess_tool(g, ""))
            .map(|guess| format!("<tools>\n<tool type=\"editor\">\n{}</tool>\n</tools>\n", guess))
            .unwrap_or_default();

        let mut record = format!(
            "<fileanalysis filename=\"{}\" status=\"ok\" time=\"{}\">\n",
            xmlify(&name),
            start_time.elapsed().as_millis()
        );
        record.push_str(&header.build());
        record.push_str("<meta>\n");
        record.push_str("<fileformat>\n<mimetype>application/rtf</mimetype>\n</fileformat>\n");
        record.push_str(&tools);
        record.push_str(&format!("<file size=\"{}\" />\n", file_size));
        record.push_str("</meta>\n");
        record.push_str("</fileanalysis>\n");
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FileAnalyzer;

    #[tokio::test]
    async fn test_rtf_info_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.rtf");
        std::fs::write(
            &path,
            br#"{\rtf1\ansi{\*\generator Riched20 10.0.19041}{\info{\title Meeting notes}{\author B. Writer}{\creatim\yr2021\mo3\dy14}{\revtim\yr2021\mo4\dy2}}Hello.}"#,
        )
        .unwrap();

        let analyzer = RtfAnalyzer::new();
        let record = analyzer.analyze(&path).await.unwrap();
        assert!(record.contains("status=\"ok\""));
        assert!(record.contains("<title>Meeting notes</title>"));
        assert!(record.contains("<author>B. Writer</author>"));
        assert!(record.contains("base=\"creation\" year=\"2021\" month=\"3\" day=\"14\""));
        assert!(record.contains("base=\"modification\" year=\"2021\" month=\"4\" day=\"2\""));
        assert!(record.contains("<mimetype>application/rtf</mimetype>"));
    }

    #[tokio::test]
    async fn test_rtf_rejects_other_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.rtf");
        std::fs::write(&path, b"plain text").unwrap();
        let record = RtfAnalyzer::new().analyze(&path).await.unwrap();
        assert!(record.contains("status=\"error\""));
        assert!(record.contains("message=\"invalid-fileformat\""));
    }
}
