//! Run configuration.
//!
//! A run is described by one TOML file: the discovery source, the filename
//! filters and hit quota, the downloader, the output log path, and the
//! external PDF validator tools.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// How much text to pull out of analyzed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextExtraction {
    /// No text extraction at all.
    None,
    /// Record the text length only.
    #[default]
    Length,
    /// Extract text and run the language guesser.
    Aspell,
    /// Additionally keep the extraction log in the report body.
    Full,
}

/// Paths of the external PDF validators. Unset tools are skipped; their
/// report slots state so.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PdfToolConfig {
    pub jhove: Option<PathBuf>,
    pub verapdf: Option<PathBuf>,
    pub pdfbox_validator: Option<PathBuf>,
    pub callas_pdfapilot: Option<PathBuf>,
}

/// Where candidate URLs come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// BFS crawl from a start URL, constrained to the base URL.
    Webcrawler {
        base_url: String,
        #[serde(default)]
        start_url: Option<String>,
        #[serde(default)]
        required_content: Option<String>,
    },
    /// BFS scan of a local directory tree.
    Filesystem { directory: PathBuf },
    /// Paged queries against a web search engine.
    Search { engine: String, term: String },
    /// Re-emit hits recorded in a previous run's log.
    Logreplay { log_file: PathBuf },
}

/// How candidates are acquired.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloaderConfig {
    /// HTTP downloads under the filename pattern.
    #[default]
    Url,
    /// Pass local paths through without copying.
    Fake,
    /// Re-emit downloads recorded in a previous run's log.
    Logreplay { log_file: PathBuf },
}

fn default_num_hits() -> usize {
    10
}

fn default_file_pattern() -> String {
    "downloads/%{h}_%{s}".to_string()
}

fn default_log_output() -> PathBuf {
    PathBuf::from("docscan.xml")
}

fn default_max_visited_pages() -> usize {
    32768
}

/// Complete settings of one run.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub source: SourceConfig,
    /// Filename filters such as `*.pdf`.
    pub filters: Vec<String>,
    #[serde(default = "default_num_hits")]
    pub num_hits: usize,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default)]
    pub max_downloads: Option<usize>,
    #[serde(default = "default_log_output")]
    pub log_output: PathBuf,
    #[serde(default = "default_max_visited_pages")]
    pub max_visited_pages: usize,
    #[serde(default)]
    pub text_extraction: TextExtraction,
    #[serde(default)]
    pub tools: PdfToolConfig,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        let settings: Settings = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("cannot parse config {}: {}", path.display(), e))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let settings: Settings = toml::from_str(
            r#"
            filters = ["*.pdf"]

            [source]
            kind = "filesystem"
            directory = "/tmp/docs"
            "#,
        )
        .unwrap();
        assert_eq!(settings.num_hits, 10);
        assert_eq!(settings.filters, vec!["*.pdf".to_string()]);
        assert!(matches!(settings.source, SourceConfig::Filesystem { .. }));
        assert!(matches!(settings.downloader, DownloaderConfig::Url));
        assert_eq!(settings.text_extraction, TextExtraction::Length);
        assert!(settings.tools.verapdf.is_none());
    }

    #[test]
    fn test_full_config() {
        let settings: Settings = toml::from_str(
            r#"
            filters = ["*.pdf", "*.docx"]
            num_hits = 50
            file_pattern = "out/%{h:8}_%{s}"
            log_output = "run.xml"
            text_extraction = "aspell"

            [source]
            kind = "webcrawler"
            base_url = "http://example.com/"
            required_content = "university"

            [downloader]
            kind = "logreplay"
            log_file = "previous.xml"

            [tools]
            verapdf = "/opt/verapdf/verapdf"
            jhove = "/opt/jhove/jhove.sh"
            "#,
        )
        .unwrap();
        assert_eq!(settings.num_hits, 50);
        assert_eq!(settings.text_extraction, TextExtraction::Aspell);
        assert!(matches!(
            settings.downloader,
            DownloaderConfig::Logreplay { .. }
        ));
        assert!(settings.tools.verapdf.is_some());
        assert!(settings.tools.pdfbox_validator.is_none());
    }

    #[test]
    fn test_text_extraction_ordering() {
        assert!(TextExtraction::None < TextExtraction::Length);
        assert!(TextExtraction::Length < TextExtraction::Aspell);
        assert!(TextExtraction::Aspell < TextExtraction::Full);
    }
}
