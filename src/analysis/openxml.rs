//! OpenXML (docx/xlsx/pptx) analyzer.
//!
//! Reads the document properties streams of the ZIP container and a text
//! sample of the main document part.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use zip::ZipArchive;

use super::{guess_language, guess_tool, HeaderBuilder, CREATION_DATE, MODIFICATION_DATE};
use crate::config::TextExtraction;
use crate::utils::xml::xmlify;

/// Upper bound on the text sample fed to the language guesser.
const TEXT_SAMPLE_LIMIT: usize = 16384;

#[derive(Debug, Default)]
struct ContainerMeta {
    title: Option<String>,
    creator: Option<String>,
    subject: Option<String>,
    keywords: Option<String>,
    created: Option<NaiveDate>,
    modified: Option<NaiveDate>,
    application: Option<String>,
    app_version: Option<String>,
    pages: Option<usize>,
    text_sample: Option<String>,
}

pub struct OpenXmlAnalyzer {
    text_extraction: TextExtraction,
}

impl OpenXmlAnalyzer {
    pub fn new(text_extraction: TextExtraction) -> Self {
        Self { text_extraction }
    }

    fn mimetype(extension: &str) -> &'static str {
        match extension {
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            _ => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }

    fn read_container(path: &Path) -> Option<ContainerMeta> {
        let file = std::fs::File::open(path).ok()?;
        let mut archive = match ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(e) => {
                debug!("not an OpenXML container {}: {}", path.display(), e);
                return None;
            }
        };

        let mut meta = ContainerMeta::default();
        if let Some(core) = read_entry(&mut archive, "docProps/core.xml") {
            parse_core_properties(&core, &mut meta);
        }
        if let Some(app) = read_entry(&mut archive, "docProps/app.xml") {
            parse_app_properties(&app, &mut meta);
        }
        for part in ["word/document.xml", "xl/sharedStrings.xml", "ppt/slides/slide1.xml"] {
            if let Some(document) = read_entry(&mut archive, part) {
                meta.text_sample = Some(collect_text(&document, TEXT_SAMPLE_LIMIT));
                break;
            }
        }
        Some(meta)
    }
}

#[async_trait::async_trait]
impl super::FileAnalyzer for OpenXmlAnalyzer {
    fn source_tag(&self) -> &'static str {
        "openxmlanalyzer"
    }

    async fn analyze(&self, path: &Path) -> Option<String> {
        let start_time = Instant::now();
        let name = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let meta = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || Self::read_container(&path))
                .await
                .ok()
                .flatten()
        };

        let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

        let Some(meta) = meta else {
            return Some(format!(
                "<fileanalysis filename=\"{}\" message=\"invalid-fileformat\" status=\"error\" time=\"{}\"><meta><file size=\"{}\" /></meta></fileanalysis>\n",
                xmlify(&name),
                start_time.elapsed().as_millis(),
                file_size
            ));
        };

        let language = match (&meta.text_sample, self.text_extraction) {
            (Some(text), extraction) if extraction >= TextExtraction::Aspell => {
                guess_language(text).await
            }
            _ => None,
        };

        let mut header = HeaderBuilder::new();
        header
            .date(meta.created, CREATION_DATE)
            .date(meta.modified, MODIFICATION_DATE)
            .text_element("author", meta.creator.as_deref())
            .text_element("title", meta.title.as_deref())
            .text_element("subject", meta.subject.as_deref())
            .text_element("keyword", meta.keywords.as_deref())
            .language(language.as_deref())
            .num_pages(meta.pages);

        let application = meta.application.map(|app| match &meta.app_version {
            Some(version) => format!("{} {}", app, version),
            None => app,
        });
        let tools = match &application {
            Some(app) => {
                guess_tool(app, "").map(|g| format!("<tools>\n<tool type=\"editor\">\n{}</tool>\n</tools>\n", g)).unwrap_or_default()
            }
            None => String::new(),
        };

        let body = match (&meta.text_sample, self.text_extraction) {
            (Some(text), extraction) if extraction != TextExtraction::None => {
                format!("<body length=\"{}\" />\n", text.len())
            }
            _ => String::new(),
        };

        let mut record = format!(
            "<fileanalysis filename=\"{}\" status=\"ok\" time=\"{}\">\n",
            xmlify(&name),
            start_time.elapsed().as_millis()
        );
        record.push_str(&header.build());
        record.push_str(&body);
        record.push_str("<meta>\n");
        record.push_str(&format!(
            "<fileformat>\n<mimetype>{}</mimetype>\n</fileformat>\n",
            Self::mimetype(&extension)
        ));
        record.push_str(&tools);
        record.push_str(&format!("<file size=\"{}\" />\n", file_size));
        record.push_str("</meta>\n");
        record.push_str("</fileanalysis>\n");
        Some(record)
    }
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

/// First ten characters of W3CDTF timestamps form the date.
fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(0..10)?, "%Y-%m-%d").ok()
}

fn parse_core_properties(xml: &str, meta: &mut ContainerMeta) {
    let mut reader = Reader::from_str(xml);
    let mut current: Vec<u8> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref tag)) => current = tag.local_name().as_ref().to_vec(),
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Text(text)) => {
                let Ok(value) = text.unescape() else { continue };
                let value = value.into_owned();
                match current.as_slice() {
                    b"title" => meta.title = Some(value),
                    b"creator" => meta.creator = Some(value),
                    b"subject" => meta.subject = Some(value),
                    b"keywords" => meta.keywords = Some(value),
                    b"created" => meta.created = parse_iso_date(&value),
                    b"modified" => meta.modified = parse_iso_date(&value),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
}

fn parse_app_properties(xml: &str, meta: &mut ContainerMeta) {
    let mut reader = Reader::from_str(xml);
    let mut current: Vec<u8> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref tag)) => current = tag.local_name().as_ref().to_vec(),
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Text(text)) => {
                let Ok(value) = text.unescape() else { continue };
                let value = value.into_owned();
                match current.as_slice() {
                    b"Application" => meta.application = Some(value),
                    b"AppVersion" => meta.app_version = Some(value),
                    b"Pages" => meta.pages = value.parse().ok(),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
}

/// Concatenated text content of an XML part, capped at `limit` bytes.
pub(crate) fn collect_text(xml: &str, limit: usize) -> String {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(chunk)) => {
                if let Ok(value) = chunk.unescape() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(value.trim());
                    if text.len() >= limit {
                        let mut cut = limit;
                        while !text.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        text.truncate(cut);
                        break;
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_core_properties() {
        let xml = r#"<cp:coreProperties xmlns:cp="x" xmlns:dc="y" xmlns:dcterms="z">
            <dc:title>Annual Report</dc:title>
            <dc:creator>J. Doe</dc:creator>
            <cp:keywords>finance</cp:keywords>
            <dcterms:created>2023-11-02T08:00:00Z</dcterms:created>
            <dcterms:modified>2024-01-05T10:30:00Z</dcterms:modified>
        </cp:coreProperties>"#;
        let mut meta = ContainerMeta::default();
        parse_core_properties(xml, &mut meta);
        assert_eq!(meta.title.as_deref(), Some("Annual Report"));
        assert_eq!(meta.creator.as_deref(), Some("J. Doe"));
        assert_eq!(meta.keywords.as_deref(), Some("finance"));
        assert_eq!(meta.created, NaiveDate::from_ymd_opt(2023, 11, 2));
        assert_eq!(meta.modified, NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn test_parse_app_properties() {
        let xml = r#"<Properties><Application>Microsoft Office Word</Application>
            <AppVersion>14.0000</AppVersion><Pages>12</Pages></Properties>"#;
        let mut meta = ContainerMeta::default();
        parse_app_properties(xml, &mut meta);
        assert_eq!(meta.application.as_deref(), Some("Microsoft Office Word"));
        assert_eq!(meta.app_version.as_deref(), Some("14.0000"));
        assert_eq!(meta.pages, Some(12));
    }

    #[test]
    fn test_collect_text() {
        let xml = "<w:document><w:p><w:t>Hello</w:t></w:p><w:p><w:t>world</w:t></w:p></w:document>";
        assert_eq!(collect_text(xml, 100), "Hello world");
        assert_eq!(collect_text(xml, 7), "Hello w");
    }
}
