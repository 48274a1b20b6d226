//! OpenDocument (odt/ods/odp) analyzer.
//!
//! Reads `meta.xml` for generator, dates, and statistics, and samples
//! `content.xml` for the language guess.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use zip::ZipArchive;

use super::openxml::collect_text;
use super::{
    guess_language, guess_tool, HeaderBuilder, CREATION_DATE, MODIFICATION_DATE,
};
use crate::config::TextExtraction;
use crate::utils::xml::xmlify;

const TEXT_SAMPLE_LIMIT: usize = 16384;

#[derive(Debug, Default)]
struct OdfMeta {
    title: Option<String>,
    creator: Option<String>,
    subject: Option<String>,
    keywords: Option<String>,
    created: Option<NaiveDate>,
    modified: Option<NaiveDate>,
    generator: Option<String>,
    pages: Option<usize>,
    text_sample: Option<String>,
}

pub struct OdfAnalyzer {
    text_extraction: TextExtraction,
}

impl OdfAnalyzer {
    pub fn new(text_extraction: TextExtraction) -> Self {
        Self { text_extraction }
    }

    fn mimetype(extension: &str) -> &'static str {
        match extension {
            "ods" => "application/vnd.oasis.opendocument.spreadsheet",
            "odp" => "application/vnd.oasis.opendocument.presentation",
            _ => "application/vnd.oasis.opendocument.text",
        }
    }

    fn read_container(path: &Path) -> Option<OdfMeta> {
        let file = std::fs::File::open(path).ok()?;
        let mut archive = match ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(e) => {
                debug!("not an ODF container {}: {}", path.display(), e);
                return None;
            }
        };

        let mut meta = OdfMeta::default();
        if let Some(xml) = read_entry(&mut archive, "meta.xml") {
            parse_meta(&xml, &mut meta);
        }
        if let Some(content) = read_entry(&mut archive, "content.xml") {
            meta.text_sample = Some(collect_text(&content, TEXT_SAMPLE_LIMIT));
        }
        Some(meta)
    }
}

#[async_trait::async_trait]
impl super::FileAnalyzer for OdfAnalyzer {
    fn source_tag(&self) -> &'static str {
        "odfanalyzer"
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

        let tools = meta
            .generator
            .as_deref()
            .and_then(|generator| guess_tool(generator, ""))
            .map(|guess| format!("<tools>\n<tool type=\"editor\">\n{}</tool>\n</tools>\n", guess))
            .unwrap_or_default();

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

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(0..10)?, "%Y-%m-%d").ok()
}

fn parse_meta(xml: &str, meta: &mut OdfMeta) {
    let mut reader = Reader::from_str(xml);
    let mut current: Vec<u8> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref tag)) | Ok(Event::Empty(ref tag)) => {
                current = tag.local_name().as_ref().to_vec();
                if current == b"document-statistic" {
                    for attribute in tag.attributes().flatten() {
                        if attribute.key.local_name().as_ref() == b"page-count" {
                            meta.pages = attribute
                                .unescape_value()
                                .ok()
                                .and_then(|v| v.parse().ok());
                        }
                    }
                }
            }
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Text(text)) => {
                let Ok(value) = text.unescape() else { continue };
                let value = value.into_owned();
                match current.as_slice() {
                    b"title" => meta.title = Some(value),
                    b"initial-creator" => meta.creator = Some(value),
                    b"creator" => {
                        if meta.creator.is_none() {
                            meta.creator = Some(value)
                        }
                    }
                    b"subject" => meta.subject = Some(value),
                    b"keyword" => meta.keywords = Some(value),
                    b"creation-date" => meta.created = parse_iso_date(&value),
                    b"date" => meta.modified = parse_iso_date(&value),
                    b"generator" => meta.generator = Some(value),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta() {
        let xml = r#"<office:document-meta xmlns:office="o" xmlns:meta="m" xmlns:dc="d">
          <office:meta>
            <meta:generator>LibreOffice/6.4.2$Linux_X86_64</meta:generator>
            <dc:title>Minutes</dc:title>
            <meta:initial-creator>A. Writer</meta:initial-creator>
            <meta:creation-date>2022-05-17T12:00:00</meta:creation-date>
            <dc:date>2022-06-01T09:00:00</dc:date>
            <meta:document-statistic meta:page-count="3" meta:word-count="512"/>
          </office:meta>
        </office:document-meta>"#;
        let mut meta = OdfMeta::default();
        parse_meta(xml, &mut meta);
        assert_eq!(meta.title.as_deref(), Some("Minutes"));
        assert_eq!(meta.creator.as_deref(), Some("A. Writer"));
        assert_eq!(meta.generator.as_deref(), Some("LibreOffice/6.4.2$Linux_X86_64"));
        assert_eq!(meta.created, NaiveDate::from_ymd_opt(2022, 5, 17));
        assert_eq!(meta.modified, NaiveDate::from_ymd_opt(2022, 6, 1));
        assert_eq!(meta.pages, Some(3));
    }
}
