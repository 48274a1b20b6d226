//! JPEG analyzer.
//!
//! Lifts EXIF metadata: capture date, camera make and model, the software
//! tag, and pixel dimensions.

use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use exif::{In, Tag};
use tracing::debug;

use super::{guess_tool, HeaderBuilder, CREATION_DATE};
use crate::utils::xml::{format_map, xmlify};

#[derive(Debug, Default)]
struct JpegMeta {
    date: Option<NaiveDate>,
    make: Option<String>,
    model: Option<String>,
    software: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
}

pub struct JpegAnalyzer;

impl JpegAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn read_exif(path: &Path) -> JpegMeta {
        let mut meta = JpegMeta::default();
        let Ok(file) = std::fs::File::open(path) else {
            return meta;
        };
        let mut reader = BufReader::new(file);
        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(e) => {
                debug!("no EXIF data in {}: {}", path.display(), e);
                return meta;
            }
        };

        let string_field = |tag: Tag| {
            exif.get_field(tag, In::PRIMARY).map(|field| {
                field
                    .display_value()
                    .to_string()
                    .trim_matches('"')
                    .trim()
                    .to_string()
            })
        };

        // EXIF datetimes look like "2024-01-15 09:30:00" when displayed.
        meta.date = string_field(Tag::DateTimeOriginal)
            .or_else(|| string_field(Tag::DateTime))
            .and_then(|raw| {
                let date = raw.get(0..10)?.replace(':', "-");
                NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()
            });
        meta.make = string_field(Tag::Make);
        meta.model = string_field(Tag::Model);
        meta.software = string_field(Tag::Software);
        meta.width = exif
            .get_field(Tag::PixelXDimension, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .map(u64::from);
        meta.height = exif
            .get_field(Tag::PixelYDimension, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .map(u64::from);
        meta
    }
}

impl Default for JpegAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl super::FileAnalyzer for JpegAnalyzer {
    fn source_tag(&self) -> &'static str {
        "jpeganalyzer"
    }

    async fn analyze(&self, path: &Path) -> Option<String> {
        let start_time = Instant::now();
        let name = path.display().to_string();

        let bytes = tokio::fs::read(path).await.ok()?;
        let file_size = bytes.len() as u64;
        if !bytes.starts_with(&[0xFF, 0xD8]) {
            return Some(format!(
                "<fileanalysis filename=\"{}\" message=\"invalid-fileformat\" status=\"error\" time=\"{}\"><meta><file size=\"{}\" /></meta></fileanalysis>\n",
                xmlify(&name),
                start_time.elapsed().as_millis(),
                file_size
            ));
        }

        let meta = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || Self::read_exif(&path))
                .await
                .unwrap_or_default()
        };

        let mut header = HeaderBuilder::new();
        header.date(meta.date, CREATION_DATE);

        let mut fileformat = String::from("<fileformat>\n<mimetype>image/jpeg</mimetype>\n");
        if let (Some(width), Some(height)) = (meta.width, meta.height) {
            fileformat.push_str(&format!(
                "<dimensions width=\"{}\" height=\"{}\" />\n",
                width, height
            ));
        }
        fileformat.push_str("</fileformat>\n");

        let mut tools = String::new();
        if let Some(guess) = meta.software.as_deref().and_then(|s| guess_tool(s, "")) {
            tools.push_str(&format!("<tool type=\"producer\">\n{}</tool>\n", guess));
        }
        if meta.make.is_some() || meta.model.is_some() {
            let camera = [meta.make.as_deref(), meta.model.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let mut entries: Vec<(&str, String)> = vec![("", camera)];
            if let Some(make) = &meta.make {
                entries.push(("manufacturer", make.to_lowercase()));
            }
            if let Some(model) = &meta.model {
                entries.push(("product", model.to_lowercase()));
            }
            tools.push_str(&format!(
                "<tool type=\"camera\">\n{}</tool>\n",
                format_map("name", &entries)
            ));
        }
        let tools = if tools.is_empty() {
            String::new()
        } else {
            format!("<tools>\n{}</tools>\n", tools)
        };

        let mut record = format!(
            "<fileanalysis filename=\"{}\" status=\"ok\" time=\"{}\">\n",
            xmlify(&name),
            start_time.elapsed().as_millis()
        );
        record.push_str(&header.build());
        record.push_str("<meta>\n");
        record.push_str(&fileformat);
        record.push_str(&tools);
        record.push_str(&format!("<file size=\"{}\" />\n", file_size));
        record.push_str("</meta>\n");
        record.push_str("</fileanalysis>\n");
        Some(record)
    }
}
