//! ZIP-of-documents analyzer.
//!
//! Extracts document entries of a ZIP archive into a scratch directory and
//! runs each one through the regular analyzers, wrapping the inner records
//! in one `<zip>` element. Nested archives are not descended into.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;
use zip::ZipArchive;

use super::AnalyzerMux;
use crate::utils::xml::xmlify;

pub(crate) const SOURCE_TAG: &str = "zipanalyzer";

/// Entry extensions worth analyzing.
const DOCUMENT_EXTENSIONS: [&str; 10] = [
    "pdf", "docx", "xlsx", "pptx", "odt", "ods", "odp", "rtf", "jpg", "jpeg",
];

fn is_document(name: &str) -> bool {
    let lower = name.to_lowercase();
    DOCUMENT_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Extract the document entries into `target`, returning their paths.
fn extract_documents(path: &Path, target: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !is_document(entry.name()) {
            continue;
        }
        // Flatten entry paths; only the file name matters for analysis.
        let Some(file_name) = Path::new(entry.name())
            .file_name()
            .map(|n| n.to_os_string())
        else {
            continue;
        };
        let output = target.join(file_name);
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        std::fs::write(&output, &bytes)?;
        extracted.push(output);
    }

    Ok(extracted)
}

/// Analyze one ZIP archive of documents.
pub(crate) async fn analyze_zip(mux: &AnalyzerMux, path: &Path) -> Option<String> {
    let start_time = Instant::now();
    let name = path.display().to_string();
    let file_size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            debug!("no scratch directory for {}: {}", name, e);
            return None;
        }
    };

    let entries = {
        let path = path.to_path_buf();
        let target = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_documents(&path, &target))
            .await
            .ok()?
    };

    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot open archive {}: {}", name, e);
            return Some(format!(
                "<fileanalysis filename=\"{}\" message=\"invalid-fileformat\" status=\"error\" time=\"{}\"><meta><file size=\"{}\" /></meta></fileanalysis>\n",
                xmlify(&name),
                start_time.elapsed().as_millis(),
                file_size
            ));
        }
    };

    let mut inner_records = String::new();
    let mut analyzed = 0usize;
    for entry in &entries {
        if let Some((_, record)) = Box::pin(mux.analyze_path(entry)).await {
            inner_records.push_str(&record);
            analyzed += 1;
        }
    }

    let mut record = format!(
        "<fileanalysis filename=\"{}\" status=\"ok\" time=\"{}\">\n",
        xmlify(&name),
        start_time.elapsed().as_millis()
    );
    record.push_str(&format!(
        "<zip numentries=\"{}\" numanalyzed=\"{}\">\n",
        entries.len(),
        analyzed
    ));
    record.push_str(&inner_records);
    record.push_str("</zip>\n");
    record.push_str(&format!(
        "<meta>\n<fileformat>\n<mimetype>application/zip</mimetype>\n</fileformat>\n<file size=\"{}\" />\n</meta>\n",
        file_size
    ));
    record.push_str("</fileanalysis>\n");
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_document() {
        assert!(is_document("a/b/report.PDF"));
        assert!(is_document("slides.pptx"));
        assert!(!is_document("archive.zip"));
        assert!(!is_document("readme.txt"));
    }

    #[test]
    fn test_extract_documents() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        let file = std::fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("docs/note.rtf", options).unwrap();
        writer.write_all(b"{\\rtf1 hello}").unwrap();
        writer.start_file("readme.txt", options).unwrap();
        writer.write_all(b"skip me").unwrap();
        writer.finish().unwrap();

        let target = tempfile::tempdir().unwrap();
        let extracted = extract_documents(&archive_path, target.path()).unwrap();
        assert_eq!(extracted.len(), 1);
        assert!(extracted[0].ends_with("note.rtf"));
        assert!(extracted[0].exists());
    }
}
