//! End-to-end pipeline scenarios: discovery through analysis into one log.

use std::path::{Path, PathBuf};

use docscan::analysis::PdfAnalyzer;
use docscan::config::{
    DownloaderConfig, PdfToolConfig, Settings, SourceConfig, TextExtraction,
};
use docscan::pipeline;

fn settings(source: SourceConfig, log_output: PathBuf) -> Settings {
    Settings {
        source,
        filters: vec!["*.pdf".to_string()],
        num_hits: 5,
        downloader: DownloaderConfig::Fake,
        file_pattern: "downloads/%{h}_%{s}".to_string(),
        max_downloads: None,
        log_output,
        max_visited_pages: 32768,
        text_extraction: TextExtraction::None,
        tools: PdfToolConfig::default(),
    }
}

/// A tiny but well-formed single-page PDF written through the PDF library.
fn write_minimal_pdf(path: &Path) {
    use lopdf::{dictionary, Document, Object};

    let mut document = Document::with_version("1.4");
    let pages_id = document.new_object_id();
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = document.add_object(dictionary! {
        "Creator" => Object::string_literal("Adobe Acrobat 11.0.7"),
    });
    document.trailer.set("Root", catalog_id);
    document.trailer.set("Info", info_id);
    document.save(path).unwrap();
}

#[tokio::test]
async fn test_filesystem_hits_flow_through_pipeline() {
    let docs = tempfile::tempdir().unwrap();
    std::fs::write(docs.path().join("a.pdf"), b"not really a pdf").unwrap();
    std::fs::write(docs.path().join("b.txt"), b"ignored").unwrap();
    std::fs::create_dir(docs.path().join("sub")).unwrap();
    std::fs::write(docs.path().join("sub/c.pdf"), b"also not a pdf").unwrap();

    let out = tempfile::tempdir().unwrap();
    let log_path = out.path().join("run.xml");
    let config = settings(
        SourceConfig::Filesystem {
            directory: docs.path().to_path_buf(),
        },
        log_path.clone(),
    );

    pipeline::run(config).await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<log>\n"));
    assert!(log.trim_end().ends_with("</log>"));

    // Both PDFs were found, in breadth-first order.
    assert_eq!(log.matches("event=\"hit\"").count(), 2);
    let first = log.find("a.pdf").unwrap();
    let second = log.find("c.pdf").unwrap();
    assert!(first < second);

    // The fake downloader passed both through.
    assert!(log.contains("<fakedownloader numlocalfiles=\"2\" numerrors=\"0\" />"));

    // Neither file is a parseable PDF and no validator is configured.
    assert_eq!(log.matches("message=\"invalid-fileformat\"").count(), 2);
    assert_eq!(log.matches("status=\"error\"").count(), 2);
}

#[tokio::test]
async fn test_pdf_record_carries_every_validator_slot() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("doc.pdf");
    write_minimal_pdf(&pdf_path);

    let analyzer = PdfAnalyzer::new(PdfToolConfig::default(), TextExtraction::None);
    let record = analyzer.analyze_file(&pdf_path).await.unwrap();

    assert!(record.contains("status=\"ok\""));
    assert!(record.contains("time="));
    assert!(record.contains("external_time="));

    // Exactly one slot per validator, in the documented not-configured shape.
    for slot in ["jhove", "verapdf", "pdfboxvalidator", "callaspdfapilot"] {
        assert_eq!(record.matches(&format!("<{}>", slot)).count(), 1);
        assert_eq!(record.matches(&format!("</{}>", slot)).count(), 1);
    }
    assert_eq!(record.matches("<info>not configured to run</info>").count(), 4);

    assert!(record.contains("<mimetype>application/pdf</mimetype>"));
    assert!(record.contains("<version major=\"1\" minor=\"4\">1.4</version>"));
    assert!(record.contains("<security locked=\"no\" encrypted=\"no\" />"));
    assert!(record.contains("<num-pages>1</num-pages>"));
    assert!(record.contains(">A4</papersize>"));
    assert!(record.contains("manufacturer=\"adobe\""));
    assert!(record.contains("product=\"acrobat\""));
    assert!(record.contains("version=\"11.0.7\""));
}

#[tokio::test]
async fn test_unrecognized_pdf_is_demoted_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.pdf");
    std::fs::write(&path, b"definitely not a pdf").unwrap();

    let analyzer = PdfAnalyzer::new(PdfToolConfig::default(), TextExtraction::None);
    let record = analyzer.analyze_file(&path).await.unwrap();
    assert!(record.contains("status=\"error\""));
    assert!(record.contains("message=\"invalid-fileformat\""));
    assert!(record.contains("<file size=\"20\" />"));
}

fn niceness_wrapper_available() -> bool {
    Path::new("/usr/bin/nice").exists()
        && std::process::Command::new("ionice")
            .arg("-h")
            .output()
            .is_ok()
}

#[tokio::test]
async fn test_verapdf_second_pass_is_staged_on_first_pass_outcome() {
    if !niceness_wrapper_available() {
        eprintln!("skipping: nice/ionice not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("doc.pdf");
    write_minimal_pdf(&pdf_path);

    // A stand-in veraPDF that records its argv and always reports a
    // compliant PDF/A-1B file.
    let args_log = dir.path().join("args.log");
    let stub = dir.path().join("verapdf-stub.sh");
    std::fs::write(
        &stub,
        format!(
            "#!/bin/sh\nprintf '%s ' \"$@\" >> {log}\nprintf '\\n' >> {log}\n\
             echo '<rawResults><validationResult flavour=\"PDFA_1_B\" isCompliant=\"true\"></validationResult><item size=\"99\"></item></rawResults>'\n",
            log = args_log.display()
        ),
    )
    .unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let tools = PdfToolConfig {
        verapdf: Some(stub),
        ..PdfToolConfig::default()
    };
    let analyzer = PdfAnalyzer::new(tools, TextExtraction::None);
    let record = analyzer.analyze_file(&pdf_path).await.unwrap();

    let argv = std::fs::read_to_string(&args_log).unwrap();
    let lines: Vec<&str> = argv.lines().collect();
    assert_eq!(lines.len(), 2, "expected exactly two veraPDF invocations");
    assert!(lines[0].contains("-f 1b"));
    assert!(lines[1].contains("-f 1a"));

    assert!(record.contains("pdfa1b=\"yes\""));
    assert!(record.contains("filesize=\"99\""));
    assert!(record.contains("<rawResults>"));
}

#[tokio::test]
async fn test_empty_crawl_produces_open_error_and_summary() {
    let out = tempfile::tempdir().unwrap();
    let log_path = out.path().join("run.xml");
    let mut config = settings(
        SourceConfig::Webcrawler {
            base_url: "http://example.invalid/".to_string(),
            start_url: None,
            required_content: None,
        },
        log_path.clone(),
    );
    config.num_hits = 10;

    pipeline::run(config).await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("numexpectedhits=\"10\""));
    assert!(log.contains("<filepattern>"));
    // The unresolvable host surfaces as an error fragment.
    assert!(log.contains("status=\"error\""));
    // The summary reports zero hits for the filter.
    assert!(log.contains("numfoundhits=\"0\""));
    assert!(!log.contains("event=\"hit\""));
}
