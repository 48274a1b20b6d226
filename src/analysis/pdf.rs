//! PDF forensics orchestrator.
//!
//! Drives up to four external validators in parallel, launches conditional
//! second passes for veraPDF and callas pdfaPilot, inspects the file through
//! the PDF library facade, and fuses everything into one `<fileanalysis>`
//! record. Every validator slot appears in the record unconditionally.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::pdf_library::{self, PdfInspection};
use super::{
    classify_font, evaluate_paper_size, guess_language, tools_fragment, HeaderBuilder,
    CREATION_DATE, MODIFICATION_DATE,
};
use crate::config::{PdfToolConfig, TextExtraction};
use crate::utils::xml::xmlify;

const ONE_MINUTE: Duration = Duration::from_secs(60);
const TWO_MINUTES: Duration = Duration::from_secs(120);
const FOUR_MINUTES: Duration = Duration::from_secs(240);
const SIX_MINUTES: Duration = Duration::from_secs(360);

/// External programs run CPU- and IO-nice.
const NICE_BINARY: &str = "/usr/bin/nice";
const NICE_ARGS: [&str; 5] = ["-n", "17", "ionice", "-c", "3"];

static JHOVE_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bStatus: ([^#]+)").unwrap());
static JHOVE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bVersion: ([^#]+)#").unwrap());
static JHOVE_PROFILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bProfile: ([^#]+)(#|$)").unwrap());
static CALLAS_PDFA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bInfo\s+PDFA\s+PDF/A-1([ab])").unwrap());
static CALLAS_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSummary\t(Errors|Warnings)\t(0|[1-9][0-9]*)\b").unwrap());

/// Output of one finished (or expired) external run.
struct ToolRun {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

type ToolHandle = JoinHandle<std::io::Result<std::process::Output>>;

pub struct PdfAnalyzer {
    tools: PdfToolConfig,
    text_extraction: TextExtraction,
}

impl PdfAnalyzer {
    pub fn new(tools: PdfToolConfig, text_extraction: TextExtraction) -> Self {
        Self {
            tools,
            text_extraction,
        }
    }

    fn verapdf_args(tool: &Path, profile: &str, filename: &Path) -> Vec<String> {
        vec![
            tool.display().to_string(),
            "-x".into(),
            "-f".into(),
            profile.into(),
            "--maxfailures".into(),
            "1".into(),
            "--format".into(),
            "xml".into(),
            filename.display().to_string(),
        ]
    }

    fn start_verapdf(&self, profile: &str, filename: &Path) -> Option<ToolHandle> {
        let tool = self.tools.verapdf.as_ref()?;
        start_nice(&Self::verapdf_args(tool, profile, filename), None)
    }

    fn start_callas(&self, mode: &str, filename: &Path) -> Option<ToolHandle> {
        let tool = self.tools.callas_pdfapilot.as_ref()?;
        start_nice(
            &[
                tool.display().to_string(),
                mode.into(),
                filename.display().to_string(),
            ],
            None,
        )
    }

    fn start_jhove(&self, filename: &Path) -> Option<ToolHandle> {
        let script = self.tools.jhove.as_ref()?;
        start_nice(
            &[
                "/bin/bash".into(),
                script.display().to_string(),
                "-m".into(),
                "PDF-hul".into(),
                "-t".into(),
                "/tmp".into(),
                "-b".into(),
                "131072".into(),
                filename.display().to_string(),
            ],
            None,
        )
    }

    fn start_pdfbox(&self, filename: &Path) -> Option<ToolHandle> {
        let class_file = self.tools.pdfbox_validator.as_ref()?;
        let class_dir = class_file.parent().unwrap_or(Path::new("."));
        let class_name = class_file.file_stem()?.to_string_lossy().into_owned();

        let mut jars: Vec<String> = std::fs::read_dir(class_dir)
            .ok()?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.ends_with(".jar").then_some(name)
            })
            .collect();
        jars.sort();

        start_nice(
            &[
                "java".into(),
                "-cp".into(),
                format!(".:{}", jars.join(":")),
                class_name,
                filename.display().to_string(),
            ],
            Some(class_dir),
        )
    }

    /// Run the full battery against one PDF and build the fused record.
    pub async fn analyze_file(&self, filename: &Path) -> Option<String> {
        let name = filename.display().to_string();
        if [".xz", ".gz", ".bz2", ".lzma"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            warn!(
                "compressed file {} must be unpacked before PDF analysis",
                name
            );
            return None;
        }

        let start_time = Instant::now();

        // Launch phase: every configured first-pass tool starts now.
        let verapdf_run1 = self.start_verapdf("1b", filename);
        let callas_run1 = self.start_callas("--quickpdfinfo", filename);
        let jhove_run = self.start_jhove(filename);
        let pdfbox_run = self.start_pdfbox(filename);

        let verapdf_configured = self.tools.verapdf.is_some();
        let callas_configured = self.tools.callas_pdfapilot.is_some();
        let jhove_configured = self.tools.jhove.is_some();
        let pdfbox_configured = self.tools.pdfbox_validator.is_some();

        // Collection phase, with conditional second passes.
        let mut verapdf = VeraPdfResult::default();
        let mut verapdf_run2 = None;
        if let Some(handle) = verapdf_run1 {
            let run = collect(handle, SIX_MINUTES, "veraPDF").await;
            verapdf.absorb_first_pass(&run);
            if verapdf.pdfa1b {
                // PDF/A-1B holds, so test for PDF/A-1A as well.
                verapdf_run2 = self.start_verapdf("1a", filename);
                if verapdf_run2.is_none() {
                    warn!("failed to start second veraPDF pass for {}", name);
                }
            } else {
                debug!("skipping second veraPDF pass, {} is not PDF/A-1b", name);
            }
        }

        let mut callas = CallasResult::default();
        let mut callas_run2 = None;
        if let Some(handle) = callas_run1 {
            let run = collect(handle, TWO_MINUTES, "callas pdfaPilot").await;
            callas.absorb_first_pass(&run);
            if callas.pdfa1_letter.is_some() {
                // The file claims PDF/A-1a or -1b, so count rule violations.
                callas_run2 = self.start_callas("-a", filename);
                if callas_run2.is_none() {
                    warn!("failed to start second callas pass for {}", name);
                }
            } else {
                debug!("skipping second callas pass, {} is not PDF/A-1", name);
            }
        }

        let mut jhove = JhoveResult::default();
        if let Some(handle) = jhove_run {
            jhove.absorb(&collect(handle, FOUR_MINUTES, "jHove").await);
        }

        let mut pdfbox = PdfBoxResult::default();
        if let Some(handle) = pdfbox_run {
            pdfbox.absorb(&collect(handle, TWO_MINUTES, "pdfbox validator").await);
        }

        if let Some(handle) = verapdf_run2 {
            let run = collect(handle, SIX_MINUTES, "veraPDF").await;
            verapdf.absorb_second_pass(&run);
        }
        if let Some(handle) = callas_run2 {
            let run = collect(handle, FOUR_MINUTES, "callas pdfaPilot").await;
            callas.absorb_second_pass(&run);
        }

        let external_time = start_time.elapsed().as_millis();

        // Library phase.
        let extract_text = self.text_extraction != TextExtraction::None;
        let library = {
            let path = filename.to_path_buf();
            tokio::task::spawn_blocking(move || pdf_library::inspect(&path, extract_text))
                .await
                .ok()
                .flatten()
        };

        let mut body_text = String::new();
        let mut header = HeaderBuilder::new();
        let mut meta_text = String::new();

        if let Some(inspection) = &library {
            self.render_library(inspection, &mut header, &mut meta_text, &mut body_text)
                .await;
        }

        meta_text.push_str(&jhove.render(jhove_configured));
        meta_text.push_str(&verapdf.render(verapdf_configured));
        meta_text.push_str(&pdfbox.render(pdfbox_configured));
        meta_text.push_str(&callas.render(callas_configured));

        let file_size = tokio::fs::metadata(filename)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        meta_text.push_str(&format!("<file size=\"{}\" />\n", file_size));

        let total_time = start_time.elapsed().as_millis();

        // At least one tool must have recognized the file as a PDF.
        if library.is_none() && !jhove.is_pdf && !pdfbox.valid_pdf {
            return Some(format!(
                "<fileanalysis filename=\"{}\" message=\"invalid-fileformat\" status=\"error\" time=\"{}\" external_time=\"{}\"><meta><file size=\"{}\" /></meta></fileanalysis>\n",
                xmlify(&name),
                total_time,
                external_time,
                file_size
            ));
        }

        let mut record = format!(
            "<fileanalysis filename=\"{}\" status=\"ok\" time=\"{}\" external_time=\"{}\">\n",
            xmlify(&name),
            total_time,
            external_time
        );
        record.push_str(&header.build());
        record.push_str(&body_text);
        record.push_str("<meta>\n");
        record.push_str(&meta_text);
        record.push_str("</meta>\n");
        record.push_str("</fileanalysis>\n");
        Some(record)
    }

    /// Header, body, and the fileformat/tools/fonts meta entries from the
    /// library inspection.
    async fn render_library(
        &self,
        inspection: &PdfInspection,
        header: &mut HeaderBuilder,
        meta_text: &mut String,
        body_text: &mut String,
    ) {
        let mut library_meta = format!(
            "<fileformat>\n<mimetype>application/pdf</mimetype>\n<version major=\"{major}\" minor=\"{minor}\">{major}.{minor}</version>\n<security locked=\"{}\" encrypted=\"{}\" />\n</fileformat>\n",
            yes_no(inspection.locked),
            yes_no(inspection.encrypted),
            major = inspection.version_major,
            minor = inspection.version_minor,
        );

        let title = inspection.title.as_deref().unwrap_or_default();
        library_meta.push_str(&tools_fragment(
            inspection.creator.as_deref(),
            inspection.producer.as_deref(),
            title,
        ));

        if !inspection.locked && !inspection.fonts.is_empty() {
            let mut fonts_text = String::new();
            for font in &inspection.fonts {
                fonts_text.push_str(&format!(
                    "<font embedded=\"{}\" subset=\"{}\">\n{}</font>\n",
                    yes_no(font.embedded),
                    yes_no(font.subset),
                    classify_font(&font.name, &font.type_name)
                ));
            }
            library_meta.push_str(&format!("<fonts>\n{}</fonts>\n", fonts_text));
        }

        meta_text.insert_str(0, &library_meta);

        header.date(inspection.creation_date, CREATION_DATE);
        header.date(inspection.modification_date, MODIFICATION_DATE);
        header.text_element("author", inspection.author.as_deref());
        header.text_element(
            "title",
            inspection
                .title
                .as_deref()
                .map(super::cleanup_title)
                .as_deref(),
        );
        header.text_element("subject", inspection.subject.as_deref());
        header.text_element("keyword", inspection.keywords.as_deref());

        if !inspection.locked {
            if let Some(text) = &inspection.text {
                if self.text_extraction >= TextExtraction::Aspell {
                    header.language(guess_language(text).await.as_deref());
                }
                body_text.push_str(&format!("<body length=\"{}\" />\n", text.len()));
            }

            header.num_pages(Some(inspection.num_pages));
            if inspection.num_pages > 0 {
                if let Some((width, height)) = inspection.page_size {
                    let mmw = (width * 0.352_777_8) as i64;
                    let mmh = (height * 0.352_777_8) as i64;
                    if mmw > 0 && mmh > 0 {
                        header.raw(&evaluate_paper_size(mmw, mmh));
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl super::FileAnalyzer for PdfAnalyzer {
    fn source_tag(&self) -> &'static str {
        "pdfanalyzer"
    }

    async fn analyze(&self, path: &Path) -> Option<String> {
        self.analyze_file(path).await
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Start an external tool through the niceness wrapper.
fn start_nice(args: &[String], cwd: Option<&Path>) -> Option<ToolHandle> {
    let mut command = Command::new(NICE_BINARY);
    command
        .args(NICE_ARGS)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    match command.spawn() {
        Ok(child) => Some(tokio::spawn(child.wait_with_output())),
        Err(e) => {
            warn!("failed to start {:?}: {}", args.first(), e);
            None
        }
    }
}

/// Wait for a started process with a deadline. Expiry does not kill the
/// process, the run just reports empty output; peers keep running.
async fn collect(handle: ToolHandle, deadline: Duration, label: &str) -> ToolRun {
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(Ok(output))) => ToolRun {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Ok(Ok(Err(e))) => {
            warn!("waiting for {} failed: {}", label, e);
            ToolRun {
                exit_code: -1,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        }
        Ok(Err(e)) => {
            warn!("{} task failed: {}", label, e);
            ToolRun {
                exit_code: -1,
                stdout: String::new(),
                stderr: String::new(),
            }
        }
        Err(_) => {
            warn!("waiting for {} exceeded its time limit", label);
            ToolRun {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }
}

/// First `n` characters of a string.
fn head(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Last `n` characters of a string.
fn tail(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

/// veraPDF output declares a flavour plus a compliance attribute nearby.
fn verapdf_flavour_passes(start: &str, flavour: &str, must_be_first: bool) -> bool {
    let needle = format!(" flavour=\"{}\"", flavour);
    let Some(position) = start.find(&needle) else {
        return false;
    };
    if must_be_first && start.find(" flavour=\"PDF") != Some(position) {
        return false;
    }
    [" isCompliant=\"true\"", " recordPasses=\"true\""]
        .iter()
        .any(|attr| {
            start
                .match_indices(*attr)
                .any(|(p, _)| p + 64 > position && p < position + 64)
        })
}

fn verapdf_filesize(start: &str) -> u64 {
    let Some(position) = start.find("item size=\"") else {
        return 0;
    };
    start[position + 11..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn verapdf_output_well_formed(output: &str) -> bool {
    (output.contains("<rawResults>") && output.contains("</rawResults>"))
        || (output.contains("<ns2:cliReport") && output.contains("</ns2:cliReport>"))
}

fn wrap_malformed_verapdf(output: &str) -> String {
    format!(
        "<error>No matching opening and closing 'rawResults' or 'ns2:cliReport' tags found in output:\n{}</error>",
        xmlify(output)
    )
}

/// Drop a leading `<?xml …?>` prologue.
fn strip_xml_prologue(output: &str) -> &str {
    if let Some(end) = output.find("?>") {
        if let Some(offset) = output[end..].find('<') {
            return &output[end + offset..];
        }
    }
    output
}

#[derive(Default)]
struct VeraPdfResult {
    finished: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
    filesize: u64,
    pdfa1b: bool,
    pdfa1a: bool,
}

impl VeraPdfResult {
    fn absorb_first_pass(&mut self, run: &ToolRun) {
        self.finished = true;
        self.exit_code = run.exit_code;
        // veraPDF sometimes returns incomplete XML; wrap it instead of
        // corrupting the log.
        self.stdout = if verapdf_output_well_formed(&run.stdout) {
            run.stdout.clone()
        } else {
            wrap_malformed_verapdf(&run.stdout)
        };
        self.stderr = run.stderr.clone();

        if run.exit_code == 0 && !run.stdout.is_empty() {
            let start = head(&run.stdout, 8192);
            self.pdfa1b = verapdf_flavour_passes(start, "PDFA_1_B", true);
            self.filesize = verapdf_filesize(start);
        }
    }

    fn absorb_second_pass(&mut self, run: &ToolRun) {
        self.exit_code = run.exit_code;
        if verapdf_output_well_formed(&run.stdout) {
            self.stdout.push('\n');
            self.stdout.push_str(strip_xml_prologue(&run.stdout));
        } else {
            self.stdout.push_str(&wrap_malformed_verapdf(&run.stdout));
        }
        self.stderr.push('\n');
        self.stderr.push_str(&run.stderr);

        if run.exit_code == 0 {
            let start = head(&run.stdout, 8192);
            self.pdfa1a = verapdf_flavour_passes(start, "PDFA_1_A", false);
        }
    }

    fn render(&self, configured: bool) -> String {
        if self.finished {
            let mut slot = format!(
                "<verapdf exitcode=\"{}\" filesize=\"{}\" pdfa1b=\"{}\" pdfa1a=\"{}\">\n",
                self.exit_code,
                self.filesize,
                yes_no(self.pdfa1b),
                yes_no(self.pdfa1a)
            );
            if !self.stdout.is_empty() {
                slot.push_str(strip_xml_prologue(&self.stdout));
            } else if !self.stderr.trim().is_empty() {
                slot.push_str(&format!("<error>{}</error>\n", xmlify(&self.stderr)));
            }
            slot.push_str("</verapdf>\n");
            slot
        } else if configured {
            "<verapdf><error>veraPDF failed to start or was never started</error></verapdf>\n"
                .to_string()
        } else {
            "<verapdf><info>not configured to run</info></verapdf>\n".to_string()
        }
    }
}

#[derive(Default)]
struct CallasResult {
    finished: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
    pdfa1_letter: Option<char>,
    count_errors: i64,
    count_warnings: i64,
}

impl CallasResult {
    fn absorb_first_pass(&mut self, run: &ToolRun) {
        self.finished = true;
        self.exit_code = run.exit_code;
        self.stdout = run.stdout.clone();
        self.stderr = run.stderr.clone();
        self.count_errors = -1;
        self.count_warnings = -1;

        if run.exit_code == 0 && !run.stdout.is_empty() {
            self.pdfa1_letter = CALLAS_PDFA
                .captures(tail(&run.stdout, 512))
                .and_then(|caps| caps[1].chars().next());
        }
    }

    fn absorb_second_pass(&mut self, run: &ToolRun) {
        self.exit_code = run.exit_code;
        self.stdout.push('\n');
        self.stdout.push_str(&run.stdout);
        self.stderr.push('\n');
        self.stderr.push_str(&run.stderr);

        if run.exit_code == 0 {
            for caps in CALLAS_SUMMARY.captures_iter(tail(&self.stdout, 512)) {
                let count = caps[2].parse().unwrap_or(-1);
                match &caps[1] {
                    "Errors" => self.count_errors = count,
                    "Warnings" => self.count_warnings = count,
                    _ => {}
                }
            }
        }
    }

    fn render(&self, configured: bool) -> String {
        if self.finished {
            let clean = self.count_errors == 0 && self.count_warnings == 0;
            let pdfa1a = self.pdfa1_letter == Some('a') && clean;
            let pdfa1b = pdfa1a || (self.pdfa1_letter == Some('b') && clean);
            let mut slot = format!(
                "<callaspdfapilot exitcode=\"{}\" pdfa1b=\"{}\" pdfa1a=\"{}\">\n",
                self.exit_code,
                yes_no(pdfa1b),
                yes_no(pdfa1a)
            );
            if !self.stdout.trim().is_empty() {
                slot.push_str(&xmlify(&self.stdout));
            } else if !self.stderr.trim().is_empty() {
                slot.push_str(&format!("<error>{}</error>\n", xmlify(&self.stderr)));
            }
            slot.push_str("</callaspdfapilot>\n");
            slot
        } else if configured {
            "<callaspdfapilot><error>callas pdfaPilot failed to start or was never started</error></callaspdfapilot>\n".to_string()
        } else {
            "<callaspdfapilot><info>not configured to run</info></callaspdfapilot>\n".to_string()
        }
    }
}

#[derive(Default)]
struct JhoveResult {
    finished: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
    is_pdf: bool,
    wellformed: bool,
    valid: bool,
    version: String,
    profile: String,
}

impl JhoveResult {
    fn absorb(&mut self, run: &ToolRun) {
        self.finished = true;
        self.exit_code = run.exit_code;
        // Newlines fold to `###` so the line-oriented output survives regex
        // scanning as one string.
        self.stdout = run.stdout.replace('\n', "###");
        self.stderr = run.stderr.replace('\n', "###");

        if run.exit_code == 0 && !self.stdout.is_empty() {
            self.is_pdf =
                self.stdout.contains("Format: PDF") && !self.stdout.contains("ErrorMessage:");
            if let Some(caps) = JHOVE_STATUS.captures(&self.stdout) {
                let status = &caps[1];
                self.wellformed = status.to_lowercase().starts_with("well-formed");
                self.valid = status.ends_with("and valid");
            }
            self.version = JHOVE_VERSION
                .captures(&self.stdout)
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();
            self.profile = JHOVE_PROFILE
                .captures(&self.stdout)
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();
        }
    }

    fn render(&self, configured: bool) -> String {
        if self.finished {
            let mut slot = format!(
                "<jhove exitcode=\"{}\" wellformed=\"{}\" valid=\"{}\" pdf=\"{}\"",
                self.exit_code,
                yes_no(self.wellformed),
                yes_no(self.valid),
                yes_no(self.is_pdf)
            );
            if self.version.is_empty()
                && self.profile.is_empty()
                && self.stdout.is_empty()
                && self.stderr.is_empty()
            {
                slot.push_str(" />\n");
                return slot;
            }
            slot.push_str(">\n");
            if !self.version.is_empty() {
                slot.push_str(&format!("<version>{}</version>\n", xmlify(&self.version)));
            }
            if !self.profile.is_empty() {
                let pdfa1a = self.profile.contains("ISO PDF/A-1, Level A");
                let pdfa1b = pdfa1a || self.profile.contains("ISO PDF/A-1, Level B");
                slot.push_str(&format!(
                    "<profile linear=\"{}\" tagged=\"{}\" pdfa1a=\"{}\" pdfa1b=\"{}\" pdfx3=\"{}\">{}</profile>\n",
                    yes_no(self.profile.contains("Linearized PDF")),
                    yes_no(self.profile.contains("Tagged PDF")),
                    yes_no(pdfa1a),
                    yes_no(pdfa1b),
                    yes_no(self.profile.contains("ISO PDF/X-3")),
                    xmlify(&self.profile)
                ));
            }
            if !self.stderr.is_empty() {
                slot.push_str(&format!(
                    "<error>{}</error>\n",
                    xmlify(&self.stderr.replace("###", "\n"))
                ));
            }
            slot.push_str("</jhove>\n");
            slot
        } else if configured {
            "<jhove><error>jHove failed to start or was never started</error></jhove>\n".to_string()
        } else {
            "<jhove><info>not configured to run</info></jhove>\n".to_string()
        }
    }
}

#[derive(Default)]
struct PdfBoxResult {
    finished: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
    valid_pdf: bool,
}

impl PdfBoxResult {
    fn absorb(&mut self, run: &ToolRun) {
        self.finished = true;
        self.exit_code = run.exit_code;
        self.stdout = run.stdout.clone();
        self.stderr = run.stderr.clone();
        if run.exit_code == 0 && !run.stdout.is_empty() {
            self.valid_pdf = run.stdout.contains("is a valid PDF/A-1b file");
        }
    }

    fn render(&self, configured: bool) -> String {
        if self.finished {
            let mut slot = format!(
                "<pdfboxvalidator exitcode=\"{}\" pdfa1b=\"{}\">\n",
                self.exit_code,
                yes_no(self.valid_pdf)
            );
            if !self.stdout.is_empty() {
                slot.push_str(&format!("<output>{}</output>\n", xmlify(&self.stdout)));
            } else if !self.stderr.is_empty() {
                slot.push_str(&format!("<error>{}</error>\n", xmlify(&self.stderr)));
            }
            slot.push_str("</pdfboxvalidator>\n");
            slot
        } else if configured {
            "<pdfboxvalidator><error>pdfbox validator failed to start or was never started</error></pdfboxvalidator>\n".to_string()
        } else {
            "<pdfboxvalidator><info>not configured to run</info></pdfboxvalidator>\n".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verapdf_flavour_detection() {
        let output = r#"<rawResults><validationResult flavour="PDFA_1_B" isCompliant="true"></validationResult><item size="12345"></item></rawResults>"#;
        assert!(verapdf_flavour_passes(output, "PDFA_1_B", true));
        assert_eq!(verapdf_filesize(output), 12345);

        let failing = r#"<rawResults><validationResult flavour="PDFA_1_B" isCompliant="false"></validationResult></rawResults>"#;
        assert!(!verapdf_flavour_passes(failing, "PDFA_1_B", true));

        // A different first flavour must not count as 1B.
        let other = r#"<x flavour="PDFA_2_B" isCompliant="true"/><y flavour="PDFA_1_B" isCompliant="true"/>"#;
        assert!(!verapdf_flavour_passes(other, "PDFA_1_B", true));

        let second_pass = r#"<ns2:cliReport><a flavour="PDFA_1_A" recordPasses="true"/></ns2:cliReport>"#;
        assert!(verapdf_flavour_passes(second_pass, "PDFA_1_A", false));
    }

    #[test]
    fn test_verapdf_malformed_wrapping() {
        assert!(verapdf_output_well_formed(
            "<rawResults>x</rawResults>"
        ));
        assert!(verapdf_output_well_formed(
            "<ns2:cliReport a=\"b\">x</ns2:cliReport>"
        ));
        assert!(!verapdf_output_well_formed("<rawResults>unclosed"));
        let wrapped = wrap_malformed_verapdf("<broken");
        assert!(wrapped.starts_with("<error>"));
        assert!(wrapped.contains("&lt;broken"));
    }

    #[test]
    fn test_strip_xml_prologue() {
        let output = "<?xml version=\"1.0\"?>\n<report>x</report>";
        assert_eq!(strip_xml_prologue(output), "<report>x</report>");
        assert_eq!(strip_xml_prologue("<report/>"), "<report/>");
    }

    #[test]
    fn test_jhove_parsing() {
        let mut jhove = JhoveResult::default();
        jhove.absorb(&ToolRun {
            exit_code: 0,
            stdout: "JhoveView\nFormat: PDF\nStatus: Well-Formed and valid\nVersion: 1.4\nProfile: Linearized PDF, ISO PDF/A-1, Level B\n".to_string(),
            stderr: String::new(),
        });
        assert!(jhove.is_pdf);
        assert!(jhove.wellformed);
        assert!(jhove.valid);
        assert_eq!(jhove.version, "1.4");
        let slot = jhove.render(true);
        assert!(slot.contains("wellformed=\"yes\""));
        assert!(slot.contains("pdfa1b=\"yes\""));
        assert!(slot.contains("pdfa1a=\"no\""));
        assert!(slot.contains("linear=\"yes\""));
    }

    #[test]
    fn test_jhove_error_message_blocks_pdf_flag() {
        let mut jhove = JhoveResult::default();
        jhove.absorb(&ToolRun {
            exit_code: 0,
            stdout: "Format: PDF\nStatus: Not well-formed\nErrorMessage: bad xref\n".to_string(),
            stderr: String::new(),
        });
        assert!(!jhove.is_pdf);
        assert!(!jhove.wellformed);
    }

    #[test]
    fn test_callas_staged_parsing() {
        let mut callas = CallasResult::default();
        callas.absorb_first_pass(&ToolRun {
            exit_code: 0,
            stdout: "Info\tPDFA\tPDF/A-1b\n".to_string(),
            stderr: String::new(),
        });
        assert_eq!(callas.pdfa1_letter, Some('b'));

        callas.absorb_second_pass(&ToolRun {
            exit_code: 0,
            stdout: "Summary\tErrors\t0\nSummary\tWarnings\t0\n".to_string(),
            stderr: String::new(),
        });
        assert_eq!(callas.count_errors, 0);
        assert_eq!(callas.count_warnings, 0);
        let slot = callas.render(true);
        assert!(slot.contains("pdfa1b=\"yes\""));
        assert!(slot.contains("pdfa1a=\"no\""));
    }

    #[test]
    fn test_callas_warnings_demote_compliance() {
        let mut callas = CallasResult::default();
        callas.absorb_first_pass(&ToolRun {
            exit_code: 0,
            stdout: "Info\tPDFA\tPDF/A-1a\n".to_string(),
            stderr: String::new(),
        });
        callas.absorb_second_pass(&ToolRun {
            exit_code: 0,
            stdout: "Summary\tErrors\t0\nSummary\tWarnings\t3\n".to_string(),
            stderr: String::new(),
        });
        let slot = callas.render(true);
        assert!(slot.contains("pdfa1b=\"no\""));
        assert!(slot.contains("pdfa1a=\"no\""));
    }

    #[test]
    fn test_unconfigured_slots() {
        assert!(VeraPdfResult::default()
            .render(false)
            .contains("<info>not configured to run</info>"));
        assert!(JhoveResult::default()
            .render(true)
            .contains("failed to start"));
        assert!(PdfBoxResult::default()
            .render(false)
            .contains("<pdfboxvalidator><info>"));
        assert!(CallasResult::default()
            .render(false)
            .contains("<callaspdfapilot><info>"));
    }

    #[test]
    fn test_head_and_tail() {
        assert_eq!(head("abcdef", 3), "abc");
        assert_eq!(head("ab", 10), "ab");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
    }
}
