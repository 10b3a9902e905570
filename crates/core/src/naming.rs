//! Naming rules for uploaded batches and downloaded artifacts.
//!
//! Covers folder-name derivation from relative upload paths, the
//! packaged archive filename, output names for single-file conversions,
//! and filename extraction from `Content-Disposition` headers.

use std::sync::LazyLock;

use regex::Regex;

/// Folder name used when the upload has no directory structure.
pub const DEFAULT_FOLDER_NAME: &str = "converted_batch";

/// Fixed suffix appended to the folder name of a downloaded package.
pub const ARCHIVE_SUFFIX: &str = "_converted.zip";

/// Fallback output name for the generic `/convert` endpoint.
pub const GENERIC_OUTPUT_NAME: &str = "converted.docx";

static QUOTED_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).expect("valid regex"));

static BARE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"filename=([^;\s]+)").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Batch folder and archive
// ---------------------------------------------------------------------------

/// Derive the batch folder name from the submitted relative paths.
///
/// Takes the first segment of the first path that has any directory
/// structure. Loose files fall back to [`DEFAULT_FOLDER_NAME`].
pub fn folder_name_for<'a, I>(relative_paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    relative_paths
        .into_iter()
        .find_map(|path| {
            let (head, _) = path.split_once('/')?;
            let head = head.trim();
            (!head.is_empty()).then(|| head.to_string())
        })
        .unwrap_or_else(|| DEFAULT_FOLDER_NAME.to_string())
}

/// Replace every run of whitespace with a single underscore.
pub fn normalize_whitespace(name: &str) -> String {
    WHITESPACE_RE.replace_all(name, "_").into_owned()
}

/// Suggested filename for the packaged result of a batch.
pub fn archive_filename(folder_name: &str) -> String {
    format!("{}{ARCHIVE_SUFFIX}", normalize_whitespace(folder_name))
}

// ---------------------------------------------------------------------------
// Single-file outputs
// ---------------------------------------------------------------------------

/// Last segment of a `/` or `\` separated path.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Filename without its final extension.
pub fn file_stem(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

/// Output name for a PDF converted to DOCX: `<name without .pdf>_convert.docx`.
pub fn pdf_to_docx_output_name(input: &str) -> String {
    let name = basename(input);
    let base = if name.len() > 4 && name.to_ascii_lowercase().ends_with(".pdf") {
        &name[..name.len() - 4]
    } else {
        name
    };
    format!("{base}_convert.docx")
}

/// Output name for a drawing plotted to PDF.
pub fn dwg_to_pdf_output_name(input: &str) -> String {
    format!("{}.pdf", file_stem(input))
}

/// Output name for an OCR'd document.
pub fn ocr_output_name(input: &str) -> String {
    format!("{}_ocr.pdf", file_stem(input))
}

// ---------------------------------------------------------------------------
// Content-Disposition
// ---------------------------------------------------------------------------

/// Extract the suggested filename from a `Content-Disposition` value.
///
/// Only the final path segment is kept so a hostile header cannot point
/// outside the output directory. Returns `None` when no usable name is
/// present.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let raw = QUOTED_FILENAME_RE
        .captures(header)
        .or_else(|| BARE_FILENAME_RE.captures(header))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())?;

    let name = basename(raw.trim());
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_from_first_nested_path() {
        let paths = ["loose.pdf", "Site Plans/a.pdf", "Other/b.pdf"];
        assert_eq!(folder_name_for(paths), "Site Plans");
    }

    #[test]
    fn folder_defaults_for_loose_files() {
        assert_eq!(folder_name_for(["a.pdf", "b.pdf"]), DEFAULT_FOLDER_NAME);
        assert_eq!(folder_name_for(std::iter::empty()), DEFAULT_FOLDER_NAME);
    }

    #[test]
    fn archive_name_normalizes_whitespace() {
        assert_eq!(archive_filename("Site  Plans\tB"), "Site_Plans_B_converted.zip");
        assert_eq!(archive_filename("converted_batch"), "converted_batch_converted.zip");
    }

    #[test]
    fn pdf_to_docx_name_strips_pdf_case_insensitively() {
        assert_eq!(
            pdf_to_docx_output_name("LTG_DT_001 - DETAIL.PDF"),
            "LTG_DT_001 - DETAIL_convert.docx"
        );
        assert_eq!(pdf_to_docx_output_name("dir/plan.pdf"), "plan_convert.docx");
        assert_eq!(pdf_to_docx_output_name("notes.txt"), "notes.txt_convert.docx");
    }

    #[test]
    fn stem_based_names() {
        assert_eq!(dwg_to_pdf_output_name("a/b/floor.dwg"), "floor.pdf");
        assert_eq!(ocr_output_name("scan.tiff"), "scan_ocr.pdf");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn content_disposition_quoted() {
        let header = r#"attachment; filename="Site_Plans_converted.zip""#;
        assert_eq!(
            filename_from_content_disposition(header).as_deref(),
            Some("Site_Plans_converted.zip")
        );
    }

    #[test]
    fn content_disposition_bare() {
        let header = "attachment; filename=out.docx; size=10";
        assert_eq!(filename_from_content_disposition(header).as_deref(), Some("out.docx"));
    }

    #[test]
    fn content_disposition_strips_directories() {
        let header = r#"attachment; filename="../../etc/passwd""#;
        assert_eq!(filename_from_content_disposition(header).as_deref(), Some("passwd"));
        assert_eq!(filename_from_content_disposition(r#"attachment; filename="..""#), None);
    }

    #[test]
    fn content_disposition_missing() {
        assert_eq!(filename_from_content_disposition("inline"), None);
    }
}
