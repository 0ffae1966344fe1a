use crate::error::IngestError;
use crate::models::Document;
use chrono::Utc;
use lopdf::Document as PdfFile;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Loads the report at `path` and converts it to a markdown-like text
/// representation. Returns `Ok(None)` when the file does not exist; the
/// caller reports that and stops before any indexing work happens.
pub fn load_report(path: &Path) -> Result<Option<Document>, IngestError> {
    if !path.exists() {
        return Ok(None);
    }

    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let checksum = digest_file(path)?;
    let content = pdf_to_markdown(path)?;

    Ok(Some(Document {
        content,
        source,
        checksum,
        loaded_at: Utc::now(),
    }))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extracts page text and joins the pages into one markdown-like string.
/// Page breaks become blank lines so paragraph boundaries survive into the
/// chunker.
pub fn pdf_to_markdown(path: &Path) -> Result<String, IngestError> {
    let pdf = PdfFile::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in pdf.get_pages() {
        let text = pdf
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pages.push(trimmed.replace('\u{000c}', "\n"));
        }
    }

    if pages.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::{digest_file, load_report};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn missing_report_is_reported_not_fatal() {
        let loaded = load_report(Path::new("/nonexistent/report.pdf")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("report.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn unreadable_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("broken.pdf");
        fs::write(&file_path, b"%PDF-1.4\n%broken")?;

        let result = load_report(&file_path);
        assert!(matches!(
            result,
            Err(crate::error::IngestError::PdfParse(_))
        ));
        Ok(())
    }
}
