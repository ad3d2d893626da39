//! Input discovery: find the candidate PDFs of a run and map each one to its
//! output path.
//!
//! We validate the PDF magic bytes (`%PDF`) before rasterising so a stray
//! renamed file fails with a clear message instead of a pdfium error.

use crate::error::{DocumentError, Pdf2TxtError};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether `path` has a `.pdf` extension (case-insensitive).
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// List candidate PDFs directly inside `dir`, sorted by file name.
///
/// Sub-directories are not descended into. Sorting makes runs (and their
/// logs) reproducible regardless of directory iteration order.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, Pdf2TxtError> {
    if !dir.is_dir() {
        return Err(Pdf2TxtError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| Pdf2TxtError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Pdf2TxtError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_pdf_path(&path) {
            pdfs.push(path);
        }
    }

    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} PDF(s) in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// `<output_dir>/<pdf stem>.txt`
pub fn output_path_for(pdf_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "document".into());
    let mut name = stem;
    name.push(".txt");
    output_dir.join(name)
}

/// PDFs whose output path is already taken by an earlier PDF in `pdfs`,
/// mapped to that earlier PDF.
///
/// `a.PDF` and `a.pdf` both map to `a.txt`; only the first in run order
/// may write it.
pub fn output_collisions(pdfs: &[PathBuf], output_dir: &Path) -> HashMap<PathBuf, PathBuf> {
    let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut collisions = HashMap::new();
    for pdf in pdfs {
        let target = output_path_for(pdf, output_dir);
        match claimed.get(&target) {
            Some(first) => {
                collisions.insert(pdf.clone(), (*first).clone());
            }
            None => {
                claimed.insert(target, pdf);
            }
        }
    }
    collisions
}

/// Check that `path` is readable and starts with the `%PDF` magic bytes.
///
/// Files shorter than four bytes pass through; pdfium reports them as
/// corrupt with a more useful message.
pub fn validate_pdf(path: &Path) -> Result<(), DocumentError> {
    let mut f = std::fs::File::open(path).map_err(|e| DocumentError::CorruptPdf {
        path: path.to_path_buf(),
        detail: format!("cannot open: {e}"),
    })?;

    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(DocumentError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_is_case_insensitive() {
        assert!(is_pdf_path(Path::new("a.pdf")));
        assert!(is_pdf_path(Path::new("b.PDF")));
        assert!(is_pdf_path(Path::new("dir/c.Pdf")));
        assert!(!is_pdf_path(Path::new("d.pdf.txt")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }

    #[test]
    fn output_path_replaces_extension() {
        assert_eq!(
            output_path_for(Path::new("in/Annual Report.PDF"), Path::new("out")),
            PathBuf::from("out/Annual Report.txt")
        );
        assert_eq!(
            output_path_for(Path::new("in/v1.2.pdf"), Path::new("out")),
            PathBuf::from("out/v1.2.txt")
        );
    }

    #[test]
    fn later_pdf_with_same_stem_collides() {
        let pdfs = vec![
            PathBuf::from("in/a.PDF"),
            PathBuf::from("in/a.pdf"),
            PathBuf::from("in/b.pdf"),
            PathBuf::from("in/a.Pdf"),
        ];
        let collisions = output_collisions(&pdfs, Path::new("out"));

        assert_eq!(collisions.len(), 2);
        assert_eq!(collisions[&PathBuf::from("in/a.pdf")], PathBuf::from("in/a.PDF"));
        assert_eq!(collisions[&PathBuf::from("in/a.Pdf")], PathBuf::from("in/a.PDF"));
        assert!(!collisions.contains_key(&PathBuf::from("in/a.PDF")));
        assert!(!collisions.contains_key(&PathBuf::from("in/b.pdf")));
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let found: Vec<String> = discover_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn discover_missing_dir_is_fatal() {
        let err = discover_pdfs(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Pdf2TxtError::InputDirNotFound { .. }));
    }

    #[test]
    fn validate_rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.pdf");
        std::fs::write(&fake, b"PK\x03\x04zip").unwrap();
        assert!(matches!(
            validate_pdf(&fake),
            Err(DocumentError::NotAPdf { magic, .. }) if &magic == b"PK\x03\x04"
        ));

        let real = dir.path().join("real.pdf");
        std::fs::write(&real, b"%PDF-1.7\n").unwrap();
        assert!(validate_pdf(&real).is_ok());
    }
}
