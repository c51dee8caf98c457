use crate::{IngestError, UploadedDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every `.pdf` under `folder`, recursively, in sorted order.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reads files into uploads, keeping the given order.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>, IngestError> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    IngestError::MissingFileName(format!(
                        "path missing filename: {}",
                        path.display()
                    ))
                })?;
            let bytes = fs::read(path)?;
            Ok(UploadedDocument::new(name, bytes))
        })
        .collect()
}
