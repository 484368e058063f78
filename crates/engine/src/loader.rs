use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use scanner_core::{
    Content, IngestionMode, LoadTicket, PreviewError, SelectedFile, UploadedDocument,
    media_type_for_path,
};

use crate::EngineReport;

/// Reads selected files off the UI thread. Each read reports exactly once,
/// tagged with the ticket it was started with.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    reports: Sender<EngineReport>,
}

impl ContentLoader {
    pub fn new(reports: Sender<EngineReport>) -> Self {
        Self { reports }
    }

    pub fn spawn_read(&self, ticket: LoadTicket, document: UploadedDocument) {
        let reports = self.reports.clone();
        let name = document.name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("read-{ticket}"))
            .spawn(move || {
                let result = read_document(&document);
                let _ = reports.send(EngineReport::Read { ticket, result });
            });

        if let Err(err) = spawned {
            tracing::error!(%ticket, error = %err, "failed to spawn reader thread");
            let _ = self.reports.send(EngineReport::Read {
                ticket,
                result: Err(PreviewError::ReadFailure {
                    name,
                    reason: format!("could not start read: {err}"),
                }),
            });
        }
    }
}

/// Reads a document according to its mode: lossy UTF-8 text for text mode,
/// raw bytes for binary mode.
pub fn read_document(document: &UploadedDocument) -> Result<Content, PreviewError> {
    let failure = |reason: String| PreviewError::ReadFailure {
        name: document.name.clone(),
        reason,
    };

    let bytes = std::fs::read(&document.path).map_err(|err| failure(err.to_string()))?;
    let read = bytes.len() as u64;
    if read < document.size_bytes {
        return Err(failure(format!(
            "truncated: expected {} bytes, got {read}",
            document.size_bytes
        )));
    }

    Ok(match document.mode {
        IngestionMode::Text => Content::Text(String::from_utf8_lossy(&bytes).into_owned()),
        IngestionMode::Binary => Content::Binary(Arc::from(bytes)),
    })
}

/// Builds a selection from a path. Metadata errors are not reported here;
/// they surface as a read failure once the file is loaded.
pub fn inspect_path(path: &Path) -> SelectedFile {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    SelectedFile {
        name,
        path: path.to_path_buf(),
        size_bytes,
        media_type: media_type_for_path(path).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{DocumentId, ErrorKind, PDF_MEDIA_TYPE, TEXT_MEDIA_TYPE};
    use std::io::Write as _;
    use std::sync::mpsc;
    use std::time::Duration;

    fn document(path: &Path, size_bytes: u64, media_type: &str) -> UploadedDocument {
        UploadedDocument::from_selection(
            DocumentId(1),
            SelectedFile {
                name: "cv".to_string(),
                path: path.to_path_buf(),
                size_bytes,
                media_type: media_type.to_string(),
            },
        )
    }

    #[test]
    fn reads_text_lossily() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"Hello \xff")?;
        let doc = document(file.path(), 7, TEXT_MEDIA_TYPE);
        assert_eq!(read_document(&doc)?, Content::Text("Hello \u{FFFD}".to_string()));
        Ok(())
    }

    #[test]
    fn reads_binary_verbatim() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"%PDF\x00\xff")?;
        let doc = document(file.path(), 6, PDF_MEDIA_TYPE);
        assert_eq!(
            read_document(&doc)?,
            Content::Binary(Arc::from(&b"%PDF\x00\xff"[..]))
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_read_failure() {
        let doc = document(Path::new("/definitely/not/here.txt"), 0, TEXT_MEDIA_TYPE);
        let err = read_document(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadFailure);
    }

    #[test]
    fn short_read_is_truncation() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"abc")?;
        let doc = document(file.path(), 10, TEXT_MEDIA_TYPE);
        let err = read_document(&doc).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        Ok(())
    }

    #[test]
    fn inspect_uses_extension_and_size() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"12345")?;
        let selected = inspect_path(&path);
        assert_eq!(selected.name, "resume.pdf");
        assert_eq!(selected.size_bytes, 5);
        assert_eq!(selected.media_type, PDF_MEDIA_TYPE);
        Ok(())
    }

    #[test]
    fn spawned_read_reports_with_ticket() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"Hello")?;
        let (tx, rx) = mpsc::channel();
        let loader = ContentLoader::new(tx);
        let ticket = LoadTicket {
            document: DocumentId(1),
            attempt: 3,
        };
        loader.spawn_read(ticket, document(file.path(), 5, TEXT_MEDIA_TYPE));

        let report = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(
            report,
            EngineReport::Read {
                ticket,
                result: Ok(Content::Text("Hello".to_string())),
            }
        );
        Ok(())
    }
}
