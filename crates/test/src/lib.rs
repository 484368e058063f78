//! Test helpers and fixtures.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scanner_application::{Command, Controller, Event};
use scanner_core::{LoadTicket, Settings, Source};
use scanner_engine::{ContentLoader, DocumentRenderer, EngineReport, PdfRenderer, inspect_path};
use scanner_ui::report_event;

pub const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn make_settings(default_zoom_percent: u16) -> Settings {
    let mut settings = Settings::default();
    settings.zoom.default_percent = default_zoom_percent;
    settings.normalize();
    settings
}

pub fn write_temp_file(dir: &Path, name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// A small but well-formed PDF with `pages` pages, each drawing the text
/// `Page N`.
pub fn minimal_pdf(pages: u32) -> Vec<u8> {
    let page_ids: Vec<u32> = (0..pages).map(|i| 3 + i * 2).collect();
    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {pages} >>",
            page_ids
                .iter()
                .map(|id| format!("{id} 0 R"))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    ];
    for (i, id) in page_ids.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
            id + 1
        ));
        let content = format!("BT 72 720 Td (Page {}) Tj ET", i + 1);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_offset = out.len();
    let size = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n")
            .as_bytes(),
    );
    out
}

/// Remembers every open request without answering it, so a test can
/// deliver renderer results in any order.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    opened: Arc<Mutex<Vec<LoadTicket>>>,
}

impl RecordingRenderer {
    pub fn opened(&self) -> Vec<LoadTicket> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

impl DocumentRenderer for RecordingRenderer {
    fn open(&self, ticket: LoadTicket, _bytes: Arc<[u8]>) {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(ticket);
        }
    }
}

/// Drives a [`Controller`] with the real background loader, executing the
/// commands it returns the way the terminal UI does.
pub struct Harness<R> {
    pub controller: Controller,
    pub renderer: R,
    loader: ContentLoader,
    reports: Receiver<EngineReport>,
    renderer_replies: bool,
}

impl Harness<PdfRenderer> {
    pub fn new(settings: &Settings) -> Self {
        let (tx, reports) = mpsc::channel();
        Self {
            controller: Controller::new(settings),
            renderer: PdfRenderer::new(tx.clone()),
            loader: ContentLoader::new(tx),
            reports,
            renderer_replies: true,
        }
    }
}

impl Harness<RecordingRenderer> {
    pub fn recording(settings: &Settings) -> Self {
        let (tx, reports) = mpsc::channel();
        Self {
            controller: Controller::new(settings),
            renderer: RecordingRenderer::default(),
            loader: ContentLoader::new(tx),
            reports,
            renderer_replies: false,
        }
    }
}

impl<R: DocumentRenderer> Harness<R> {
    pub fn dispatch(&mut self, event: Event) {
        for command in self.controller.dispatch(event) {
            match command {
                Command::Read { ticket, document } => self.loader.spawn_read(ticket, document),
                Command::Open { ticket, bytes } => self.renderer.open(ticket, bytes),
            }
        }
    }

    pub fn choose<P: AsRef<Path>>(&mut self, source: Source, paths: &[P]) {
        let files = paths.iter().map(|path| inspect_path(path.as_ref())).collect();
        self.dispatch(Event::FilesChosen { source, files });
    }

    /// Receives one background report and applies it.
    pub fn pump_one(&mut self) -> anyhow::Result<()> {
        let report = self.reports.recv_timeout(REPORT_TIMEOUT)?;
        self.dispatch(report_event(report));
        Ok(())
    }

    /// Applies reports until the controller waits on nothing, or only on a
    /// renderer that never answers.
    pub fn settle(&mut self) -> anyhow::Result<()> {
        loop {
            let session = self.controller.session();
            if session.pending_read().is_none() && session.pending_render().is_none() {
                return Ok(());
            }
            if session.pending_read().is_none() && !self.renderer_replies {
                return Ok(());
            }
            self.pump_one()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{ErrorKind, IngestionMode, Loading};
    use scanner_engine::{Engine, count_pages};

    fn error_kind<R: DocumentRenderer>(harness: &Harness<R>) -> Option<ErrorKind> {
        harness
            .controller
            .preview()
            .error
            .as_ref()
            .map(|err| err.kind())
    }

    #[test]
    fn builds_settings() {
        let settings = make_settings(140);
        assert_eq!(settings.zoom.initial().percent(), 140);
    }

    #[test]
    fn minimal_pdf_has_requested_pages() -> anyhow::Result<()> {
        assert_eq!(count_pages(&minimal_pdf(3))?, 3);
        assert_eq!(count_pages(&minimal_pdf(1))?, 1);
        Ok(())
    }

    #[test]
    fn minimal_pdf_text_is_extractable() -> anyhow::Result<()> {
        let text = Engine::new().page_text(&minimal_pdf(2), 1)?;
        assert!(text.contains("Page 2"), "got {text:?}");
        Ok(())
    }

    #[test]
    fn text_file_previews_as_text() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.txt", b"Hello")?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        assert_eq!(harness.controller.preview().loading, Loading::Reading);
        harness.settle()?;

        let preview = harness.controller.preview();
        assert_eq!(harness.controller.document().map(|d| d.mode), Some(IngestionMode::Text));
        assert_eq!(preview.text_content(), Some("Hello"));
        assert!(preview.binary_content().is_none());
        assert_eq!(preview.error, None);
        assert_eq!(preview.loading, Loading::Idle);
        Ok(())
    }

    #[test]
    fn pdf_pages_and_zoom_are_clamped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.pdf", &minimal_pdf(3))?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;
        assert_eq!(harness.controller.preview().total_pages, Some(3));
        assert_eq!(harness.controller.preview().current_page, 1);
        assert!(harness.controller.preview().text_content().is_none());

        harness.dispatch(Event::ChangePage(5));
        assert_eq!(harness.controller.preview().current_page, 3);
        harness.dispatch(Event::ChangePage(-10));
        assert_eq!(harness.controller.preview().current_page, 1);

        for _ in 0..20 {
            harness.dispatch(Event::ZoomIn);
        }
        assert_eq!(harness.controller.preview().zoom.percent(), 250);
        for _ in 0..20 {
            harness.dispatch(Event::ZoomOut);
        }
        assert_eq!(harness.controller.preview().zoom.percent(), 70);

        let request = harness
            .controller
            .render_request()
            .ok_or_else(|| anyhow::anyhow!("no render request"))?;
        assert_eq!(request.total_pages, 3);
        assert_eq!(request.page_index, 0);
        Ok(())
    }

    #[test]
    fn drop_and_picker_reach_the_same_state() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.pdf", &minimal_pdf(2))?;

        let mut picked = Harness::new(&Settings::default());
        picked.choose(Source::Picker, &[&path]);
        picked.settle()?;

        let mut dropped = Harness::new(&Settings::default());
        dropped.dispatch(Event::DragEnter);
        dropped.choose(Source::Drop, &[&path]);
        assert!(!dropped.controller.preview().is_drag_active);
        dropped.settle()?;

        assert_eq!(picked.controller.preview(), dropped.controller.preview());
        assert_eq!(picked.controller.document(), dropped.controller.document());
        Ok(())
    }

    #[test]
    fn multi_file_drop_previews_only_the_first() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = write_temp_file(dir.path(), "a.txt", b"first")?;
        let second = write_temp_file(dir.path(), "b.pdf", &minimal_pdf(1))?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Drop, &[&first, &second]);
        harness.settle()?;
        assert_eq!(harness.controller.preview().text_content(), Some("first"));
        assert_eq!(harness.controller.preview().total_pages, None);
        Ok(())
    }

    #[test]
    fn superseded_read_never_commits() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_temp_file(dir.path(), "a.txt", &vec![b'A'; 256 * 1024])?;
        let b = write_temp_file(dir.path(), "b.txt", b"B")?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&a]);
        harness.choose(Source::Picker, &[&b]);
        harness.pump_one()?;
        harness.pump_one()?;

        assert_eq!(harness.controller.preview().text_content(), Some("B"));
        assert_eq!(harness.controller.document().map(|d| d.name.as_str()), Some("b.txt"));
        assert_eq!(harness.controller.preview().loading, Loading::Idle);
        Ok(())
    }

    #[test]
    fn superseded_renderer_report_is_ignored() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = write_temp_file(dir.path(), "a.pdf", &minimal_pdf(4))?;
        let b = write_temp_file(dir.path(), "b.txt", b"B")?;
        let mut harness = Harness::recording(&Settings::default());

        harness.choose(Source::Picker, &[&a]);
        harness.settle()?;
        let opened = harness.renderer.opened();
        let [first_open] = opened.as_slice() else {
            anyhow::bail!("expected one open request, got {opened:?}");
        };
        let first_open = *first_open;

        harness.choose(Source::Picker, &[&b]);
        harness.settle()?;
        harness.dispatch(Event::RendererLoaded {
            ticket: first_open,
            total_pages: 4,
        });

        let preview = harness.controller.preview();
        assert_eq!(preview.total_pages, None);
        assert_eq!(preview.text_content(), Some("B"));
        assert_eq!(preview.error, None);
        Ok(())
    }

    #[test]
    fn corrupt_pdf_is_a_render_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "bad.pdf", b"%PDF-1.4 this is not really a pdf")?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;

        let preview = harness.controller.preview();
        assert_eq!(error_kind(&harness), Some(ErrorKind::RenderFailure));
        assert_eq!(preview.total_pages, None);
        assert_eq!(preview.current_page, 1);
        assert_eq!(preview.loading, Loading::Idle);
        Ok(())
    }

    #[test]
    fn empty_and_pageless_pdfs_have_no_data() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let empty = write_temp_file(dir.path(), "empty.pdf", b"")?;
        let pageless = write_temp_file(dir.path(), "zero.pdf", &minimal_pdf(0))?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&empty]);
        harness.settle()?;
        assert_eq!(error_kind(&harness), Some(ErrorKind::NoDataAvailable));

        harness.choose(Source::Picker, &[&pageless]);
        assert_eq!(harness.controller.preview().error, None);
        harness.settle()?;
        assert_eq!(error_kind(&harness), Some(ErrorKind::NoDataAvailable));
        assert_eq!(harness.controller.preview().total_pages, None);
        Ok(())
    }

    #[test]
    fn failed_read_can_be_retried() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("late.txt");
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;
        assert_eq!(error_kind(&harness), Some(ErrorKind::ReadFailure));
        assert_eq!(harness.controller.preview().content, None);

        std::fs::write(&path, "now it exists")?;
        harness.dispatch(Event::Retry);
        assert_eq!(harness.controller.preview().error, None);
        harness.settle()?;
        assert_eq!(harness.controller.preview().text_content(), Some("now it exists"));
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.txt", b"caf\xe9")?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;
        assert_eq!(harness.controller.preview().text_content(), Some("caf\u{FFFD}"));
        assert_eq!(harness.controller.preview().error, None);
        Ok(())
    }

    #[test]
    fn docx_is_read_as_text() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.docx", b"PK\x03\x04")?;
        let mut harness = Harness::new(&Settings::default());

        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;
        assert_eq!(harness.controller.document().map(|d| d.mode), Some(IngestionMode::Text));
        assert!(harness.controller.preview().text_content().is_some());
        Ok(())
    }

    #[test]
    fn drag_does_not_disturb_loaded_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_temp_file(dir.path(), "cv.txt", b"Hello")?;
        let mut harness = Harness::new(&Settings::default());
        harness.choose(Source::Picker, &[&path]);
        harness.settle()?;
        let before = harness.controller.session().clone();

        harness.dispatch(Event::DragEnter);
        assert!(harness.controller.preview().is_drag_active);
        harness.dispatch(Event::DragLeave);
        assert_eq!(harness.controller.session(), &before);
        Ok(())
    }
}
