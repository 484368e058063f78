//! Core domain types for the resume scanner.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const TEXT_MEDIA_TYPE: &str = "text/plain";
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const OCTET_STREAM_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub u64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Identity of one load attempt. A result is only committed while its
/// ticket is still the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub document: DocumentId,
    pub attempt: u64,
}

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.document, self.attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    Text,
    Binary,
}

impl IngestionMode {
    /// PDF media types are read as raw bytes, everything else is decoded as
    /// text. Non-PDF binaries such as `.docx` therefore show up garbled.
    pub fn classify(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => IngestionMode::Binary,
            _ => IngestionMode::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionMode::Text => "text",
            IngestionMode::Binary => "binary",
        }
    }
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared media type for a file picked from disk, derived from its
/// extension.
pub fn media_type_for_path(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => PDF_MEDIA_TYPE,
        Some("txt") | Some("md") | Some("text") => TEXT_MEDIA_TYPE,
        Some("docx") => DOCX_MEDIA_TYPE,
        _ => OCTET_STREAM_MEDIA_TYPE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Picker,
    Drop,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Picker => "picker",
            Source::Drop => "drop",
        }
    }
}

/// A file handle as produced by the picker or a drop, before it has been
/// classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub id: DocumentId,
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub media_type: String,
    pub mode: IngestionMode,
}

impl UploadedDocument {
    pub fn from_selection(id: DocumentId, file: SelectedFile) -> Self {
        let mode = IngestionMode::classify(&file.media_type);
        Self {
            id,
            name: file.name,
            path: file.path,
            size_bytes: file.size_bytes,
            media_type: file.media_type,
            mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Arc<[u8]>),
}

impl Content {
    pub fn mode(&self) -> IngestionMode {
        match self {
            Content::Text(_) => IngestionMode::Text,
            Content::Binary(_) => IngestionMode::Binary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Text(text) => text.len(),
            Content::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content committed by one load. `ticket` identifies that load, so a
/// retried read of the same document yields a distinct value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContent {
    pub document: DocumentId,
    pub ticket: LoadTicket,
    pub name: String,
    pub body: Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ReadFailure,
    RenderFailure,
    NoDataAvailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ReadFailure => "read failure",
            ErrorKind::RenderFailure => "render failure",
            ErrorKind::NoDataAvailable => "no data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("could not read {name}: {reason}")]
    ReadFailure { name: String, reason: String },
    #[error("could not render {name}: {reason}")]
    RenderFailure { name: String, reason: String },
    #[error("{name} has no data to display")]
    NoDataAvailable { name: String },
}

impl PreviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreviewError::ReadFailure { .. } => ErrorKind::ReadFailure,
            PreviewError::RenderFailure { .. } => ErrorKind::RenderFailure,
            PreviewError::NoDataAvailable { .. } => ErrorKind::NoDataAvailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomPolicy {
    pub min_percent: u16,
    pub max_percent: u16,
    pub step_percent: u16,
    pub default_percent: u16,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            min_percent: 70,
            max_percent: 250,
            step_percent: 20,
            default_percent: 120,
        }
    }
}

impl ZoomPolicy {
    pub fn normalize(&mut self) {
        self.min_percent = self.min_percent.clamp(10, 1000);
        self.max_percent = self.max_percent.clamp(self.min_percent, 1000);
        self.step_percent = self.step_percent.clamp(1, self.max_percent);
        self.default_percent = self
            .default_percent
            .clamp(self.min_percent, self.max_percent);
    }

    pub fn initial(&self) -> Zoom {
        Zoom(self.default_percent.clamp(self.min_percent, self.max_percent))
    }
}

/// Zoom scale in whole percent, so policy bounds are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Zoom(u16);

impl Zoom {
    pub fn percent(self) -> u16 {
        self.0
    }

    pub fn scale(self) -> f32 {
        f32::from(self.0) / 100.0
    }

    pub fn zoom_in(self, policy: &ZoomPolicy) -> Self {
        Zoom(
            self.0
                .saturating_add(policy.step_percent)
                .min(policy.max_percent),
        )
    }

    pub fn zoom_out(self, policy: &ZoomPolicy) -> Self {
        Zoom(
            self.0
                .saturating_sub(policy.step_percent)
                .max(policy.min_percent),
        )
    }
}

impl Default for Zoom {
    fn default() -> Self {
        ZoomPolicy::default().initial()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loading {
    #[default]
    Idle,
    Reading,
    Rendering,
}

impl Loading {
    pub fn is_busy(&self) -> bool {
        !matches!(self, Loading::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Loading::Idle => "idle",
            Loading::Reading => "reading",
            Loading::Rendering => "rendering",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewState {
    pub content: Option<LoadedContent>,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub zoom: Zoom,
    pub is_drag_active: bool,
    pub error: Option<PreviewError>,
    pub loading: Loading,
}

impl PreviewState {
    pub fn new(zoom: Zoom) -> Self {
        Self {
            content: None,
            current_page: 1,
            total_pages: None,
            zoom,
            is_drag_active: false,
            error: None,
            loading: Loading::Idle,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match self.content.as_ref().map(|c| &c.body) {
            Some(Content::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn binary_content(&self) -> Option<&Arc<[u8]>> {
        match self.content.as_ref().map(|c| &c.body) {
            Some(Content::Binary(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn page_index(&self) -> u32 {
        self.current_page.saturating_sub(1)
    }

    /// `current_page` is always within `1..=total_pages`, or 1 while the
    /// page count is unknown.
    pub fn clamp_page(&mut self) {
        self.current_page = match self.total_pages {
            Some(total) if total > 0 => self.current_page.clamp(1, total),
            _ => 1,
        };
    }

    pub fn change_page(&mut self, offset: i64) {
        let Some(total) = self.total_pages else {
            return;
        };
        let target = i64::from(self.current_page).saturating_add(offset);
        self.current_page = target.clamp(1, i64::from(total.max(1))) as u32;
    }
}

impl Default for PreviewState {
    fn default() -> Self {
        Self::new(Zoom::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err("unknown theme"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub zoom: ZoomPolicy,
    pub theme: Theme,
    pub accept_extensions: Vec<String>,
    pub start_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom: ZoomPolicy::default(),
            theme: Theme::Dark,
            accept_extensions: vec!["pdf".to_string(), "txt".to_string(), "docx".to_string()],
            start_dir: None,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.zoom.normalize();
        self.accept_extensions = self
            .accept_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.accept_extensions.sort();
        self.accept_extensions.dedup();
        self.start_dir = self
            .start_dir
            .take()
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty());
    }

    pub fn cycle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        };
    }

    /// Picker hint such as `.docx, .pdf, .txt`. Never enforced.
    pub fn accept_hint(&self) -> String {
        self.accept_extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
