//! Ingestion and preview controller.
//!
//! All transitions go through [`reduce`], a pure function from the current
//! [`Session`] and an [`Event`] to the next session plus the [`Command`]s
//! the caller must execute (background reads, renderer opens). Results of
//! those commands come back as events carrying the [`LoadTicket`] they were
//! issued with; a result whose ticket is no longer active is dropped.

use std::sync::Arc;

use scanner_core::{
    Content, DocumentId, Loading, LoadedContent, LoadTicket, PreviewError, PreviewState,
    SelectedFile, Settings, Source, UploadedDocument, ZoomPolicy,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DragEnter,
    DragLeave,
    FilesChosen {
        source: Source,
        files: Vec<SelectedFile>,
    },
    ReadCompleted {
        ticket: LoadTicket,
        result: Result<Content, PreviewError>,
    },
    RendererLoaded {
        ticket: LoadTicket,
        total_pages: u32,
    },
    RendererFailed {
        ticket: LoadTicket,
        message: String,
    },
    ChangePage(i64),
    ZoomIn,
    ZoomOut,
    ZoomReset,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read {
        ticket: LoadTicket,
        document: UploadedDocument,
    },
    Open {
        ticket: LoadTicket,
        bytes: Arc<[u8]>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub document: Option<UploadedDocument>,
    pub preview: PreviewState,
    pub zoom_policy: ZoomPolicy,
    pending_read: Option<LoadTicket>,
    pending_render: Option<LoadTicket>,
    next_document: u64,
    next_attempt: u64,
}

impl Session {
    pub fn new(settings: &Settings) -> Self {
        let mut zoom_policy = settings.zoom;
        zoom_policy.normalize();
        Self {
            document: None,
            preview: PreviewState::new(zoom_policy.initial()),
            zoom_policy,
            pending_read: None,
            pending_render: None,
            next_document: 1,
            next_attempt: 1,
        }
    }

    pub fn pending_read(&self) -> Option<LoadTicket> {
        self.pending_read
    }

    pub fn pending_render(&self) -> Option<LoadTicket> {
        self.pending_render
    }

    fn issue_ticket(&mut self, document: DocumentId) -> LoadTicket {
        let ticket = LoadTicket {
            document,
            attempt: self.next_attempt,
        };
        self.next_attempt += 1;
        ticket
    }

    fn current_name(&self) -> String {
        self.document
            .as_ref()
            .map(|doc| doc.name.clone())
            .unwrap_or_default()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

pub fn reduce(mut state: Session, event: Event) -> (Session, Vec<Command>) {
    let mut commands = Vec::new();

    match event {
        Event::DragEnter => state.preview.is_drag_active = true,
        Event::DragLeave => state.preview.is_drag_active = false,
        Event::FilesChosen { source, files } => {
            state.preview.is_drag_active = false;
            let Some(file) = files.into_iter().next() else {
                return (state, commands);
            };

            let id = DocumentId(state.next_document);
            state.next_document += 1;
            let document = UploadedDocument::from_selection(id, file);
            let ticket = state.issue_ticket(id);
            tracing::info!(
                source = source.as_str(),
                %ticket,
                name = %document.name,
                mode = %document.mode,
                size = document.size_bytes,
                "file selected"
            );

            state.preview.error = None;
            state.preview.loading = Loading::Reading;
            state.pending_read = Some(ticket);
            state.pending_render = None;
            state.document = Some(document.clone());
            commands.push(Command::Read { ticket, document });
        }
        Event::ReadCompleted { ticket, result } => {
            if state.pending_read != Some(ticket) {
                tracing::debug!(%ticket, "dropping stale read result");
                return (state, commands);
            }
            state.pending_read = None;
            let Some(document) = state.document.clone() else {
                state.preview.loading = Loading::Idle;
                return (state, commands);
            };

            match result {
                Ok(body) if body.mode() != document.mode => {
                    tracing::warn!(%ticket, "loader returned content for the wrong mode");
                    state.preview.error = Some(PreviewError::ReadFailure {
                        name: document.name.clone(),
                        reason: format!("expected {} content", document.mode),
                    });
                    state.preview.loading = Loading::Idle;
                }
                Ok(body) => {
                    tracing::info!(%ticket, bytes = body.len(), "read completed");
                    let open_bytes = match &body {
                        Content::Binary(bytes) => Some(bytes.clone()),
                        Content::Text(_) => None,
                    };
                    state.preview.content = Some(LoadedContent {
                        document: document.id,
                        ticket,
                        name: document.name.clone(),
                        body,
                    });
                    state.preview.error = None;
                    state.preview.current_page = 1;
                    state.preview.total_pages = None;

                    match open_bytes {
                        Some(bytes) if bytes.is_empty() => {
                            state.preview.error = Some(PreviewError::NoDataAvailable {
                                name: document.name.clone(),
                            });
                            state.preview.loading = Loading::Idle;
                        }
                        Some(bytes) => {
                            state.preview.loading = Loading::Rendering;
                            state.pending_render = Some(ticket);
                            commands.push(Command::Open { ticket, bytes });
                        }
                        None => state.preview.loading = Loading::Idle,
                    }
                }
                Err(err) => {
                    tracing::warn!(%ticket, error = %err, "read failed");
                    state.preview.error = Some(err);
                    state.preview.loading = Loading::Idle;
                }
            }
        }
        Event::RendererLoaded {
            ticket,
            total_pages,
        } => {
            if state.pending_render != Some(ticket) {
                tracing::debug!(%ticket, "dropping stale renderer report");
                return (state, commands);
            }
            state.pending_render = None;
            state.preview.loading = Loading::Idle;
            if total_pages == 0 {
                state.preview.total_pages = None;
                state.preview.error = Some(PreviewError::NoDataAvailable {
                    name: state.current_name(),
                });
            } else {
                tracing::info!(%ticket, total_pages, "document opened");
                state.preview.total_pages = Some(total_pages);
            }
            state.preview.clamp_page();
        }
        Event::RendererFailed { ticket, message } => {
            if state.pending_render != Some(ticket) {
                tracing::debug!(%ticket, "dropping stale renderer failure");
                return (state, commands);
            }
            tracing::warn!(%ticket, %message, "renderer failed");
            state.pending_render = None;
            state.preview.loading = Loading::Idle;
            state.preview.total_pages = None;
            state.preview.current_page = 1;
            state.preview.error = Some(PreviewError::RenderFailure {
                name: state.current_name(),
                reason: message,
            });
        }
        Event::ChangePage(offset) => state.preview.change_page(offset),
        Event::ZoomIn => {
            state.preview.zoom = state.preview.zoom.zoom_in(&state.zoom_policy);
        }
        Event::ZoomOut => {
            state.preview.zoom = state.preview.zoom.zoom_out(&state.zoom_policy);
        }
        Event::ZoomReset => state.preview.zoom = state.zoom_policy.initial(),
        Event::Retry => {
            if state.preview.loading.is_busy() {
                return (state, commands);
            }
            let Some(document) = state.document.clone() else {
                return (state, commands);
            };
            let ticket = state.issue_ticket(document.id);
            tracing::info!(%ticket, name = %document.name, "retrying read");
            state.preview.error = None;
            state.preview.loading = Loading::Reading;
            state.pending_read = Some(ticket);
            state.pending_render = None;
            commands.push(Command::Read { ticket, document });
        }
    }

    (state, commands)
}

/// Owns the session and applies events in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    session: Session,
}

impl Controller {
    pub fn new(settings: &Settings) -> Self {
        Self {
            session: Session::new(settings),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn preview(&self) -> &PreviewState {
        &self.session.preview
    }

    pub fn document(&self) -> Option<&UploadedDocument> {
        self.session.document.as_ref()
    }

    #[must_use]
    pub fn dispatch(&mut self, event: Event) -> Vec<Command> {
        let session = std::mem::take(&mut self.session);
        let (session, commands) = reduce(session, event);
        self.session = session;
        commands
    }

    /// The page and scale the renderer should draw, if a binary document
    /// has been opened.
    pub fn render_request(&self) -> Option<RenderRequest> {
        let preview = &self.session.preview;
        let bytes = preview.binary_content()?.clone();
        let total_pages = preview.total_pages?;
        let content = preview.content.as_ref()?;
        Some(RenderRequest {
            document: content.document,
            ticket: content.ticket,
            bytes,
            page_index: preview.page_index(),
            total_pages,
            zoom_percent: preview.zoom.percent(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub document: DocumentId,
    /// The load that produced `bytes`.
    pub ticket: LoadTicket,
    pub bytes: Arc<[u8]>,
    pub page_index: u32,
    pub total_pages: u32,
    pub zoom_percent: u16,
}
