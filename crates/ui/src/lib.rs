//! ratatui-based UI.

use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui_image::picker::Picker;
use scanner_application::{Command, Controller, Event};
use scanner_core::{LoadTicket, Loading, Settings, Source, Theme};
use scanner_engine::{
    ContentLoader, DocumentRenderer, Engine, EngineReport, PdfRenderer, inspect_path,
};
use unicode_width::UnicodeWidthStr;

mod drop;
mod image_protocol;
mod page_view;

use page_view::PageView;

const TEXT_SCROLL_STEP: u16 = 1;
const PAN_STEP_CELLS: i32 = 3;

#[derive(Debug, Clone)]
pub struct UiOutcome {
    pub settings: Settings,
}

#[derive(Debug, Default, Clone)]
struct PickerPanel {
    open: bool,
    input: String,
    error: Option<String>,
}

pub struct Ui {
    settings: Settings,
    controller: Controller,
    loader: ContentLoader,
    renderer: Box<dyn DocumentRenderer>,
    reports: Receiver<EngineReport>,
    engine: Engine,
    image_picker: Picker,
    picker_panel: PickerPanel,
    page_view: PageView,
    text_scroll: u16,
    drop_area: Rect,
    notice: Option<String>,
    initial_path: Option<PathBuf>,
    shown_load: Option<LoadTicket>,
}

impl Ui {
    pub fn new(mut settings: Settings, initial_path: Option<PathBuf>) -> Self {
        settings.normalize();
        let (tx, reports) = mpsc::channel();
        Self {
            controller: Controller::new(&settings),
            loader: ContentLoader::new(tx.clone()),
            renderer: Box::new(PdfRenderer::new(tx)),
            reports,
            settings,
            engine: Engine::new(),
            image_picker: Picker::halfblocks(),
            picker_panel: PickerPanel::default(),
            page_view: PageView::default(),
            text_scroll: 0,
            drop_area: Rect::default(),
            notice: None,
            initial_path,
            shown_load: None,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<UiOutcome> {
        let mut terminal = setup_terminal()?;
        self.image_picker = image_protocol::build_picker();
        if let Err(err) = self.engine.check_pdfium() {
            tracing::warn!(error = %err, "page images disabled");
            self.notice = Some("pdfium not found; PDF pages are shown as text".to_string());
        }
        if let Some(path) = self.initial_path.take() {
            self.choose_paths(Source::Picker, vec![path]);
        }
        terminal.clear().ok();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(outcome)), Ok(())) => Ok(outcome),
            (Ok(Ok(_)), Err(err)) => Err(err),
            (Ok(Err(err)), _) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn accent_color(&self) -> Color {
        match self.settings.theme {
            Theme::Light => Color::Blue,
            Theme::Dark => Color::Yellow,
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<UiOutcome> {
        let tick_rate = Duration::from_millis(50);
        let mut needs_redraw = true;

        loop {
            if self.drain_reports() {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                TermEvent::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    let quit = if self.picker_panel.open {
                        self.handle_picker_panel_key(key);
                        false
                    } else {
                        self.handle_key(key)
                    };
                    if quit {
                        return Ok(UiOutcome {
                            settings: self.settings.clone(),
                        });
                    }
                }
                TermEvent::Paste(text) => {
                    needs_redraw = true;
                    self.handle_paste(&text);
                }
                TermEvent::Mouse(mouse) => {
                    let before = self.controller.preview().is_drag_active;
                    self.handle_mouse(mouse);
                    needs_redraw = before != self.controller.preview().is_drag_active
                        || matches!(
                            mouse.kind,
                            MouseEventKind::ScrollDown | MouseEventKind::ScrollUp
                        );
                }
                TermEvent::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
    }

    fn drain_reports(&mut self) -> bool {
        let mut changed = false;
        while let Ok(report) = self.reports.try_recv() {
            tracing::trace!(ticket = %report.ticket(), "engine report");
            self.dispatch(report_event(report));
            changed = true;
        }
        changed
    }

    fn dispatch(&mut self, event: Event) {
        for command in self.controller.dispatch(event) {
            match command {
                Command::Read { ticket, document } => self.loader.spawn_read(ticket, document),
                Command::Open { ticket, bytes } => self.renderer.open(ticket, bytes),
            }
        }

        // A retry commits new bytes for the same document under a new ticket.
        let shown = self
            .controller
            .preview()
            .content
            .as_ref()
            .map(|c| c.ticket);
        if shown != self.shown_load {
            self.shown_load = shown;
            self.page_view.reset();
            self.text_scroll = 0;
        }
    }

    fn choose_paths(&mut self, source: Source, paths: Vec<PathBuf>) {
        if paths.len() > 1 {
            self.notice = Some(format!(
                "{} files received; previewing the first",
                paths.len()
            ));
        }
        let files = paths.iter().map(|path| inspect_path(path)).collect();
        self.dispatch(Event::FilesChosen { source, files });
    }

    /// Returns `true` when the UI should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('c') = key.code
        {
            return true;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('o') => self.open_picker_panel(),
            KeyCode::Char('r') => {
                if self.controller.preview().loading.is_busy() {
                    self.notice = Some("still loading".to_string());
                }
                self.dispatch(Event::Retry);
            }
            KeyCode::Char('t') => {
                self.settings.cycle_theme();
                self.notice = Some(format!("theme: {}", self.settings.theme));
            }
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char('n') => self.change_page(1),
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('p') => self.change_page(-1),
            KeyCode::Home | KeyCode::Char('g') => self.change_page(i64::MIN),
            KeyCode::End | KeyCode::Char('G') => self.change_page(i64::MAX),
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(Event::ZoomIn),
            KeyCode::Char('-') => self.zoom(Event::ZoomOut),
            KeyCode::Char('0') => self.zoom(Event::ZoomReset),
            KeyCode::Down | KeyCode::Char('j') => self.scroll(1, 0),
            KeyCode::Up | KeyCode::Char('k') => self.scroll(-1, 0),
            KeyCode::Char('l') => self.scroll(0, 1),
            KeyCode::Char('h') => self.scroll(0, -1),
            _ => {}
        }
        false
    }

    fn change_page(&mut self, offset: i64) {
        let before = self.controller.preview().current_page;
        self.dispatch(Event::ChangePage(offset));
        if self.controller.preview().current_page != before {
            self.page_view.reset_pan();
        }
    }

    fn zoom(&mut self, event: Event) {
        self.dispatch(event);
        self.notice = Some(format!(
            "zoom: {}%",
            self.controller.preview().zoom.percent()
        ));
    }

    fn scroll(&mut self, rows: i32, cols: i32) {
        let preview = self.controller.preview();
        if preview.text_content().is_some() {
            self.text_scroll = if rows >= 0 {
                self.text_scroll.saturating_add(TEXT_SCROLL_STEP)
            } else {
                self.text_scroll.saturating_sub(TEXT_SCROLL_STEP)
            };
        } else if preview.binary_content().is_some() {
            let (font_w, font_h) = self.image_picker.font_size();
            self.page_view.pan_by(
                cols * PAN_STEP_CELLS * i32::from(font_w.max(1)),
                rows * PAN_STEP_CELLS * i32::from(font_h.max(1)),
            );
        }
    }

    fn open_picker_panel(&mut self) {
        self.picker_panel.open = true;
        self.picker_panel.error = None;
        if self.picker_panel.input.is_empty()
            && let Some(dir) = self.settings.start_dir.as_deref()
        {
            self.picker_panel.input = format!("{}/", dir.trim_end_matches('/'));
        }
    }

    fn handle_picker_panel_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && let KeyCode::Char('u') = key.code
        {
            self.picker_panel.input.clear();
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.picker_panel.open = false;
                self.picker_panel.error = None;
            }
            KeyCode::Enter => self.submit_picker_panel(),
            KeyCode::Backspace => {
                self.picker_panel.input.pop();
            }
            KeyCode::Char(ch) => {
                if !ch.is_control() {
                    self.picker_panel.input.push(ch);
                }
            }
            _ => {}
        }
    }

    fn submit_picker_panel(&mut self) {
        let input = self.picker_panel.input.trim();
        if input.is_empty() {
            self.picker_panel.error = Some("Enter a file path".to_string());
            return;
        }

        let home = std::env::var_os("HOME").map(PathBuf::from);
        let path = resolve_input_path(input, self.settings.start_dir.as_deref(), home.as_deref());
        if !path.is_file() {
            self.picker_panel.error = Some(format!("Not a file: {}", path.display()));
            return;
        }

        self.picker_panel.open = false;
        self.picker_panel.error = None;
        self.picker_panel.input.clear();
        self.choose_paths(Source::Picker, vec![path]);
    }

    fn handle_paste(&mut self, text: &str) {
        if self.picker_panel.open {
            let line = text.lines().next().unwrap_or_default();
            self.picker_panel.input.push_str(line.trim());
            return;
        }

        let paths = drop::parse_dropped_paths(text)
            .into_iter()
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        tracing::debug!(count = paths.len(), "paths dropped");
        self.choose_paths(Source::Drop, paths);
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let inside = rect_contains(self.drop_area, mouse.column, mouse.row);
        let active = self.controller.preview().is_drag_active;
        match mouse.kind {
            MouseEventKind::Drag(_) if inside && !active => self.dispatch(Event::DragEnter),
            MouseEventKind::Drag(_) if !inside && active => self.dispatch(Event::DragLeave),
            MouseEventKind::Up(_) if active => self.dispatch(Event::DragLeave),
            MouseEventKind::ScrollDown if inside => self.scroll(1, 0),
            MouseEventKind::ScrollUp if inside => self.scroll(-1, 0),
            _ => {}
        }
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(area);

        self.draw_header(layout[0], frame);
        self.draw_preview(layout[1], frame);
        self.draw_status(layout[2], frame);

        if self.picker_panel.open {
            self.draw_picker_panel(area, frame);
        }
    }

    fn draw_header(&self, area: Rect, frame: &mut ratatui::Frame) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let title = Line::from(vec![
            Span::styled("Resume Scanner", bold.fg(self.accent_color())),
            Span::raw("  "),
            Span::styled(
                format!("accepts {}", self.settings.accept_hint()),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        let keys = Line::from(Span::styled(
            "o open · drop a file · ←/→ page · +/-/0 zoom · r retry · t theme · q quit",
            Style::default().fg(Color::DarkGray),
        ));
        let header = Paragraph::new(Text::from(vec![title, keys]))
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, area);
    }

    fn draw_preview(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        self.drop_area = area;
        let preview = self.controller.preview();

        let mut block = Block::default().borders(Borders::ALL);
        block = if preview.is_drag_active {
            block
                .border_style(
                    Style::default()
                        .fg(self.accent_color())
                        .add_modifier(Modifier::BOLD),
                )
                .title(" Drop to preview ")
        } else {
            block.title(self.preview_title(area.width.saturating_sub(4) as usize))
        };
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if let Some(text) = preview.text_content() {
            let paragraph = Paragraph::new(text)
                .wrap(Wrap { trim: false })
                .scroll((self.text_scroll, 0));
            frame.render_widget(paragraph, inner);
            return;
        }

        if preview.binary_content().is_some()
            && let Some(request) = self.controller.render_request()
        {
            self.page_view.ensure_rendered(
                &request,
                &self.engine,
                &self.image_picker,
                inner.width,
                inner.height,
            );
            self.page_view.draw(inner, frame);
            return;
        }

        let paragraph = Paragraph::new(Text::from(self.placeholder_lines()))
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center);
        let top = inner.height.saturating_sub(4) / 2;
        let body = Rect::new(
            inner.x,
            inner.y + top,
            inner.width,
            inner.height.saturating_sub(top),
        );
        frame.render_widget(paragraph, body);
    }

    fn preview_title(&self, max_width: usize) -> String {
        let preview = self.controller.preview();
        let Some(content) = preview.content.as_ref() else {
            return " Preview ".to_string();
        };
        let title = match preview.total_pages {
            Some(total) if preview.binary_content().is_some() => format!(
                "{} · p{}/{} · {} {}%",
                content.name,
                preview.current_page,
                total,
                image_protocol::protocol_label(&self.image_picker),
                preview.zoom.percent()
            ),
            _ => content.name.clone(),
        };
        format!(" {} ", truncate_to_width(&title, max_width))
    }

    fn placeholder_lines(&self) -> Vec<Line<'static>> {
        let preview = self.controller.preview();
        let name = self
            .controller
            .document()
            .map(|doc| doc.name.clone())
            .unwrap_or_default();
        let dim = Style::default().fg(Color::DarkGray);

        let mut lines = match preview.loading {
            Loading::Reading => vec![Line::raw(format!("Reading {name}…"))],
            Loading::Rendering => vec![Line::raw(format!("Opening {name}…"))],
            Loading::Idle => vec![
                Line::styled(
                    "Drop a resume here or press o to choose a file",
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Line::styled(format!("accepted: {}", self.settings.accept_hint()), dim),
            ],
        };

        if let Some(err) = preview.error.as_ref() {
            lines.push(Line::raw(""));
            lines.push(Line::styled(err.to_string(), Style::default().fg(Color::Red)));
            lines.push(Line::styled("press r to retry or o to pick another file", dim));
        }
        lines
    }

    fn draw_status(&self, area: Rect, frame: &mut ratatui::Frame) {
        let preview = self.controller.preview();
        let dim = Style::default().fg(Color::DarkGray);
        let mut spans = Vec::new();

        if let Some(doc) = self.controller.document() {
            spans.push(Span::styled(
                truncate_to_width(&doc.name, 32),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!(" {} · {}", doc.mode, human_size(doc.size_bytes)),
                dim,
            ));
        } else {
            spans.push(Span::styled("no file", dim));
        }

        if let Some(total) = preview.total_pages {
            spans.push(Span::raw(format!(
                " · page {}/{total}",
                preview.current_page
            )));
        }
        spans.push(Span::raw(format!(" · zoom {}%", preview.zoom.percent())));

        if preview.loading.is_busy() {
            spans.push(Span::styled(
                format!(" · {}", preview.loading.as_str()),
                Style::default().fg(self.accent_color()),
            ));
        }
        if let Some(err) = preview.error.as_ref() {
            spans.push(Span::styled(
                format!(" · {}: {err}", err.kind().as_str()),
                Style::default().fg(Color::Red),
            ));
        } else if let Some(notice) = self.notice.as_deref() {
            spans.push(Span::styled(format!(" · {notice}"), dim));
        }

        let status = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::TOP));
        frame.render_widget(status, area);
    }

    fn draw_picker_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Open File",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let dim = Style::default().fg(Color::DarkGray);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Path: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.picker_panel.input.clone()),
                Span::styled("▏", Style::default().fg(self.accent_color())),
            ]),
            Line::styled(format!("accepted: {}", self.settings.accept_hint()), dim),
        ];
        if let Some(err) = self.picker_panel.error.as_deref() {
            lines.push(Line::styled(err.to_string(), Style::default().fg(Color::Red)));
        }
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            "Enter open · Esc cancel · Ctrl-U clear · paste a path",
            dim,
        ));

        frame.render_widget(Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }), inner);
    }
}

/// Maps a background engine report to the controller event it completes.
pub fn report_event(report: EngineReport) -> Event {
    match report {
        EngineReport::Read { ticket, result } => Event::ReadCompleted { ticket, result },
        EngineReport::Opened {
            ticket,
            result: Ok(total_pages),
        } => Event::RendererLoaded {
            ticket,
            total_pages,
        },
        EngineReport::Opened {
            ticket,
            result: Err(message),
        } => Event::RendererFailed { ticket, message },
    }
}

/// `~/` expands to `home`; other relative paths resolve against `start_dir`
/// when one is configured, else against the working directory.
fn resolve_input_path(input: &str, start_dir: Option<&str>, home: Option<&Path>) -> PathBuf {
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home
    {
        return home.join(rest);
    }

    let path = PathBuf::from(input);
    match start_dir {
        Some(dir) if path.is_relative() => Path::new(dir).join(path),
        _ => path,
    }
}

fn rect_contains(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x
        && row >= rect.y
        && column < rect.x.saturating_add(rect.width)
        && row < rect.y.saturating_add(rect.height)
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for ch in s.chars() {
        let mut buf = [0u8; 4];
        let w = UnicodeWidthStr::width(&*ch.encode_utf8(&mut buf));
        if width + w + 1 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )
    .context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableMouseCapture,
        LeaveAlternateScreen
    )
    .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
