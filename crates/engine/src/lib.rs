//! Document engine: background content loading, page counting and page
//! rasterizing for previewed files.

use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};

use pdf::content::{Op, TextDrawAdjusted};
use pdf::file::FileOptions;
use pdfium_render::prelude::{PdfBitmapFormat, PdfRenderConfig, Pdfium};

mod loader;
mod renderer;

pub use loader::{ContentLoader, inspect_path, read_document};
pub use renderer::{DocumentRenderer, PdfRenderer, count_pages};

use scanner_core::{Content, LoadTicket, PreviewError};

/// Results of background work, delivered over the engine's report channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReport {
    Read {
        ticket: LoadTicket,
        result: Result<Content, PreviewError>,
    },
    Opened {
        ticket: LoadTicket,
        result: Result<u32, String>,
    },
}

impl EngineReport {
    pub fn ticket(&self) -> LoadTicket {
        match self {
            EngineReport::Read { ticket, .. } | EngineReport::Opened { ticket, .. } => *ticket,
        }
    }
}

const TJ_INSERT_SPACE_THRESHOLD: f32 = -200.0;
const MAX_RENDER_WIDTH_PX: i32 = 8192;

/// Rasterizes pages on the UI thread. Pdfium is bound lazily on first use
/// and the outcome of binding is remembered.
#[derive(Debug, Default)]
pub struct Engine {
    pdfium: RefCell<PdfiumState>,
}

#[derive(Debug, Default)]
enum PdfiumState {
    #[default]
    Uninitialized,
    Available(Pdfium),
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct RgbaBitmap {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_pdfium(&self) -> anyhow::Result<()> {
        let _ = self.pdfium()?;
        Ok(())
    }

    /// Draws one page at `scale` (1.0 = one pixel per PDF point), capped to
    /// a sane bitmap width.
    pub fn render_page_bitmap_rgba(
        &self,
        bytes: &[u8],
        page_index: u32,
        scale: f32,
    ) -> anyhow::Result<RgbaBitmap> {
        if self.pdfium_disabled() {
            anyhow::bail!("pdfium disabled via SCANNER_DISABLE_PDFIUM");
        }

        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|err| anyhow::anyhow!(err))?;

        let page_index =
            u16::try_from(page_index).map_err(|_| anyhow::anyhow!("page index out of range"))?;
        let page = document
            .pages()
            .get(page_index)
            .map_err(|err| anyhow::anyhow!(err))?;

        let target_width = (page.width().value * scale.max(0.01)).round() as i32;
        let target_width = target_width.clamp(1, MAX_RENDER_WIDTH_PX);

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_maximum_width(target_width)
            .render_form_data(false)
            .render_annotations(false)
            .use_grayscale_rendering(false)
            .set_reverse_byte_order(false)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|err| anyhow::anyhow!(err))?;

        let width = bitmap.width().max(0) as usize;
        let height = bitmap.height().max(0) as usize;
        let src_pixels = bitmap.as_raw_bytes();
        Ok(bgra_to_rgba(&src_pixels, width, height))
    }

    /// Plain text of one page, used when the page cannot be rasterized.
    pub fn page_text(&self, bytes: &[u8], page_index: u32) -> anyhow::Result<String> {
        let file = FileOptions::cached().load(bytes.to_vec())?;
        let resolver = file.resolver();
        let page = file.get_page(page_index)?;
        let Some(content) = &page.contents else {
            return Ok(String::new());
        };
        let ops = content.operations(&resolver)?;
        Ok(ops_to_text(&ops).trim().to_string())
    }

    fn pdfium(&self) -> anyhow::Result<Ref<'_, Pdfium>> {
        let init_error = {
            let mut state = self.pdfium.borrow_mut();
            match &*state {
                PdfiumState::Available(_) => None,
                PdfiumState::Unavailable(err) => Some(err.clone()),
                PdfiumState::Uninitialized => match bind_pdfium() {
                    Ok(pdfium) => {
                        *state = PdfiumState::Available(pdfium);
                        None
                    }
                    Err(err) => {
                        let msg = err.to_string();
                        tracing::warn!(error = %msg, "pdfium unavailable, pages fall back to text");
                        *state = PdfiumState::Unavailable(msg.clone());
                        Some(msg)
                    }
                },
            }
        };

        if let Some(err) = init_error {
            return Err(anyhow::anyhow!(err));
        }

        let state = self.pdfium.borrow();
        match &*state {
            PdfiumState::Available(_) => Ok(Ref::map(state, |state| match state {
                PdfiumState::Available(pdfium) => pdfium,
                _ => unreachable!("pdfium state checked above"),
            })),
            PdfiumState::Unavailable(err) => Err(anyhow::anyhow!(err.clone())),
            PdfiumState::Uninitialized => unreachable!("pdfium state initialized above"),
        }
    }

    fn pdfium_disabled(&self) -> bool {
        std::env::var("SCANNER_DISABLE_PDFIUM")
            .map(|v| !v.trim().is_empty() && v.trim() != "0")
            .unwrap_or(false)
    }
}

fn bind_pdfium() -> anyhow::Result<Pdfium> {
    if let Ok(path) = std::env::var("SCANNER_PDFIUM_LIB_PATH") {
        let path = PathBuf::from(path);
        let bindings = Pdfium::bind_to_library(&path).map_err(|err| {
            anyhow::anyhow!(
                "{err}\n\nFailed to load Pdfium from SCANNER_PDFIUM_LIB_PATH={}.",
                path.display()
            )
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
        ".pdfium",
    )));

    for path in candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|err| {
        let lib_name = Pdfium::pdfium_platform_library_name();
        anyhow::anyhow!(
            "{err}\n\nPdfium library not found. Install it system-wide or place {} next to the executable.",
            lib_name.to_string_lossy()
        )
    })?;

    Ok(Pdfium::new(bindings))
}

fn bgra_to_rgba(src_pixels: &[u8], width: usize, height: usize) -> RgbaBitmap {
    let src_stride = if height == 0 {
        0
    } else {
        src_pixels.len() / height
    };

    let mut pixels = Vec::with_capacity(width.saturating_mul(height).saturating_mul(4));
    for y in 0..height {
        let base = y.saturating_mul(src_stride);
        for x in 0..width {
            let idx = base.saturating_add(x.saturating_mul(4));
            let b = src_pixels.get(idx).copied().unwrap_or(255);
            let g = src_pixels.get(idx + 1).copied().unwrap_or(255);
            let r = src_pixels.get(idx + 2).copied().unwrap_or(255);
            let a = src_pixels.get(idx + 3).copied().unwrap_or(255);
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    RgbaBitmap {
        width,
        height,
        stride: width.saturating_mul(4),
        pixels,
    }
}

fn ops_to_text(ops: &[Op]) -> String {
    let mut out = String::new();
    let mut pending_space = false;

    for op in ops {
        match op {
            Op::TextDraw { text } => {
                append_text_piece(&mut out, &text.to_string_lossy(), &mut pending_space);
            }
            Op::TextDrawAdjusted { array } => {
                for item in array {
                    match item {
                        TextDrawAdjusted::Text(text) => {
                            append_text_piece(
                                &mut out,
                                &text.to_string_lossy(),
                                &mut pending_space,
                            );
                        }
                        TextDrawAdjusted::Spacing(spacing) => {
                            if *spacing <= TJ_INSERT_SPACE_THRESHOLD {
                                pending_space = true;
                            }
                        }
                    }
                }
            }
            Op::TextNewline => {
                out.push('\n');
                pending_space = false;
            }
            Op::MoveTextPosition { translation } if translation.y < 0.0 => {
                out.push('\n');
                pending_space = false;
            }
            _ => {}
        }
    }

    out
}

fn append_text_piece(out: &mut String, s: &str, pending_space: &mut bool) {
    let cleaned: String = s
        .chars()
        .filter_map(|ch| match ch {
            '\r' => Some('\n'),
            '\n' | '\t' => Some(ch),
            '\u{FFFD}' => None,
            _ if ch.is_control() => None,
            _ => Some(ch),
        })
        .collect();
    if cleaned.is_empty() {
        return;
    }

    if *pending_space {
        let punctuation = cleaned
            .chars()
            .next()
            .is_some_and(|ch| matches!(ch, ',' | '.' | ';' | ':' | '!' | '?' | ')'));
        if !out.is_empty() && !punctuation && !out.ends_with([' ', '\n', '\t']) {
            out.push(' ');
        }
        *pending_space = false;
    }
    out.push_str(&cleaned);
}
