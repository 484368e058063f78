use std::collections::VecDeque;
use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::widgets::{Paragraph, Wrap};
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;
use ratatui_image::{Image as ImageWidget, Resize};
use scanner_application::RenderRequest;
use scanner_core::LoadTicket;
use scanner_engine::Engine;

const PAGE_CACHE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageRenderKey {
    page_index: u32,
    zoom_percent: u16,
    width: u16,
    height: u16,
    pan_x_px: u32,
    pan_y_px: u32,
    font_size: (u16, u16),
}

#[derive(Clone)]
struct CachedPageImage {
    page_index: u32,
    zoom_percent: u16,
    image: Arc<image::DynamicImage>,
}

/// Rasterized view of the current page of a binary document, with a small
/// cache of recently drawn pages and a pixel pan offset. Everything is
/// keyed to the load that produced the bytes.
#[derive(Default)]
pub(crate) struct PageView {
    load: Option<LoadTicket>,
    key: Option<PageRenderKey>,
    image: Option<ImageProtocol>,
    fallback_text: Option<String>,
    cache: VecDeque<CachedPageImage>,
    pan_x_px: u32,
    pan_y_px: u32,
}

impl PageView {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn reset_pan(&mut self) {
        self.pan_x_px = 0;
        self.pan_y_px = 0;
    }

    pub(crate) fn pan_by(&mut self, dx_px: i32, dy_px: i32) {
        self.pan_x_px = add_signed_u32(self.pan_x_px, dx_px);
        self.pan_y_px = add_signed_u32(self.pan_y_px, dy_px);
    }

    #[cfg(test)]
    pub(crate) fn pan(&self) -> (u32, u32) {
        (self.pan_x_px, self.pan_y_px)
    }

    /// Drops pages and pan left over from a different load, including an
    /// earlier read of the same document.
    fn bind_load(&mut self, ticket: LoadTicket) {
        if self.load != Some(ticket) {
            self.reset();
            self.load = Some(ticket);
        }
    }

    pub(crate) fn ensure_rendered(
        &mut self,
        request: &RenderRequest,
        engine: &Engine,
        picker: &Picker,
        width: u16,
        height: u16,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        self.bind_load(request.ticket);

        let (font_w_px, font_h_px) = picker.font_size();
        let font_size = (font_w_px.max(1), font_h_px.max(1));
        let key = PageRenderKey {
            page_index: request.page_index,
            zoom_percent: request.zoom_percent,
            width,
            height,
            pan_x_px: self.pan_x_px,
            pan_y_px: self.pan_y_px,
            font_size,
        };
        if self.key == Some(key) && (self.image.is_some() || self.fallback_text.is_some()) {
            return;
        }
        self.key = Some(key);
        self.image = None;
        self.fallback_text = None;

        let page = match self.cached_page(request.page_index, request.zoom_percent) {
            Some(image) => image,
            None => {
                let scale = f32::from(request.zoom_percent) / 100.0;
                match render_page_image(engine, &request.bytes, request.page_index, scale) {
                    Ok(image) => {
                        let image = Arc::new(image);
                        self.cache_page_image(CachedPageImage {
                            page_index: request.page_index,
                            zoom_percent: request.zoom_percent,
                            image: image.clone(),
                        });
                        image
                    }
                    Err(err) => {
                        tracing::debug!(
                            page = request.page_index,
                            error = %err,
                            "page rasterize failed, falling back to text"
                        );
                        let text = engine
                            .page_text(&request.bytes, request.page_index)
                            .ok()
                            .filter(|text| !text.is_empty())
                            .unwrap_or_else(|| "no text found".to_string());
                        self.fallback_text =
                            Some(format!("(page image unavailable; showing text)\n\n{text}"));
                        return;
                    }
                }
            }
        };

        let viewport_w_px = u32::from(width).saturating_mul(u32::from(font_size.0));
        let viewport_h_px = u32::from(height).saturating_mul(u32::from(font_size.1));
        let (view, pan_x_px, pan_y_px) =
            build_viewport_image(&page, viewport_w_px, viewport_h_px, self.pan_x_px, self.pan_y_px);
        self.pan_x_px = pan_x_px;
        self.pan_y_px = pan_y_px;
        self.key = Some(PageRenderKey {
            pan_x_px,
            pan_y_px,
            ..key
        });

        match picker.new_protocol(view, Rect::new(0, 0, width, height), Resize::Fit(None)) {
            Ok(protocol) => self.image = Some(protocol),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode page image");
                self.fallback_text = Some(format!("(could not encode page image: {err})"));
            }
        }
    }

    pub(crate) fn draw(&self, inner: Rect, frame: &mut ratatui::Frame) {
        if let Some(protocol) = self.image.as_ref() {
            let proto_area = protocol.area();
            let draw_width = proto_area.width.min(inner.width);
            let draw_height = proto_area.height.min(inner.height);
            let draw_area = Rect::new(
                inner.x + inner.width.saturating_sub(draw_width) / 2,
                inner.y + inner.height.saturating_sub(draw_height) / 2,
                draw_width,
                draw_height,
            );
            frame.render_widget(ImageWidget::new(protocol), draw_area);
        } else if let Some(text) = self.fallback_text.as_deref() {
            frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }), inner);
        }
    }

    fn cached_page(&mut self, page_index: u32, zoom_percent: u16) -> Option<Arc<image::DynamicImage>> {
        let pos = self
            .cache
            .iter()
            .position(|c| c.page_index == page_index && c.zoom_percent == zoom_percent)?;
        let cached = self.cache.remove(pos)?;
        let image = cached.image.clone();
        self.cache.push_front(cached);
        Some(image)
    }

    fn cache_page_image(&mut self, image: CachedPageImage) {
        self.cache
            .retain(|c| !(c.page_index == image.page_index && c.zoom_percent == image.zoom_percent));
        self.cache.push_front(image);
        self.cache.truncate(PAGE_CACHE_LEN);
    }
}

fn render_page_image(
    engine: &Engine,
    bytes: &[u8],
    page_index: u32,
    scale: f32,
) -> anyhow::Result<image::DynamicImage> {
    let bitmap = engine.render_page_bitmap_rgba(bytes, page_index, scale)?;
    let image =
        image::RgbaImage::from_raw(bitmap.width as u32, bitmap.height as u32, bitmap.pixels)
            .ok_or_else(|| anyhow::anyhow!("invalid RGBA pixel buffer from pdfium"))?;
    Ok(image::DynamicImage::ImageRgba8(image))
}

fn add_signed_u32(value: u32, delta: i32) -> u32 {
    if delta >= 0 {
        value.saturating_add(delta as u32)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// Crops `full` to the viewport at the given pan, centering pages smaller
/// than the viewport on white. Returns the pan actually applied.
fn build_viewport_image(
    full: &image::DynamicImage,
    viewport_w_px: u32,
    viewport_h_px: u32,
    pan_x_px: u32,
    pan_y_px: u32,
) -> (image::DynamicImage, u32, u32) {
    let viewport_w_px = viewport_w_px.max(1);
    let viewport_h_px = viewport_h_px.max(1);
    let img_w = full.width();
    let img_h = full.height();

    let pan_x_px = pan_x_px.min(img_w.saturating_sub(viewport_w_px));
    let pan_y_px = pan_y_px.min(img_h.saturating_sub(viewport_h_px));

    let mut viewport: image::DynamicImage = image::ImageBuffer::from_pixel(
        viewport_w_px,
        viewport_h_px,
        image::Rgba([255u8, 255u8, 255u8, 255u8]),
    )
    .into();

    let crop_w = viewport_w_px.min(img_w.saturating_sub(pan_x_px));
    let crop_h = viewport_h_px.min(img_h.saturating_sub(pan_y_px));
    if crop_w > 0 && crop_h > 0 {
        let region = full.crop_imm(pan_x_px, pan_y_px, crop_w, crop_h);
        let dest_x = i64::from(viewport_w_px.saturating_sub(img_w) / 2);
        let dest_y = i64::from(viewport_h_px.saturating_sub(img_h) / 2);
        image::imageops::overlay(&mut viewport, &region, dest_x, dest_y);
    }

    (viewport, pan_x_px, pan_y_px)
}
