use pdf_engine::DocumentHandle;

pub const ZOOM_STEP: f32 = 1.25;
pub const MIN_ZOOM_FACTOR: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ZoomMode {
    #[default]
    FitWidth,
    Custom,
}

/// The pane that draws the current document.
///
/// Scroll positions are integer slider units in `[0, scroll_maximum()]`, the
/// same units the status line works in.
pub trait RenderSurface {
    fn set_document(&mut self, handle: DocumentHandle, page_count: u32);
    fn clear_document(&mut self);
    fn document(&self) -> Option<DocumentHandle>;

    fn scroll_value(&self) -> u32;
    fn scroll_maximum(&self) -> u32;
    fn set_scroll_value(&mut self, value: u32);

    fn zoom_mode(&self) -> ZoomMode;
    fn set_zoom_mode(&mut self, mode: ZoomMode);
    fn zoom_factor(&self) -> f32;
    fn set_zoom_factor(&mut self, factor: f32);

    /// Scrolls straight to a 0-based page. Surfaces without page addressing
    /// return `false` and the caller falls back to a scroll fraction.
    fn jump_to_page(&mut self, _page_index: u32) -> bool {
        false
    }
}

pub fn zoom_in<S: RenderSurface + ?Sized>(surface: &mut S) {
    let factor = surface.zoom_factor() * ZOOM_STEP;
    surface.set_zoom_mode(ZoomMode::Custom);
    surface.set_zoom_factor(factor);
}

pub fn zoom_out<S: RenderSurface + ?Sized>(surface: &mut S) {
    let factor = (surface.zoom_factor() / ZOOM_STEP).max(MIN_ZOOM_FACTOR);
    surface.set_zoom_mode(ZoomMode::Custom);
    surface.set_zoom_factor(factor);
}

/// Headless continuous layout: equal-height pages separated by a fixed gap,
/// scaled by the zoom factor in custom mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub page_extent_px: f32,
    pub page_spacing_px: f32,
    pub viewport_height_px: f32,
    /// Whether `jump_to_page` addresses pages directly.
    pub direct_jump: bool,
    document: Option<DocumentHandle>,
    page_count: u32,
    zoom_mode: ZoomMode,
    zoom_factor: f32,
    scroll_value: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            page_extent_px: 1000.0,
            page_spacing_px: 16.0,
            viewport_height_px: 800.0,
            direct_jump: false,
            document: None,
            page_count: 0,
            zoom_mode: ZoomMode::FitWidth,
            zoom_factor: 1.0,
            scroll_value: 0,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direct_jump(mut self) -> Self {
        self.direct_jump = true;
        self
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    fn scale(&self) -> f32 {
        match self.zoom_mode {
            ZoomMode::FitWidth => 1.0,
            ZoomMode::Custom => self.zoom_factor,
        }
    }

    fn content_height(&self) -> f32 {
        if self.page_count == 0 {
            return 0.0;
        }

        let pages = self.page_count as f32;
        (pages * self.page_extent_px + (pages - 1.0) * self.page_spacing_px) * self.scale()
    }

    fn page_start_offset(&self, page_index: u32) -> f32 {
        page_index as f32 * (self.page_extent_px + self.page_spacing_px) * self.scale()
    }

    fn clamp_scroll(&mut self) {
        self.scroll_value = self.scroll_value.min(self.scroll_maximum());
    }
}

impl RenderSurface for Viewport {
    fn set_document(&mut self, handle: DocumentHandle, page_count: u32) {
        self.document = Some(handle);
        self.page_count = page_count;
        self.clamp_scroll();
    }

    fn clear_document(&mut self) {
        self.document = None;
        self.page_count = 0;
        self.scroll_value = 0;
    }

    fn document(&self) -> Option<DocumentHandle> {
        self.document
    }

    fn scroll_value(&self) -> u32 {
        self.scroll_value
    }

    fn scroll_maximum(&self) -> u32 {
        (self.content_height() - self.viewport_height_px).max(0.0).round() as u32
    }

    fn set_scroll_value(&mut self, value: u32) {
        self.scroll_value = value.min(self.scroll_maximum());
    }

    fn zoom_mode(&self) -> ZoomMode {
        self.zoom_mode
    }

    fn set_zoom_mode(&mut self, mode: ZoomMode) {
        self.zoom_mode = mode;
        self.clamp_scroll();
    }

    fn zoom_factor(&self) -> f32 {
        self.zoom_factor
    }

    fn set_zoom_factor(&mut self, factor: f32) {
        self.zoom_factor = factor.max(MIN_ZOOM_FACTOR);
        self.clamp_scroll();
    }

    fn jump_to_page(&mut self, page_index: u32) -> bool {
        if !self.direct_jump || self.document.is_none() {
            return false;
        }

        let page_index = page_index.min(self.page_count.saturating_sub(1));
        self.set_scroll_value(self.page_start_offset(page_index).round() as u32);
        true
    }
}
