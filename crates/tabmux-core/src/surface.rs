//! Contract with the terminal-emulation surface that renders a session.

use crate::session::{Geometry, SessionId};
use crate::settings::Settings;

/// Approximate cell width as a fraction of the font size for monospace faces.
const CELL_WIDTH_RATIO: f32 = 0.6;

/// The rendering side of one tab.
pub trait RenderSurface: Send {
    /// Render bytes produced by the session's process.
    fn write(&mut self, data: &[u8]);

    /// Adopt new visual settings (font, theme, scrollback, cursor).
    fn apply_settings(&mut self, settings: &Settings);

    /// The grid size that fits the surface's current layout, if laid out.
    fn fit(&self) -> Option<Geometry>;

    /// The session's process exited; the surface stays on screen.
    fn exited(&mut self, _code: Option<u32>) {}
}

/// Builds a surface for each new tab.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, id: &SessionId, settings: &Settings) -> Box<dyn RenderSurface>;
}

impl<F> SurfaceFactory for F
where
    F: Fn(&SessionId, &Settings) -> Box<dyn RenderSurface> + Send + Sync,
{
    fn create(&self, id: &SessionId, settings: &Settings) -> Box<dyn RenderSurface> {
        self(id, settings)
    }
}

/// Pixel area available to a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// How many cells fit with the given font settings, at least 1x1.
    pub fn fit(&self, settings: &Settings) -> Geometry {
        let font_size = settings.font_size.max(1) as f32;
        let cell_width = font_size * CELL_WIDTH_RATIO;
        let cell_height = font_size * settings.line_height.max(1.0);

        let cols = (self.width / cell_width).floor().clamp(1.0, u16::MAX as f32) as u16;
        let rows = (self.height / cell_height).floor().clamp(1.0, u16::MAX as f32) as u16;
        Geometry::new(rows, cols)
    }
}
