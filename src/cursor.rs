//! Cursor image store
//!
//! The pointer shows exactly one [`CursorImage`] at a time: nothing, a fixed bitmap
//! (named shapes, server-side cursors), or a client surface committed with the cursor
//! role. Images are replaced as a whole, never edited in place.
//!
//! Named shapes come from a [`CursorShapeProvider`]. [`FallbackCursors`] draws a
//! small procedural set so a compositor without a cursor theme still has a default
//! arrow and a kill-mode crosshair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cursor_icon::CursorIcon;
use smithay::utils::{Buffer, Logical, Point, Size};

use crate::scene::{Scene, SurfaceHandle};

/// Premultiplied ARGB8888 pixels (B, G, R, A in memory), tightly packed.
#[derive(Clone, PartialEq)]
pub struct CursorBitmap {
    pub pixels: Vec<u8>,
    pub size: Size<i32, Buffer>,
    pub hotspot: Point<i32, Buffer>,
    /// Buffer pixels per logical pixel.
    pub scale: f64,
}

impl std::fmt::Debug for CursorBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorBitmap")
            .field("size", &self.size)
            .field("hotspot", &self.hotspot)
            .field("scale", &self.scale)
            .finish()
    }
}

impl CursorBitmap {
    pub fn new(
        pixels: Vec<u8>,
        size: impl Into<Size<i32, Buffer>>,
        hotspot: impl Into<Point<i32, Buffer>>,
        scale: f64,
    ) -> Self {
        Self {
            pixels,
            size: size.into(),
            hotspot: hotspot.into(),
            scale,
        }
    }

    /// Single-color opaque bitmap.
    pub fn solid(size: impl Into<Size<i32, Buffer>>, bgra: [u8; 4], scale: f64) -> Self {
        let size = size.into();
        let count = (size.w.max(0) * size.h.max(0)) as usize;
        Self::new(bgra.repeat(count), size, (0, 0), scale)
    }

    pub fn view(&self) -> CursorView<'_> {
        CursorView {
            pixels: &self.pixels,
            size: self.size,
            scale: self.scale,
            hotspot: (
                self.hotspot.x as f64 / self.scale,
                self.hotspot.y as f64 / self.scale,
            )
                .into(),
        }
    }
}

/// The active cursor representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CursorImage {
    /// Hidden cursor.
    #[default]
    None,
    Bitmap(Rc<CursorBitmap>),
    /// A client surface with the cursor role; `hotspot` is surface-local.
    Surface {
        surface: SurfaceHandle,
        hotspot: Point<i32, Logical>,
    },
}

impl CursorImage {
    pub fn is_none(&self) -> bool {
        matches!(self, CursorImage::None)
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        match self {
            CursorImage::Surface { surface, .. } => Some(*surface),
            _ => None,
        }
    }

    /// Pixels to display right now, `None` when there is nothing to draw.
    pub fn view<'a>(&'a self, scene: &'a Scene) -> Option<CursorView<'a>> {
        match self {
            CursorImage::None => None,
            CursorImage::Bitmap(bitmap) => Some(bitmap.view()),
            CursorImage::Surface { surface, hotspot } => {
                let buffer = scene.surface(*surface)?.buffer.as_ref()?;
                Some(CursorView {
                    pixels: &buffer.pixels,
                    size: buffer.size,
                    scale: buffer.scale,
                    hotspot: hotspot.to_f64(),
                })
            }
        }
    }
}

/// Borrowed pixels of whatever the cursor currently shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorView<'a> {
    pub pixels: &'a [u8],
    pub size: Size<i32, Buffer>,
    pub scale: f64,
    /// Hotspot in logical pixels from the top-left corner.
    pub hotspot: Point<f64, Logical>,
}

impl CursorView<'_> {
    pub fn logical_size(&self) -> Size<f64, Logical> {
        (self.size.w as f64 / self.scale, self.size.h as f64 / self.scale).into()
    }

    /// Premultiplied BGRA of one pixel; transparent outside the bitmap.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if x < 0 || y < 0 || x >= self.size.w || y >= self.size.h {
            return [0; 4];
        }
        let offset = (y as usize * self.size.w as usize + x as usize) * 4;
        match self.pixels.get(offset..offset + 4) {
            Some(bytes) => [bytes[0], bytes[1], bytes[2], bytes[3]],
            None => [0; 4],
        }
    }
}

/// Turns cursor shape names into bitmaps, e.g. from an XCursor theme.
pub trait CursorShapeProvider {
    fn shape(&self, icon: CursorIcon, scale: f64) -> Option<Rc<CursorBitmap>>;
}

/// Nominal logical size of the fallback cursors.
pub const FALLBACK_CURSOR_SIZE: i32 = 24;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Procedurally drawn default, crosshair and resize cursors.
#[derive(Debug, Default)]
pub struct FallbackCursors {
    cache: RefCell<HashMap<(&'static str, u32), Rc<CursorBitmap>>>,
}

impl FallbackCursors {
    pub fn new() -> Self {
        Self::default()
    }

    fn draw(icon: CursorIcon, scale: f64) -> CursorBitmap {
        let side = ((FALLBACK_CURSOR_SIZE as f64 * scale).round() as i32).max(1);
        let s = side as f64;
        let center = (side / 2, side / 2);

        type Shape = Box<dyn Fn(f64, f64) -> bool>;
        let (shape, hotspot): (Shape, (i32, i32)) = match icon {
            CursorIcon::Crosshair => (
                Box::new(move |x, y| (x - s / 2.0).abs() < 1.0 || (y - s / 2.0).abs() < 1.0),
                center,
            ),
            CursorIcon::NResize | CursorIcon::SResize | CursorIcon::NsResize => (
                Box::new(move |x, y| (x - s / 2.0).abs() < 1.5 && y > 1.0 && y < s - 1.0),
                center,
            ),
            CursorIcon::EResize | CursorIcon::WResize | CursorIcon::EwResize => (
                Box::new(move |x, y| (y - s / 2.0).abs() < 1.5 && x > 1.0 && x < s - 1.0),
                center,
            ),
            CursorIcon::NeResize | CursorIcon::SwResize | CursorIcon::NeswResize => (
                Box::new(move |x, y| (x + y - s).abs() < 2.0 && x > 1.0 && x < s - 1.0),
                center,
            ),
            CursorIcon::NwResize | CursorIcon::SeResize | CursorIcon::NwseResize => (
                Box::new(move |x, y| (x - y).abs() < 2.0 && x > 1.0 && x < s - 1.0),
                center,
            ),
            // Everything else gets the left-pointing arrow
            _ => (
                Box::new(move |x, y| {
                    x >= 1.0 && y >= 1.0 && x - 1.0 <= (y - 1.0) * 0.6 && y <= s * 0.8
                }),
                (1, 1),
            ),
        };

        let inside = |x: i32, y: i32| shape(x as f64 + 0.5, y as f64 + 0.5);
        let mut pixels = Vec::with_capacity((side * side * 4) as usize);
        for y in 0..side {
            for x in 0..side {
                let pixel = if !inside(x, y) {
                    [0; 4]
                } else if inside(x - 1, y) && inside(x + 1, y) && inside(x, y - 1) && inside(x, y + 1)
                {
                    WHITE
                } else {
                    BLACK
                };
                pixels.extend_from_slice(&pixel);
            }
        }

        CursorBitmap::new(pixels, (side, side), hotspot, scale)
    }
}

impl CursorShapeProvider for FallbackCursors {
    fn shape(&self, icon: CursorIcon, scale: f64) -> Option<Rc<CursorBitmap>> {
        if !(scale.is_finite() && scale > 0.0) {
            return None;
        }
        let key = (icon.name(), (scale * 100.0).round() as u32);
        let mut cache = self.cache.borrow_mut();
        let bitmap = cache
            .entry(key)
            .or_insert_with(|| Rc::new(Self::draw(icon, scale)));
        Some(bitmap.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_view_hotspot_is_logical() {
        let bitmap = CursorBitmap::new(vec![0; 48 * 48 * 4], (48, 48), (4, 8), 2.0);
        let view = bitmap.view();
        assert_eq!(view.hotspot, Point::from((2.0, 4.0)));
        assert_eq!(view.logical_size(), Size::from((24.0, 24.0)));
    }

    #[test]
    fn test_view_pixel_bounds() {
        let bitmap = CursorBitmap::solid((2, 2), [1, 2, 3, 255], 1.0);
        let view = bitmap.view();
        assert_eq!(view.pixel(1, 1), [1, 2, 3, 255]);
        assert_eq!(view.pixel(2, 0), [0; 4]);
        assert_eq!(view.pixel(-1, 0), [0; 4]);
    }

    #[test]
    fn test_fallback_shapes() {
        let cursors = FallbackCursors::new();

        let arrow = cursors.shape(CursorIcon::Default, 1.0).unwrap();
        assert_eq!(arrow.size, Size::from((24, 24)));
        assert_eq!(arrow.hotspot, Point::from((1, 1)));
        // The tip is drawn, the far corner is transparent
        assert_ne!(arrow.view().pixel(1, 3)[3], 0);
        assert_eq!(arrow.view().pixel(23, 0), [0; 4]);

        let cross = cursors.shape(CursorIcon::Crosshair, 2.0).unwrap();
        assert_eq!(cross.size, Size::from((48, 48)));
        assert_eq!(cross.hotspot, Point::from((24, 24)));

        // Cached per icon and scale
        let again = cursors.shape(CursorIcon::Default, 1.0).unwrap();
        assert!(Rc::ptr_eq(&arrow, &again));
        assert!(cursors.shape(CursorIcon::Default, 0.0).is_none());
    }
}
