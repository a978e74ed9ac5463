//! Millimeter sensor space <-> pixel surface space
//!
//! The sensor sits at the bottom-center of the surface looking "up": sensor
//! forward (+y) is surface up (-py). Main view and zone preview each own an
//! independent `CoordinateTransform` value.

/// Default main surface scale (pixels per millimeter)
pub const DEFAULT_SCALE: f64 = 0.1;
/// Default preview surface scale
pub const DEFAULT_PREVIEW_SCALE: f64 = 0.05;
/// Pixels between the sensor origin and the bottom edge of the main surface
pub const DEFAULT_SENSOR_OFFSET: f64 = 50.0;
/// Same for the preview surface
pub const DEFAULT_PREVIEW_SENSOR_OFFSET: f64 = 20.0;

/// Point in sensor space (millimeters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Millimeters {
    pub x: f64,
    pub y: f64,
}

/// Point in surface space (pixels, y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub px: f64,
    pub py: f64,
}

/// Normalized pixel rectangle (top-left corner plus size)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Rectangle spanned by two arbitrary corners
    pub fn from_corners(a: Pixel, b: Pixel) -> Self {
        Self {
            x: a.px.min(b.px),
            y: a.py.min(b.py),
            width: (b.px - a.px).abs(),
            height: (b.py - a.py).abs(),
        }
    }

    pub fn center(&self) -> Pixel {
        Pixel { px: self.x + self.width / 2.0, py: self.y + self.height / 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    scale: f64,
    center_x: f64,
    center_y: f64,
    width: f64,
    height: f64,
}

impl CoordinateTransform {
    pub fn new(width: f64, height: f64, scale: f64, center_x: f64, center_y: f64) -> Self {
        Self { scale, center_x, center_y, width, height }
    }

    /// Sensor placed at bottom-center, `sensor_offset` pixels above the bottom edge
    pub fn bottom_center(width: f64, height: f64, scale: f64, sensor_offset: f64) -> Self {
        Self::new(width, height, scale, width / 2.0, height - sensor_offset)
    }

    /// Main view with the default 0.1 px/mm scale
    pub fn main_view(width: f64, height: f64) -> Self {
        Self::bottom_center(width, height, DEFAULT_SCALE, DEFAULT_SENSOR_OFFSET)
    }

    /// Zone preview with the default 0.05 px/mm scale
    pub fn preview(width: f64, height: f64) -> Self {
        Self::bottom_center(width, height, DEFAULT_PREVIEW_SCALE, DEFAULT_PREVIEW_SENSOR_OFFSET)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn center_x(&self) -> f64 {
        self.center_x
    }

    pub fn center_y(&self) -> f64 {
        self.center_y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Sensor origin in pixel space
    pub fn origin(&self) -> Pixel {
        Pixel { px: self.center_x, py: self.center_y }
    }

    #[inline]
    pub fn to_canvas(&self, mm: Millimeters) -> Pixel {
        Pixel { px: self.center_x + mm.x * self.scale, py: self.center_y - mm.y * self.scale }
    }

    #[inline]
    pub fn to_millimeters(&self, pixel: Pixel) -> Millimeters {
        Millimeters {
            x: (pixel.px - self.center_x) / self.scale,
            y: (self.center_y - pixel.py) / self.scale,
        }
    }

    /// Pixel rectangle for a zone given in millimeter corners
    pub fn rect(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> PixelRect {
        PixelRect::from_corners(
            self.to_canvas(Millimeters { x: x1, y: y1 }),
            self.to_canvas(Millimeters { x: x2, y: y2 }),
        )
    }

    /// Spacing of the 1 m grid in pixels
    pub fn grid_step(&self) -> f64 {
        1000.0 * self.scale
    }
}

/// Maps terminal cells onto a pixel surface drawn inside a cell area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMapper {
    pub x: u16,
    pub y: u16,
    pub columns: u16,
    pub rows: u16,
    pub surface_width: f64,
    pub surface_height: f64,
}

impl CellMapper {
    /// Center of the cell in surface pixels, `None` outside the area
    pub fn cell_to_pixel(&self, column: u16, row: u16) -> Option<Pixel> {
        if self.columns == 0 || self.rows == 0 {
            return None;
        }
        if column < self.x || row < self.y || column >= self.x + self.columns || row >= self.y + self.rows {
            return None;
        }
        let cx = f64::from(column - self.x) + 0.5;
        let cy = f64::from(row - self.y) + 0.5;
        Some(Pixel {
            px: cx * self.surface_width / f64::from(self.columns),
            py: cy * self.surface_height / f64::from(self.rows),
        })
    }
}
