use std::ops::{Add, Div, Mul, Sub};

/// Smallest and largest screen pixels per model pixel.
pub const MIN_SCALE: f64 = 0.01;
pub const MAX_SCALE: f64 = 512.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// Uniform scale followed by a model-space translation:
/// `screen = scale * (model + offset)`.
///
/// Values are immutable; every pan or zoom yields a new transform, and both
/// mapping directions are derived from the same two fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    scale: f64,
    offset: Point,
}

impl Transform {
    pub fn new(scale: f64, offset: Point) -> Self {
        Self {
            scale: clamp_scale(scale),
            offset,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Translation in model units.
    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn model_to_screen(&self, model: Point) -> Point {
        (model + self.offset) * self.scale
    }

    pub fn screen_to_model(&self, screen: Point) -> Point {
        screen / self.scale - self.offset
    }

    /// Shifts the view by a screen-space delta.
    pub fn panned(&self, screen_delta: Point) -> Transform {
        Transform {
            scale: self.scale,
            offset: self.offset + screen_delta / self.scale,
        }
    }

    /// Rescales by `factor` keeping the model point under `anchor` fixed on
    /// screen. The resulting scale is clamped, the anchor still holds.
    pub fn zoomed_about(&self, factor: f64, anchor: Point) -> Transform {
        let anchored = self.screen_to_model(anchor);
        let scale = clamp_scale(self.scale * factor);
        Transform {
            scale,
            offset: anchor / scale - anchored,
        }
    }
}

fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        MIN_SCALE
    }
}
