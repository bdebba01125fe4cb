//! Pan/zoom state mapping screen pixels to canvas model pixels.
//!
//! The engine owns a single [`Transform`] value and replaces it on every
//! gesture; hit-testing and the crosshair overlay both read from that value, so
//! the two mapping directions cannot drift apart.

pub mod transform;

pub use transform::{MAX_SCALE, MIN_SCALE, Point, Transform};

use place_proto::CANVAS_WIDTH;
use tracing::{debug, trace};

/// Scale restored by [`ViewportEngine::reset`].
pub const RESET_SCALE: f64 = 0.15;

/// Wheel delta that would zoom all the way to zero; larger is gentler.
pub const ZOOM_SENSITIVITY: f64 = 500.0;

/// Lower bound for a single wheel step so large deltas still zoom out.
pub const MIN_WHEEL_FACTOR: f64 = 0.1;

pub const ZOOM_IN_FACTOR: f64 = 2.0;
pub const ZOOM_OUT_FACTOR: f64 = 0.5;

/// Snapshot handed to overlay/status consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scale: f64,
    pub offset: Point,
    /// Model coordinate at the top-left screen corner.
    pub top_left: Point,
    /// Floored model coordinate under the viewport center.
    pub center: Point,
}

pub struct ViewportEngine {
    transform: Transform,
    size: Point,
    is_reset: bool,
    drag_last: Option<Point>,
    revision: u64,
}

impl ViewportEngine {
    pub fn new(width: f64, height: f64) -> Self {
        let mut engine = Self {
            transform: Transform::new(RESET_SCALE, Point::ORIGIN),
            size: sanitize_size(width, height),
            is_reset: false,
            drag_last: None,
            revision: 0,
        };
        engine.reset();
        engine
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn size(&self) -> Point {
        self.size
    }

    /// Bumped whenever the transform or viewport size changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn current_scale(&self) -> f64 {
        self.transform.scale()
    }

    /// Restores the canonical scale and zero translation. Repeated resets with
    /// no gesture in between change nothing and return `false`.
    pub fn reset(&mut self) -> bool {
        if self.is_reset {
            trace!(target: "place::viewport", "reset skipped; view already at rest");
            return false;
        }
        self.transform = Transform::new(RESET_SCALE, Point::ORIGIN);
        self.drag_last = None;
        self.is_reset = true;
        self.touch();
        true
    }

    pub fn pan(&mut self, screen_delta: Point) {
        self.transform = self.transform.panned(screen_delta);
        self.is_reset = false;
        self.touch();
    }

    /// Multiplies the scale by `factor` while the model point under `anchor`
    /// stays under `anchor`. Factors that are not finite and positive are
    /// ignored.
    pub fn zoom_anchored(&mut self, factor: f64, anchor: Point) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            debug!(target: "place::viewport", factor, "ignoring invalid zoom factor");
            return false;
        }
        self.transform = self.transform.zoomed_about(factor, anchor);
        self.is_reset = false;
        self.touch();
        true
    }

    /// Wheel zoom, anchored at the viewport center rather than the pointer.
    pub fn wheel(&mut self, delta_y: f64) -> bool {
        let factor = (1.0 - delta_y / ZOOM_SENSITIVITY).max(MIN_WHEEL_FACTOR);
        self.zoom_anchored(factor, self.center_screen())
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_anchored(ZOOM_IN_FACTOR, self.center_screen())
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_anchored(ZOOM_OUT_FACTOR, self.center_screen())
    }

    pub fn begin_drag(&mut self, pointer: Point) {
        self.drag_last = Some(pointer);
    }

    /// Pans by the pointer movement since the previous drag position.
    pub fn drag_to(&mut self, pointer: Point) -> bool {
        let Some(last) = self.drag_last.replace(pointer) else {
            return false;
        };
        self.pan(pointer - last);
        true
    }

    pub fn end_drag(&mut self) {
        self.drag_last = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_last.is_some()
    }

    /// New viewport dimensions; the view starts over from the canonical reset.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.size = sanitize_size(width, height);
        self.is_reset = false;
        self.reset();
    }

    pub fn screen_to_model(&self, screen: Point) -> Point {
        self.transform.screen_to_model(screen)
    }

    pub fn model_to_screen(&self, model: Point) -> Point {
        self.transform.model_to_screen(model)
    }

    pub fn center_screen(&self) -> Point {
        self.size / 2.0
    }

    /// Floored model coordinate under the geometric center of the viewport.
    /// The crosshair follows this point, not the pointer.
    pub fn visible_center_model(&self) -> Point {
        let center = self.screen_to_model(self.center_screen());
        Point::new(center.x.floor(), center.y.floor())
    }

    /// Canvas cell under `screen`, if it lies on the canvas.
    pub fn hit_test(&self, screen: Point) -> Option<(u16, u16)> {
        let model = self.screen_to_model(screen);
        let (x, y) = (model.x.floor(), model.y.floor());
        let limit = CANVAS_WIDTH as f64;
        if (0.0..limit).contains(&x) && (0.0..limit).contains(&y) {
            Some((x as u16, y as u16))
        } else {
            None
        }
    }

    /// Canvas cell under the crosshair.
    pub fn targeted_pixel(&self) -> Option<(u16, u16)> {
        self.hit_test(self.center_screen())
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            scale: self.transform.scale(),
            offset: self.transform.offset(),
            top_left: self.screen_to_model(Point::ORIGIN),
            center: self.visible_center_model(),
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
        trace!(
            target: "place::viewport",
            scale = self.transform.scale(),
            offset_x = self.transform.offset().x,
            offset_y = self.transform.offset().y,
            "viewport changed"
        );
    }
}

fn sanitize_size(width: f64, height: f64) -> Point {
    let clamp = |v: f64| if v.is_finite() && v >= 1.0 { v } else { 1.0 };
    Point::new(clamp(width), clamp(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn starts_at_reset_scale() {
        let engine = ViewportEngine::new(800.0, 600.0);
        assert_eq!(engine.current_scale(), RESET_SCALE);
        assert_eq!(engine.transform().offset(), Point::ORIGIN);
        assert_eq!(engine.revision(), 1);
    }

    #[test]
    fn second_reset_is_a_no_op() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.pan(Point::new(30.0, 0.0));
        assert!(engine.reset());
        let state = engine.state();
        let revision = engine.revision();
        assert!(!engine.reset());
        assert_eq!(engine.state(), state);
        assert_eq!(engine.revision(), revision);
    }

    #[test]
    fn pan_converts_screen_delta_into_model_units() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.pan(Point::new(15.0, -30.0));
        assert_close(engine.transform().offset(), Point::new(100.0, -200.0));
        assert_close(engine.state().top_left, Point::new(-100.0, 200.0));
    }

    #[test]
    fn zoom_keeps_anchor_under_pointer() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.pan(Point::new(-120.0, 45.0));
        let anchor = Point::new(123.0, 456.0);
        let before = engine.screen_to_model(anchor);
        assert!(engine.zoom_anchored(3.7, anchor));
        assert_close(engine.screen_to_model(anchor), before);
        assert!((engine.current_scale() - RESET_SCALE * 3.7).abs() < 1e-12);
    }

    #[test]
    fn discrete_zoom_keeps_visible_center() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        let center = engine.screen_to_model(engine.center_screen());
        engine.zoom_in();
        assert_close(engine.screen_to_model(engine.center_screen()), center);
        assert!((engine.current_scale() - 0.3).abs() < 1e-12);
        engine.zoom_out();
        engine.zoom_out();
        assert!((engine.current_scale() - 0.075).abs() < 1e-12);
    }

    #[test]
    fn wheel_factor_follows_sensitivity() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.wheel(-100.0);
        assert!((engine.current_scale() - RESET_SCALE * 1.2).abs() < 1e-12);
        engine.wheel(5_000.0);
        assert!((engine.current_scale() - RESET_SCALE * 1.2 * MIN_WHEEL_FACTOR).abs() < 1e-12);
    }

    #[test]
    fn invalid_zoom_factor_is_ignored() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        let revision = engine.revision();
        assert!(!engine.zoom_anchored(0.0, Point::ORIGIN));
        assert!(!engine.zoom_anchored(-2.0, Point::ORIGIN));
        assert!(!engine.zoom_anchored(f64::INFINITY, Point::ORIGIN));
        assert_eq!(engine.revision(), revision);
    }

    #[test]
    fn zoom_clears_reset_guard() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.zoom_in();
        assert!(engine.reset());
        assert_eq!(engine.current_scale(), RESET_SCALE);
    }

    #[test]
    fn crosshair_tracks_view_center() {
        let engine = ViewportEngine::new(300.0, 150.0);
        assert_eq!(engine.visible_center_model(), Point::new(1000.0, 500.0));
        assert_eq!(engine.targeted_pixel(), Some((1000, 500)));
    }

    #[test]
    fn hit_test_respects_canvas_bounds() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.zoom_anchored(1.0 / RESET_SCALE, Point::ORIGIN);
        assert_eq!(engine.hit_test(Point::new(0.0, 0.0)), Some((0, 0)));
        assert_eq!(engine.hit_test(Point::new(10.7, 3.2)), Some((10, 3)));
        assert_eq!(engine.hit_test(Point::new(-0.5, 3.0)), None);
        assert_eq!(engine.hit_test(Point::new(1024.0, 3.0)), None);
    }

    #[test]
    fn drag_pans_by_pointer_movement() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        assert!(!engine.drag_to(Point::new(5.0, 5.0)));
        engine.begin_drag(Point::new(10.0, 10.0));
        assert!(engine.drag_to(Point::new(13.0, 4.0)));
        assert!(engine.drag_to(Point::new(16.0, 4.0)));
        engine.end_drag();
        assert!(!engine.is_dragging());
        assert_close(
            engine.transform().offset(),
            Point::new(6.0 / RESET_SCALE, -6.0 / RESET_SCALE),
        );
    }

    #[test]
    fn resize_resets_transform() {
        let mut engine = ViewportEngine::new(800.0, 600.0);
        engine.zoom_in();
        engine.resize(400.0, 0.0);
        assert_eq!(engine.size(), Point::new(400.0, 1.0));
        assert_eq!(engine.current_scale(), RESET_SCALE);
    }
}
