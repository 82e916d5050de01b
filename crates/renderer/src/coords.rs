//! Viewport (logical pixel) to surface (device pixel) conversion.
//!
//! Every radius handed across this boundary is expressed in viewport pixels
//! and scaled exactly once, here, by the target surface's device pixel ratio.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle in viewport pixels, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x < self.right()
            && point.y >= self.top
            && point.y < self.bottom()
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }
}

/// Where a surface sits in the viewport plus its device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub rect: Rect,
    pub scale: f32,
}

impl SurfaceGeometry {
    pub fn new(rect: Rect, scale: f32) -> Self {
        Self {
            rect,
            scale: if scale > 0.0 { scale } else { 1.0 },
        }
    }

    /// Backing-store size: logical size times device pixel ratio, at least 1x1.
    pub fn physical_size(&self) -> (u32, u32) {
        let width = (self.rect.width * self.scale).round().max(1.0) as u32;
        let height = (self.rect.height * self.scale).round().max(1.0) as u32;
        (width, height)
    }

    /// Maps a viewport point to `[-1, 1]` across this surface.
    pub fn normalized(&self, point: Point) -> [f32; 2] {
        let width = self.rect.width.max(f32::EPSILON);
        let height = self.rect.height.max(f32::EPSILON);
        [
            ((point.x - self.rect.left) / width) * 2.0 - 1.0,
            ((point.y - self.rect.top) / height) * 2.0 - 1.0,
        ]
    }
}

/// Live geometry of a surface. Implementations must answer from current
/// layout on every call.
pub trait GeometrySource {
    fn geometry(&self) -> SurfaceGeometry;
}

impl GeometrySource for SurfaceGeometry {
    fn geometry(&self) -> SurfaceGeometry {
        *self
    }
}

/// A circle in some surface's pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCircle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

pub struct CoordinateMapper;

impl CoordinateMapper {
    pub fn map(point: Point, rect: &Rect, scale: f32) -> Point {
        Self::map_axes(point, rect, scale, scale)
    }

    /// Like [`map`](Self::map) for targets stretched unevenly, such as a
    /// fixed-size surface sampled across a rectangle of another aspect ratio.
    pub fn map_axes(point: Point, rect: &Rect, scale_x: f32, scale_y: f32) -> Point {
        Point::new((point.x - rect.left) * scale_x, (point.y - rect.top) * scale_y)
    }

    pub fn map_radius(radius: f32, scale: f32) -> f32 {
        radius * scale
    }

    /// Maps through a geometry source, querying it afresh.
    pub fn map_to(point: Point, source: &dyn GeometrySource) -> Point {
        let geometry = source.geometry();
        Self::map(point, &geometry.rect, geometry.scale)
    }

    pub fn map_circle(center: Point, radius: f32, source: &dyn GeometrySource) -> SurfaceCircle {
        let geometry = source.geometry();
        let mapped = Self::map(center, &geometry.rect, geometry.scale);
        SurfaceCircle {
            x: mapped.x,
            y: mapped.y,
            radius: Self::map_radius(radius, geometry.scale),
        }
    }
}

/// Region around the focused element whose droplets get cleared this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShieldRequest {
    pub center: Point,
    pub radius: f32,
}

impl ShieldRequest {
    /// Centered on `rect`, radius half of its larger side.
    pub fn around(rect: &Rect) -> Self {
        Self {
            center: rect.center(),
            radius: rect.width.max(rect.height) / 2.0,
        }
    }

    pub fn map_into(&self, source: &dyn GeometrySource) -> SurfaceCircle {
        CoordinateMapper::map_circle(self.center, self.radius, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn map_subtracts_origin_then_scales() {
        let rect = Rect::new(12.0, 48.0, 800.0, 600.0);
        for &(x, y, scale) in &[(12.0, 48.0, 1.0), (100.5, 75.25, 2.0), (0.0, 0.0, 1.5)] {
            let mapped = CoordinateMapper::map(Point::new(x, y), &rect, scale);
            assert_eq!(mapped, Point::new((x - 12.0) * scale, (y - 48.0) * scale));
        }
    }

    #[test]
    fn map_axes_scales_each_axis_independently() {
        let rect = Rect::new(0.0, 32.0, 1280.0, 360.0);
        let mapped = CoordinateMapper::map_axes(Point::new(640.0, 212.0), &rect, 2.0, 4.0);
        assert_eq!(mapped, Point::new(1280.0, 720.0));
        assert_eq!(
            CoordinateMapper::map_axes(Point::new(640.0, 212.0), &rect, 2.0, 2.0),
            CoordinateMapper::map(Point::new(640.0, 212.0), &rect, 2.0)
        );
    }

    #[test]
    fn shield_maps_center_and_radius_with_device_ratio() {
        let focused = Rect::new(350.0, 250.0, 100.0, 100.0);
        let shield = ShieldRequest::around(&focused);
        assert_eq!(shield.center, Point::new(400.0, 300.0));
        assert_eq!(shield.radius, 50.0);

        let editor = SurfaceGeometry::new(Rect::new(0.0, 0.0, 1280.0, 720.0), 2.0);
        let mapped = shield.map_into(&editor);
        assert_eq!(
            mapped,
            SurfaceCircle {
                x: 800.0,
                y: 600.0,
                radius: 100.0
            }
        );
    }

    struct ScrollingLayout {
        offset: Cell<f32>,
    }

    impl GeometrySource for ScrollingLayout {
        fn geometry(&self) -> SurfaceGeometry {
            SurfaceGeometry::new(Rect::new(0.0, self.offset.get(), 100.0, 100.0), 1.0)
        }
    }

    #[test]
    fn geometry_is_requeried_each_call() {
        let layout = ScrollingLayout {
            offset: Cell::new(0.0),
        };
        let point = Point::new(10.0, 50.0);
        assert_eq!(CoordinateMapper::map_to(point, &layout), Point::new(10.0, 50.0));
        layout.offset.set(20.0);
        assert_eq!(CoordinateMapper::map_to(point, &layout), Point::new(10.0, 30.0));
    }

    #[test]
    fn physical_size_rounds_and_never_collapses() {
        let geometry = SurfaceGeometry::new(Rect::new(0.0, 0.0, 333.3, 0.1), 1.5);
        assert_eq!(geometry.physical_size(), (500, 1));
    }

    #[test]
    fn normalized_spans_unit_square() {
        let geometry = SurfaceGeometry::new(Rect::new(100.0, 100.0, 200.0, 100.0), 1.0);
        assert_eq!(geometry.normalized(Point::new(100.0, 100.0)), [-1.0, -1.0]);
        assert_eq!(geometry.normalized(Point::new(200.0, 150.0)), [0.0, 0.0]);
        assert_eq!(geometry.normalized(Point::new(300.0, 200.0)), [1.0, 1.0]);
    }
}
