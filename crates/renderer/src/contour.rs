//! Contour (isoline) tracing using marching squares.
//!
//! Produces vector graphics rather than pixels: each iso-level becomes a set
//! of polylines in output pixel coordinates, tagged with the level value.

use tracing::debug;
use view_common::{Pen, Point, Polyline, VectorGraphics};

/// Tolerance when joining segment end points.
const JOIN_EPSILON: f64 = 1e-3;

/// A line segment between two points (grid coordinates).
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

/// How contours are traced and drawn.
#[derive(Debug, Clone)]
pub struct ContourConfig {
    /// Iso-levels to trace, in data units
    pub levels: Vec<f64>,
    /// Pen used for every level
    pub pen: Pen,
    /// Chaikin smoothing passes (0 = none)
    pub smoothing_passes: u32,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            levels: vec![],
            pen: Pen::default(),
            smoothing_passes: 0,
        }
    }
}

/// Evenly spaced levels: `count` levels strictly inside `(min, max)`.
pub fn generate_levels(min: f64, max: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(min.is_finite() && max.is_finite()) || max <= min {
        return vec![];
    }
    let step = (max - min) / (count + 1) as f64;
    (1..=count).map(|i| min + step * i as f64).collect()
}

/// Marching squares over a row-major grid for a single level.
pub fn march_squares(data: &[f32], width: usize, height: usize, level: f64) -> Vec<Segment> {
    if width < 2 || height < 2 || data.len() != width * height {
        return vec![];
    }

    let mut segments = Vec::new();
    for y in 0..(height - 1) {
        for x in 0..(width - 1) {
            let tl = data[y * width + x] as f64;
            let tr = data[y * width + x + 1] as f64;
            let bl = data[(y + 1) * width + x] as f64;
            let br = data[(y + 1) * width + x + 1] as f64;

            if tl.is_nan() || tr.is_nan() || bl.is_nan() || br.is_nan() {
                continue;
            }

            let mut case = 0u8;
            if tl >= level {
                case |= 1;
            }
            if tr >= level {
                case |= 2;
            }
            if br >= level {
                case |= 4;
            }
            if bl >= level {
                case |= 8;
            }

            cell_segments(case, x as f64, y as f64, [tl, tr, br, bl], level, &mut segments);
        }
    }
    segments
}

fn cell_segments(case: u8, x: f64, y: f64, corners: [f64; 4], level: f64, out: &mut Vec<Segment>) {
    let [tl, tr, br, bl] = corners;
    let top = || edge_crossing(x, y, x + 1.0, y, tl, tr, level);
    let right = || edge_crossing(x + 1.0, y, x + 1.0, y + 1.0, tr, br, level);
    let bottom = || edge_crossing(x, y + 1.0, x + 1.0, y + 1.0, bl, br, level);
    let left = || edge_crossing(x, y, x, y + 1.0, tl, bl, level);
    let mut push = |start: Point, end: Point| out.push(Segment { start, end });

    match case {
        0 | 15 => {}
        1 | 14 => push(left(), top()),
        2 | 13 => push(top(), right()),
        3 | 12 => push(left(), right()),
        4 | 11 => push(right(), bottom()),
        5 => {
            push(left(), top());
            push(right(), bottom());
        }
        6 | 9 => push(top(), bottom()),
        7 | 8 => push(left(), bottom()),
        10 => {
            push(top(), right());
            push(left(), bottom());
        }
        _ => {}
    }
}

fn edge_crossing(x1: f64, y1: f64, x2: f64, y2: f64, v1: f64, v2: f64, level: f64) -> Point {
    if (v2 - v1).abs() < 1e-12 {
        return Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0);
    }
    let t = ((level - v1) / (v2 - v1)).clamp(0.0, 1.0);
    Point::new(x1 + t * (x2 - x1), y1 + t * (y2 - y1))
}

/// Join unordered segments into polylines (greedy, extending from the tail
/// and then from the head).
pub fn connect_segments(segments: &[Segment]) -> Vec<(Vec<Point>, bool)> {
    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    for start_idx in 0..segments.len() {
        if used[start_idx] {
            continue;
        }
        used[start_idx] = true;
        let mut points = vec![segments[start_idx].start, segments[start_idx].end];

        extend_line(&mut points, segments, &mut used);
        points.reverse();
        extend_line(&mut points, segments, &mut used);

        let closed = points.len() > 2
            && points[0].distance(&points[points.len() - 1]) < JOIN_EPSILON;
        if closed {
            // closing edge is implied
            points.pop();
        }
        lines.push((points, closed));
    }
    lines
}

fn extend_line(points: &mut Vec<Point>, segments: &[Segment], used: &mut [bool]) {
    loop {
        let Some(tail) = points.last().copied() else {
            return;
        };
        let next = segments.iter().enumerate().find_map(|(i, seg)| {
            if used[i] {
                None
            } else if seg.start.distance(&tail) < JOIN_EPSILON {
                Some((i, seg.end))
            } else if seg.end.distance(&tail) < JOIN_EPSILON {
                Some((i, seg.start))
            } else {
                None
            }
        });
        match next {
            Some((i, p)) => {
                used[i] = true;
                points.push(p);
            }
            None => return,
        }
    }
}

/// Chaikin corner cutting.
pub fn smooth(points: &[Point], closed: bool, passes: u32) -> Vec<Point> {
    if passes == 0 || points.len() < 3 {
        return points.to_vec();
    }

    let mut current = points.to_vec();
    for _ in 0..passes {
        let n = current.len();
        let edges = if closed { n } else { n - 1 };
        let mut next = Vec::with_capacity(edges * 2 + 2);
        if !closed {
            next.push(current[0]);
        }
        for i in 0..edges {
            let p1 = current[i];
            let p2 = current[(i + 1) % n];
            next.push(Point::new(0.75 * p1.x + 0.25 * p2.x, 0.75 * p1.y + 0.25 * p2.y));
            next.push(Point::new(0.25 * p1.x + 0.75 * p2.x, 0.25 * p1.y + 0.75 * p2.y));
        }
        if !closed {
            next.push(current[n - 1]);
        }
        current = next;
    }
    current
}

/// Trace every configured level over a plane.
///
/// `to_output` maps grid coordinates to output pixel coordinates (pan/zoom).
pub fn trace_contours<F>(
    data: &[f32],
    width: usize,
    height: usize,
    config: &ContourConfig,
    to_output: F,
) -> VectorGraphics
where
    F: Fn(Point) -> Point,
{
    let mut graphics = VectorGraphics::new();

    for &level in &config.levels {
        let segments = march_squares(data, width, height, level);
        for (points, closed) in connect_segments(&segments) {
            let points = smooth(&points, closed, config.smoothing_passes)
                .into_iter()
                .map(&to_output)
                .collect();
            graphics.push(Polyline {
                points,
                closed,
                pen: config.pen,
                level: Some(level),
            });
        }
    }

    debug!(
        levels = config.levels.len(),
        polylines = graphics.len(),
        "Traced contours"
    );
    graphics
}
