//! Color maps for intensity → RGBA mapping.
//!
//! A color map is a list of stops over the normalized range [0, 1]; values
//! between stops are linearly interpolated. The registry holds the built-in
//! maps in a fixed order so they can be selected by name or by index.

use serde::{Deserialize, Serialize};

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Linear interpolation between two colors, `t` clamped to [0, 1].
pub fn interpolate_color(from: Color, to: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    Color::new(
        lerp(from.r, to.r),
        lerp(from.g, to.g),
        lerp(from.b, to.b),
        lerp(from.a, to.a),
    )
}

/// A named piecewise-linear color map.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    name: String,
    stops: Vec<(f32, Color)>,
}

impl ColorMap {
    /// Build a map from `(position, color)` stops.
    ///
    /// Stops are sorted by position; positions are clamped to [0, 1].
    /// Returns `None` when no stops are given.
    pub fn new(name: impl Into<String>, stops: Vec<(f32, Color)>) -> Option<Self> {
        if stops.is_empty() {
            return None;
        }
        let mut stops: Vec<(f32, Color)> = stops
            .into_iter()
            .map(|(p, c)| (p.clamp(0.0, 1.0), c))
            .collect();
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Some(Self {
            name: name.into(),
            stops,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Color at normalized position `t` (clamped to [0, 1]).
    pub fn sample(&self, t: f32) -> Color {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        let first = self.stops[0];
        if t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if t <= p1 {
                let span = p1 - p0;
                if span <= f32::EPSILON {
                    return c1;
                }
                return interpolate_color(c0, c1, (t - p0) / span);
            }
        }
        self.stops[self.stops.len() - 1].1
    }

    /// Sample with optional inversion of the map direction.
    pub fn sample_oriented(&self, t: f32, inverted: bool) -> Color {
        if inverted {
            self.sample(1.0 - t)
        } else {
            self.sample(t)
        }
    }

    /// Precompute `n` evenly spaced colors (n ≥ 2).
    pub fn lookup_table(&self, n: usize, inverted: bool) -> Vec<Color> {
        let n = n.max(2);
        (0..n)
            .map(|i| self.sample_oriented(i as f32 / (n - 1) as f32, inverted))
            .collect()
    }
}

/// Registry of available color maps, in selection order.
#[derive(Debug, Clone)]
pub struct ColorMapRegistry {
    maps: Vec<ColorMap>,
}

impl Default for ColorMapRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ColorMapRegistry {
    /// The built-in maps: gray, heat, rainbow, cool.
    pub fn builtin() -> Self {
        let maps = vec![
            ColorMap::new(
                "gray",
                vec![(0.0, Color::rgb(0, 0, 0)), (1.0, Color::rgb(255, 255, 255))],
            ),
            ColorMap::new(
                "heat",
                vec![
                    (0.0, Color::rgb(0, 0, 0)),
                    (0.34, Color::rgb(255, 0, 0)),
                    (0.67, Color::rgb(255, 255, 0)),
                    (1.0, Color::rgb(255, 255, 255)),
                ],
            ),
            ColorMap::new(
                "rainbow",
                vec![
                    (0.0, Color::rgb(128, 0, 255)),
                    (0.2, Color::rgb(0, 0, 255)),
                    (0.4, Color::rgb(0, 255, 255)),
                    (0.6, Color::rgb(0, 255, 0)),
                    (0.8, Color::rgb(255, 255, 0)),
                    (1.0, Color::rgb(255, 0, 0)),
                ],
            ),
            ColorMap::new(
                "cool",
                vec![
                    (0.0, Color::rgb(0, 0, 0)),
                    (0.25, Color::rgb(22, 56, 98)),
                    (0.5, Color::rgb(38, 135, 110)),
                    (0.75, Color::rgb(176, 168, 120)),
                    (1.0, Color::rgb(255, 255, 255)),
                ],
            ),
        ];

        Self {
            maps: maps.into_iter().flatten().collect(),
        }
    }

    /// Add a map, replacing any existing map of the same name.
    pub fn register(&mut self, map: ColorMap) {
        match self.maps.iter_mut().find(|m| m.name == map.name) {
            Some(existing) => *existing = map,
            None => self.maps.push(map),
        }
    }

    /// Look up a map by case-insensitive name.
    pub fn by_name(&self, name: &str) -> Option<&ColorMap> {
        self.maps.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn by_index(&self, index: usize) -> Option<&ColorMap> {
        self.maps.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.maps
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.maps.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
