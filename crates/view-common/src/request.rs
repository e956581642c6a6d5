//! Render requests issued to layers.

use serde::{Deserialize, Serialize};

use crate::{LayerId, PixelSize, Point, SkyCoordinateSystem, ViewError, ViewResult};

/// Parameters for one render of one or more layers.
///
/// A request is immutable once built. Use [`RenderRequest::builder`] to
/// construct one; the builder enforces that zoom, when set, is strictly
/// positive and that pan is either fully set (both coordinates finite) or
/// fully unset. Deserialized requests go through the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RequestFields")]
pub struct RenderRequest {
    frames: Vec<usize>,
    coordinate_system: SkyCoordinateSystem,
    output_size: PixelSize,
    pan: Option<Point>,
    zoom: Option<f64>,
    request_main: bool,
    request_context: bool,
    request_zoom: bool,
    layers: Vec<LayerId>,
    stack_top: bool,
    top_index: Option<usize>,
    generation: u64,
}

impl RenderRequest {
    pub fn builder(frames: Vec<usize>, coordinate_system: SkyCoordinateSystem) -> RenderRequestBuilder {
        RenderRequestBuilder::new(frames, coordinate_system)
    }

    /// Frame index per non-spatial axis, in axis order.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    /// Frame on the first non-spatial (usually spectral) axis.
    pub fn channel(&self) -> usize {
        self.frames.first().copied().unwrap_or(0)
    }

    pub fn coordinate_system(&self) -> SkyCoordinateSystem {
        self.coordinate_system
    }

    pub fn output_size(&self) -> PixelSize {
        self.output_size
    }

    pub fn pan(&self) -> Option<Point> {
        self.pan
    }

    /// Pan in the NaN-encoded form: both coordinates NaN when unset.
    pub fn pan_or_nan(&self) -> Point {
        self.pan.unwrap_or(Point::new(f64::NAN, f64::NAN))
    }

    pub fn is_pan_set(&self) -> bool {
        self.pan.is_some()
    }

    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }

    pub fn is_zoom_set(&self) -> bool {
        self.zoom.is_some()
    }

    pub fn is_request_main(&self) -> bool {
        self.request_main
    }

    pub fn is_request_context(&self) -> bool {
        self.request_context
    }

    pub fn is_request_zoom(&self) -> bool {
        self.request_zoom
    }

    /// Layers to render, bottom of the stack first.
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// Whether the layer receiving this request is the top visible layer.
    pub fn is_stack_top(&self) -> bool {
        self.stack_top
    }

    /// Index of the selected layer in the stack, if any.
    pub fn top_index(&self) -> Option<usize> {
        self.top_index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Wire form of a request, validated by [`RenderRequestBuilder::build`].
#[derive(Deserialize)]
struct RequestFields {
    frames: Vec<usize>,
    coordinate_system: SkyCoordinateSystem,
    output_size: PixelSize,
    pan: Option<Point>,
    zoom: Option<f64>,
    request_main: bool,
    request_context: bool,
    request_zoom: bool,
    layers: Vec<LayerId>,
    stack_top: bool,
    top_index: Option<usize>,
    generation: u64,
}

impl TryFrom<RequestFields> for RenderRequest {
    type Error = ViewError;

    fn try_from(fields: RequestFields) -> ViewResult<Self> {
        let mut builder = RenderRequest::builder(fields.frames, fields.coordinate_system)
            .output_size(fields.output_size)
            .request_main(fields.request_main)
            .request_context(fields.request_context)
            .request_zoom(fields.request_zoom)
            .layers(fields.layers)
            .stack_top(fields.stack_top)
            .top_index(fields.top_index)
            .generation(fields.generation)
            .zoom_factor(fields.zoom);
        if let Some(p) = fields.pan {
            builder = builder.pan(p.x, p.y);
        }
        builder.build()
    }
}

/// Builder for [`RenderRequest`].
#[derive(Debug, Clone)]
pub struct RenderRequestBuilder {
    inner: RenderRequest,
    pan_raw: Option<(f64, f64)>,
}

impl RenderRequestBuilder {
    fn new(frames: Vec<usize>, coordinate_system: SkyCoordinateSystem) -> Self {
        Self {
            inner: RenderRequest {
                frames,
                coordinate_system,
                output_size: PixelSize::default(),
                pan: None,
                zoom: None,
                request_main: false,
                request_context: false,
                request_zoom: false,
                layers: Vec::new(),
                stack_top: false,
                top_index: None,
                generation: 0,
            },
            pan_raw: None,
        }
    }

    pub fn output_size(mut self, size: PixelSize) -> Self {
        self.inner.output_size = size;
        self
    }

    /// Set the pan point. Passing NaN for both coordinates clears it.
    pub fn pan(mut self, x: f64, y: f64) -> Self {
        self.pan_raw = Some((x, y));
        self
    }

    pub fn pan_point(self, pan: Option<Point>) -> Self {
        match pan {
            Some(p) => self.pan(p.x, p.y),
            None => self.pan(f64::NAN, f64::NAN),
        }
    }

    /// Set the zoom factor. Values that are not strictly positive are rejected by `build`.
    pub fn zoom(mut self, zoom: f64) -> Self {
        self.inner.zoom = Some(zoom);
        self
    }

    pub fn zoom_factor(mut self, zoom: Option<f64>) -> Self {
        self.inner.zoom = zoom;
        self
    }

    pub fn request_main(mut self, on: bool) -> Self {
        self.inner.request_main = on;
        self
    }

    pub fn request_context(mut self, on: bool) -> Self {
        self.inner.request_context = on;
        self
    }

    pub fn request_zoom(mut self, on: bool) -> Self {
        self.inner.request_zoom = on;
        self
    }

    pub fn layers(mut self, layers: Vec<LayerId>) -> Self {
        self.inner.layers = layers;
        self
    }

    pub fn stack_top(mut self, stack_top: bool) -> Self {
        self.inner.stack_top = stack_top;
        self
    }

    pub fn top_index(mut self, top_index: Option<usize>) -> Self {
        self.inner.top_index = top_index;
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.inner.generation = generation;
        self
    }

    pub fn build(mut self) -> ViewResult<RenderRequest> {
        if let Some(zoom) = self.inner.zoom {
            if !(zoom.is_finite() && zoom > 0.0) {
                return Err(ViewError::invalid_parameter(
                    "zoom",
                    format!("zoom must be a finite value > 0, got {}", zoom),
                ));
            }
        }

        self.inner.pan = match self.pan_raw {
            None => None,
            Some((x, y)) if x.is_nan() && y.is_nan() => None,
            Some((x, y)) if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
            Some((x, y)) => {
                return Err(ViewError::invalid_parameter(
                    "pan",
                    format!("pan must be fully set or fully unset, got ({}, {})", x, y),
                ))
            }
        };

        Ok(self.inner)
    }
}
