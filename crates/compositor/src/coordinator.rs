//! Render coordinator.
//!
//! Layer changes are coalesced into a dirty set; a repaint pass renders every
//! dirty visible layer concurrently, then composites the latest output of all
//! visible layers, bottom first, into one raster plus one vector-graphics
//! list. Each pass gets a fresh generation; responses older than the last
//! published composite are dropped.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use metrics::counter;
use renderer::Compositor;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use view_common::{
    LayerId, LayerStyle, PixelSize, Point, Raster, RenderRequest, RenderResponse,
    SkyCoordinateSystem, VectorGraphics, ViewError, ViewResult,
};

use crate::{Layer, RenderError};

/// Capacity of the resize broadcast channel.
const RESIZE_CAPACITY: usize = 8;

/// One published composite.
#[derive(Debug, Clone)]
pub struct Composite {
    pub generation: u64,
    pub raster: Raster,
    pub graphics: VectorGraphics,
    /// Layers drawn, bottom first
    pub layers: Vec<LayerId>,
    /// A visible layer failed or had nothing to draw
    pub partial: bool,
}

/// View parameters shared by every layer of the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub frames: Vec<usize>,
    pub coordinate_system: SkyCoordinateSystem,
    pub pan: Option<Point>,
    pub zoom: Option<f64>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            frames: vec![0],
            coordinate_system: SkyCoordinateSystem::default(),
            pan: None,
            zoom: None,
        }
    }
}

struct LayerSlot {
    layer: Arc<dyn Layer>,
    style: LayerStyle,
    latest: Option<RenderResponse>,
}

/// Coalesces layer changes into repaints and publishes composites.
///
/// All mutation goes through `&mut self`, so one coordinator never runs two
/// repaints at once. Use [`RenderCoordinator::spawn`] to drive it from an
/// event channel.
pub struct RenderCoordinator {
    slots: Vec<LayerSlot>,
    dirty: HashSet<LayerId>,
    repaint_queued: bool,
    view: ViewState,
    output_size: PixelSize,
    top_index: Option<usize>,
    next_generation: u64,
    published_generation: u64,
    render_count: u64,
    redraw_count: u64,
    composites: watch::Sender<Option<Arc<Composite>>>,
    resizes: broadcast::Sender<PixelSize>,
}

impl RenderCoordinator {
    pub fn new(output_size: PixelSize) -> Self {
        let (composites, _) = watch::channel(None);
        let (resizes, _) = broadcast::channel(RESIZE_CAPACITY);
        Self {
            slots: Vec::new(),
            dirty: HashSet::new(),
            repaint_queued: false,
            view: ViewState::default(),
            output_size,
            top_index: None,
            next_generation: 1,
            published_generation: 0,
            render_count: 0,
            redraw_count: 0,
            composites,
            resizes,
        }
    }

    // ---- stack ----

    /// Put a layer on top of the stack. Returns false if the id is taken.
    pub fn add_layer(&mut self, layer: Arc<dyn Layer>, style: LayerStyle) -> bool {
        let id = layer.id().clone();
        if self.slot_index(&id).is_some() {
            warn!(layer = %id, "Layer already in stack");
            return false;
        }
        self.slots.push(LayerSlot {
            layer,
            style,
            latest: None,
        });
        debug!(layer = %id, depth = self.slots.len(), "Layer added");
        self.notify_layer_changed(&id);
        true
    }

    /// Remove a layer; the next repaint recomposites without it.
    pub fn remove_layer(&mut self, id: &LayerId) -> bool {
        let Some(index) = self.slot_index(id) else {
            return false;
        };
        self.slots.remove(index);
        self.dirty.remove(id);
        self.repaint_queued = true;
        true
    }

    /// Layer ids, bottom of the stack first.
    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.slots.iter().map(|s| s.layer.id().clone()).collect()
    }

    pub fn layer_style(&self, id: &LayerId) -> Option<LayerStyle> {
        self.slot_index(id).map(|i| self.slots[i].style)
    }

    /// Replace a layer's presentation settings and mark it dirty.
    pub fn set_layer_style(&mut self, id: &LayerId, style: LayerStyle) -> bool {
        let Some(index) = self.slot_index(id) else {
            return false;
        };
        if self.slots[index].style == style {
            return false;
        }
        self.slots[index].style = style;
        self.notify_layer_changed(id)
    }

    fn slot_index(&self, id: &LayerId) -> Option<usize> {
        self.slots.iter().position(|s| s.layer.id() == id)
    }

    // ---- change notification ----

    /// Mark a layer dirty. Returns true when this call scheduled the repaint,
    /// false when one was already pending (or the layer is unknown).
    pub fn notify_layer_changed(&mut self, id: &LayerId) -> bool {
        if self.slot_index(id).is_none() {
            debug!(layer = %id, "Change notification for unknown layer");
            return false;
        }
        self.dirty.insert(id.clone());
        let scheduled = !self.repaint_queued;
        self.repaint_queued = true;
        scheduled
    }

    fn mark_all_dirty(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        self.dirty
            .extend(self.slots.iter().map(|s| s.layer.id().clone()));
        self.repaint_queued = true;
    }

    pub fn is_repaint_queued(&self) -> bool {
        self.repaint_queued
    }

    /// Dirty layers, sorted by id.
    pub fn dirty_layers(&self) -> Vec<LayerId> {
        let mut ids: Vec<_> = self.dirty.iter().cloned().collect();
        ids.sort();
        ids
    }

    // ---- global view ----

    /// Output size repaints are rendered at.
    pub fn client_view_size(&self) -> PixelSize {
        self.output_size
    }

    /// Change the output size; every layer is re-rendered and subscribers
    /// get a resize event.
    pub fn set_client_view_size(&mut self, size: PixelSize) -> bool {
        if size == self.output_size {
            return false;
        }
        info!(from = %self.output_size, to = %size, "Client view resized");
        self.output_size = size;
        self.mark_all_dirty();
        let _ = self.resizes.send(size);
        true
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn set_frames(&mut self, frames: Vec<usize>) {
        if self.view.frames != frames {
            self.view.frames = frames;
            self.mark_all_dirty();
        }
    }

    pub fn set_coordinate_system(&mut self, system: SkyCoordinateSystem) {
        if self.view.coordinate_system != system {
            self.view.coordinate_system = system;
            self.mark_all_dirty();
        }
    }

    /// Pan to `pan`, or back to the default center with `None`.
    pub fn set_pan(&mut self, pan: Option<Point>) -> ViewResult<()> {
        if let Some(p) = pan {
            if !p.is_finite() {
                return Err(ViewError::invalid_parameter(
                    "pan",
                    format!("pan must be finite, got ({}, {})", p.x, p.y),
                ));
            }
        }
        if self.view.pan != pan {
            self.view.pan = pan;
            self.mark_all_dirty();
        }
        Ok(())
    }

    /// Zoom to `zoom` output pixels per image pixel, or back to fit with `None`.
    pub fn set_zoom(&mut self, zoom: Option<f64>) -> ViewResult<()> {
        if let Some(z) = zoom {
            if !(z.is_finite() && z > 0.0) {
                return Err(ViewError::invalid_parameter(
                    "zoom",
                    format!("zoom must be a finite value > 0, got {}", z),
                ));
            }
        }
        if self.view.zoom != zoom {
            self.view.zoom = zoom;
            self.mark_all_dirty();
        }
        Ok(())
    }

    /// Select the layer reported as `top_index` in requests.
    pub fn set_top_index(&mut self, top_index: Option<usize>) {
        if self.top_index != top_index {
            self.top_index = top_index;
            self.mark_all_dirty();
        }
    }

    // ---- observation ----

    /// Layer renders issued so far.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Composites published so far.
    pub fn redraw_count(&self) -> u64 {
        self.redraw_count
    }

    pub fn published_generation(&self) -> u64 {
        self.published_generation
    }

    pub fn latest_composite(&self) -> Option<Arc<Composite>> {
        self.composites.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Composite>>> {
        self.composites.subscribe()
    }

    pub fn subscribe_resize(&self) -> broadcast::Receiver<PixelSize> {
        self.resizes.subscribe()
    }

    // ---- rendering ----

    /// Accept a response that arrived outside a repaint pass.
    ///
    /// Responses older than the last published composite, or than what the
    /// layer already holds, are dropped. Accepted responses queue a
    /// recomposite.
    pub fn deliver_response(&mut self, response: RenderResponse) -> bool {
        let published = self.published_generation;
        let Some(index) = self.slot_index(response.layer_id()) else {
            debug!(layer = %response.layer_id(), "Response for unknown layer");
            return false;
        };
        let slot = &mut self.slots[index];
        let held = slot.latest.as_ref().map_or(0, RenderResponse::generation);
        if response.generation() < published || response.generation() < held {
            counter!("cubeview_stale_responses_total").increment(1);
            debug!(
                layer = %response.layer_id(),
                generation = response.generation(),
                published = published,
                "Dropping stale response"
            );
            return false;
        }
        if response.is_empty() {
            return false;
        }
        slot.latest = Some(response);
        self.repaint_queued = true;
        true
    }

    fn build_request(&self, index: usize, generation: u64) -> ViewResult<RenderRequest> {
        let top_visible = self.slots.iter().rposition(|s| s.style.visible);
        RenderRequest::builder(self.view.frames.clone(), self.view.coordinate_system)
            .output_size(self.output_size)
            .pan_point(self.view.pan)
            .zoom_factor(self.view.zoom)
            .request_main(true)
            .layers(vec![self.slots[index].layer.id().clone()])
            .stack_top(top_visible == Some(index))
            .top_index(self.top_index)
            .generation(generation)
            .build()
    }

    /// Render every dirty visible layer, composite the stack and publish it.
    ///
    /// The dirty set and the queued flag are cleared before any layer is
    /// asked to render, so changes reported meanwhile queue another pass.
    #[instrument(skip(self), fields(generation = self.next_generation))]
    pub async fn repaint_now(&mut self) -> Arc<Composite> {
        let dirty = std::mem::take(&mut self.dirty);
        self.repaint_queued = false;

        let generation = self.next_generation;
        self.next_generation += 1;
        let mut partial = false;

        let targets: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.style.visible && dirty.contains(s.layer.id()))
            .map(|(i, _)| i)
            .collect();

        let mut renders = Vec::with_capacity(targets.len());
        for index in targets {
            match self.build_request(index, generation) {
                Ok(request) => renders.push((index, self.slots[index].layer.clone(), request)),
                Err(e) => {
                    warn!(layer = %self.slots[index].layer.id(), error = %e, "Cannot build render request");
                    self.slots[index].latest = None;
                    partial = true;
                }
            }
        }

        self.render_count += renders.len() as u64;
        counter!("cubeview_layer_renders_total").increment(renders.len() as u64);

        // A panicking layer is reported like a failed one.
        let results = join_all(renders.into_iter().map(|(index, layer, request)| async move {
            let result = AssertUnwindSafe(layer.render(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(RenderError::from_panic(panic)));
            (index, result)
        }))
        .await;

        for (index, result) in results {
            let slot = &mut self.slots[index];
            match result {
                Ok(response) if response.generation() < self.published_generation => {
                    counter!("cubeview_stale_responses_total").increment(1);
                    debug!(layer = %slot.layer.id(), generation = response.generation(), "Dropping stale response");
                }
                Ok(response) if response.layer_id() != slot.layer.id() => {
                    warn!(
                        layer = %slot.layer.id(),
                        answered_as = %response.layer_id(),
                        "Layer answered with a foreign id"
                    );
                    slot.latest = None;
                    partial = true;
                }
                Ok(response) if response.is_empty() => {
                    debug!(layer = %slot.layer.id(), "Layer produced nothing");
                    slot.latest = None;
                    partial = true;
                }
                Ok(response) => slot.latest = Some(response),
                Err(e) => {
                    counter!("cubeview_layer_render_failures_total").increment(1);
                    warn!(layer = %slot.layer.id(), error = %e, "Layer render failed");
                    slot.latest = None;
                    partial = true;
                }
            }
        }

        let mut compositor = Compositor::new(self.output_size);
        let mut layers = Vec::new();
        for slot in self.slots.iter().filter(|s| s.style.visible) {
            match &slot.latest {
                Some(response) => {
                    compositor.add(response.output(), &slot.style);
                    layers.push(slot.layer.id().clone());
                }
                None => partial = true,
            }
        }
        let (raster, graphics) = compositor.finish();

        let composite = Arc::new(Composite {
            generation,
            raster,
            graphics,
            layers,
            partial,
        });
        self.published_generation = generation;
        self.redraw_count += 1;
        self.composites.send_replace(Some(composite.clone()));
        counter!("cubeview_repaints_total").increment(1);

        debug!(
            generation,
            rendered = dirty.len(),
            layers = composite.layers.len(),
            partial,
            "Composite published"
        );
        composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use view_common::LayerOutput;

    struct Solid(LayerId);

    #[async_trait]
    impl Layer for Solid {
        fn id(&self) -> &LayerId {
            &self.0
        }

        async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
            let raster = Raster::from_rgba(
                request.output_size(),
                [10, 20, 30, 255].repeat(request.output_size().pixel_count()),
            )?;
            Ok(RenderResponse::new(
                self.0.clone(),
                request.generation(),
                LayerOutput::from_raster(raster),
            ))
        }
    }

    fn coordinator_with(ids: &[&str]) -> RenderCoordinator {
        let mut coordinator = RenderCoordinator::new(PixelSize::new(2, 2));
        for id in ids {
            coordinator.add_layer(Arc::new(Solid(LayerId::new(*id))), LayerStyle::default());
        }
        coordinator
    }

    #[test]
    fn test_notify_schedules_once() {
        let mut coordinator = coordinator_with(&["a", "b"]);
        // Adding layers already queued a repaint.
        assert!(coordinator.is_repaint_queued());
        assert!(!coordinator.notify_layer_changed(&LayerId::new("a")));
        assert!(!coordinator.notify_layer_changed(&LayerId::new("missing")));
        assert_eq!(
            coordinator.dirty_layers(),
            vec![LayerId::new("a"), LayerId::new("b")]
        );
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let mut coordinator = coordinator_with(&["a"]);
        assert!(!coordinator.add_layer(Arc::new(Solid(LayerId::new("a"))), LayerStyle::default()));
        assert_eq!(coordinator.layer_ids().len(), 1);
    }

    #[test]
    fn test_invalid_zoom_is_rejected() {
        let mut coordinator = coordinator_with(&[]);
        assert!(coordinator.set_zoom(Some(0.0)).is_err());
        assert!(coordinator.set_pan(Some(Point::new(f64::NAN, 1.0))).is_err());
        assert!(!coordinator.is_repaint_queued());
        assert!(coordinator.set_zoom(Some(2.0)).is_ok());
        assert_eq!(coordinator.view().zoom, Some(2.0));
    }

    #[tokio::test]
    async fn test_repaint_clears_dirty_state() {
        let mut coordinator = coordinator_with(&["a"]);
        let composite = coordinator.repaint_now().await;
        assert_eq!(composite.generation, 1);
        assert!(!composite.partial);
        assert!(!coordinator.is_repaint_queued());
        assert!(coordinator.dirty_layers().is_empty());
        assert_eq!(composite.raster.pixel(0, 0), Some([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn test_build_request_reflects_view() {
        let mut coordinator = coordinator_with(&["a", "b"]);
        coordinator.set_frames(vec![3, 1]);
        coordinator.set_pan(Some(Point::new(4.0, 5.0))).unwrap();
        coordinator.set_top_index(Some(0));

        let bottom = coordinator.build_request(0, 7).unwrap();
        let top = coordinator.build_request(1, 7).unwrap();
        assert_eq!(bottom.frames(), &[3, 1]);
        assert_eq!(bottom.pan(), Some(Point::new(4.0, 5.0)));
        assert!(!bottom.is_zoom_set());
        assert!(!bottom.is_stack_top());
        assert!(top.is_stack_top());
        assert_eq!(top.top_index(), Some(0));
        assert_eq!(top.generation(), 7);
        assert_eq!(top.layers(), &[LayerId::new("b")]);
    }
}
