//! Event-driven coordinator task.
//!
//! The coordinator runs on one task that owns it. Events arriving in the same
//! scheduler tick are applied together and followed by at most one repaint.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use view_common::{LayerId, LayerStyle, PixelSize, Point, RenderResponse, SkyCoordinateSystem};

use crate::{Composite, RenderCoordinator};

/// Input to the coordinator task.
#[derive(Debug)]
pub enum CoordinatorEvent {
    LayerChanged(LayerId),
    /// A response delivered outside a repaint pass.
    ResponseReady(RenderResponse),
    LayerStyle(LayerId, LayerStyle),
    Resize(PixelSize),
    Frames(Vec<usize>),
    CoordinateSystem(SkyCoordinateSystem),
    Pan(Option<Point>),
    Zoom(Option<f64>),
    Shutdown,
}

/// Cloneable handle for talking to a spawned coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    composites: watch::Receiver<Option<Arc<Composite>>>,
}

impl CoordinatorHandle {
    /// Queue an event. Returns false once the coordinator task has stopped.
    pub fn send(&self, event: CoordinatorEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn notify_layer_changed(&self, id: &LayerId) -> bool {
        self.send(CoordinatorEvent::LayerChanged(id.clone()))
    }

    pub fn deliver_response(&self, response: RenderResponse) -> bool {
        self.send(CoordinatorEvent::ResponseReady(response))
    }

    pub fn set_client_view_size(&self, size: PixelSize) -> bool {
        self.send(CoordinatorEvent::Resize(size))
    }

    pub fn shutdown(&self) -> bool {
        self.send(CoordinatorEvent::Shutdown)
    }

    pub fn latest(&self) -> Option<Arc<Composite>> {
        self.composites.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Composite>>> {
        self.composites.clone()
    }

    /// Wait until a composite of at least `generation` is published.
    pub async fn wait_for_generation(&self, generation: u64) -> Option<Arc<Composite>> {
        let mut rx = self.composites.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(composite) = current {
                if composite.generation >= generation {
                    return Some(composite);
                }
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl RenderCoordinator {
    /// Move the coordinator onto its own task.
    ///
    /// The task stops on [`CoordinatorEvent::Shutdown`] or once every handle
    /// is dropped, and hands the coordinator back through the join handle.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<RenderCoordinator>) {
        let (events, rx) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle {
            events,
            composites: self.subscribe(),
        };
        let task = tokio::spawn(run(self, rx));
        (handle, task)
    }

    /// Apply one event. Returns false for `Shutdown`.
    pub fn apply(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::LayerChanged(id) => {
                self.notify_layer_changed(&id);
            }
            CoordinatorEvent::ResponseReady(response) => {
                self.deliver_response(response);
            }
            CoordinatorEvent::LayerStyle(id, style) => {
                self.set_layer_style(&id, style);
            }
            CoordinatorEvent::Resize(size) => {
                self.set_client_view_size(size);
            }
            CoordinatorEvent::Frames(frames) => self.set_frames(frames),
            CoordinatorEvent::CoordinateSystem(system) => self.set_coordinate_system(system),
            CoordinatorEvent::Pan(pan) => {
                if let Err(e) = self.set_pan(pan) {
                    warn!(error = %e, "Ignoring pan");
                }
            }
            CoordinatorEvent::Zoom(zoom) => {
                if let Err(e) = self.set_zoom(zoom) {
                    warn!(error = %e, "Ignoring zoom");
                }
            }
            CoordinatorEvent::Shutdown => return false,
        }
        true
    }
}

async fn run(
    mut coordinator: RenderCoordinator,
    mut events: mpsc::UnboundedReceiver<CoordinatorEvent>,
) -> RenderCoordinator {
    info!(layers = coordinator.layer_ids().len(), "Render coordinator started");

    // A repaint may already be pending from setup.
    if coordinator.is_repaint_queued() {
        coordinator.repaint_now().await;
    }

    while let Some(event) = events.recv().await {
        let mut running = coordinator.apply(event);

        // Let the rest of the burst land, then take all of it.
        tokio::task::yield_now().await;
        let mut applied = 1;
        while running {
            match events.try_recv() {
                Ok(event) => {
                    running = coordinator.apply(event);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        debug!(events = applied, "Applied event burst");

        if coordinator.is_repaint_queued() {
            coordinator.repaint_now().await;
        }
        if !running {
            break;
        }
    }

    info!(
        repaints = coordinator.redraw_count(),
        renders = coordinator.render_count(),
        "Render coordinator stopped"
    );
    coordinator
}
