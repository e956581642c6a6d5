//! Integration tests for the render coordinator and its event loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use compositor::{CoordinatorEvent, CoordinatorHandle, Layer, RenderCoordinator, RenderError};
use view_common::{
    LayerId, LayerOutput, LayerStyle, PixelSize, Point, Polyline, Raster, RenderRequest,
    RenderResponse, VectorGraphics,
};

const WAIT: Duration = Duration::from_secs(10);

/// Layer that paints a solid color plus one polyline tagged with its level,
/// and can be told to fail, panic or return nothing.
struct ScriptedLayer {
    id: LayerId,
    color: [u8; 4],
    tag: f64,
    fail: AtomicBool,
    panics: AtomicBool,
    empty: AtomicBool,
    renders: AtomicUsize,
    requests: Mutex<Vec<RenderRequest>>,
    /// Notified once from inside the first render.
    renotify: OnceLock<CoordinatorHandle>,
}

impl ScriptedLayer {
    fn new(id: &str, color: [u8; 4], tag: f64) -> Arc<Self> {
        Arc::new(Self {
            id: LayerId::new(id),
            color,
            tag,
            fail: AtomicBool::new(false),
            panics: AtomicBool::new(false),
            empty: AtomicBool::new(false),
            renders: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            renotify: OnceLock::new(),
        })
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> RenderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    fn response(&self, generation: u64, size: PixelSize) -> RenderResponse {
        let raster = Raster::from_rgba(size, self.color.repeat(size.pixel_count())).unwrap();
        let mut graphics = VectorGraphics::new();
        graphics.push(Polyline {
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            closed: false,
            pen: Default::default(),
            level: Some(self.tag),
        });
        RenderResponse::new(
            self.id.clone(),
            generation,
            LayerOutput {
                raster: Some(raster),
                graphics,
            },
        )
    }
}

#[async_trait]
impl Layer for ScriptedLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }

    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        let count = self.renders.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if count == 0 {
            if let Some(handle) = self.renotify.get() {
                handle.notify_layer_changed(&self.id);
            }
        }
        tokio::task::yield_now().await;

        if self.panics.load(Ordering::SeqCst) {
            panic!("layer {} blew up", self.id);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::layer_failed(&self.id, "scripted failure"));
        }
        if self.empty.load(Ordering::SeqCst) {
            return Ok(RenderResponse::new(
                self.id.clone(),
                request.generation(),
                LayerOutput::default(),
            ));
        }
        Ok(self.response(request.generation(), request.output_size()))
    }
}

fn size() -> PixelSize {
    PixelSize::new(4, 3)
}

fn stack(layers: &[&Arc<ScriptedLayer>]) -> RenderCoordinator {
    let mut coordinator = RenderCoordinator::new(size());
    for layer in layers {
        let layer: Arc<dyn Layer> = Arc::clone(*layer) as Arc<dyn Layer>;
        assert!(coordinator.add_layer(layer, LayerStyle::default()));
    }
    coordinator
}

fn tags(graphics: &VectorGraphics) -> Vec<f64> {
    graphics.items().iter().filter_map(|p| p.level).collect()
}

#[tokio::test]
async fn test_burst_of_notifications_renders_union_once() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let c = ScriptedLayer::new("c", [0, 0, 255, 255], 3.0);
    let mut coordinator = stack(&[&a, &b, &c]);
    coordinator.repaint_now().await;

    assert!(coordinator.notify_layer_changed(&LayerId::new("a")));
    for _ in 0..4 {
        assert!(!coordinator.notify_layer_changed(&LayerId::new("a")));
        assert!(!coordinator.notify_layer_changed(&LayerId::new("b")));
    }
    assert_eq!(coordinator.dirty_layers().len(), 2);

    let composite = coordinator.repaint_now().await;
    assert_eq!(composite.generation, 2);
    assert_eq!((a.renders(), b.renders(), c.renders()), (2, 2, 1));
    assert_eq!(coordinator.redraw_count(), 2);
    assert_eq!(coordinator.render_count(), 5);
    // Layer c was not re-rendered but is still part of the composite.
    assert_eq!(tags(&composite.graphics), vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_failed_layer_is_skipped_and_flagged() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let c = ScriptedLayer::new("c", [0, 0, 255, 128], 3.0);
    b.fail.store(true, Ordering::SeqCst);
    let mut coordinator = stack(&[&a, &b, &c]);

    let composite = coordinator.repaint_now().await;
    assert!(composite.partial);
    assert_eq!(composite.layers, vec![LayerId::new("a"), LayerId::new("c")]);
    assert_eq!(tags(&composite.graphics), vec![1.0, 3.0]);

    // Half-transparent blue over opaque red, no green from the failed layer.
    let px = composite.raster.pixel(0, 0).unwrap();
    assert!(px[0] > 100 && px[2] > 100);
    assert_eq!(px[1], 0);
    assert_eq!(px[3], 255);
}

#[tokio::test]
async fn test_panicking_layer_does_not_stop_the_loop() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let c = ScriptedLayer::new("c", [0, 0, 255, 255], 3.0);
    b.panics.store(true, Ordering::SeqCst);

    let (handle, task) = stack(&[&a, &b, &c]).spawn();
    let composite = tokio::time::timeout(WAIT, handle.wait_for_generation(1))
        .await
        .unwrap()
        .unwrap();
    assert!(composite.partial);
    assert_eq!(composite.layers, vec![LayerId::new("a"), LayerId::new("c")]);
    assert_eq!(tags(&composite.graphics), vec![1.0, 3.0]);

    // The loop is still alive and picks the layer up once it recovers.
    b.panics.store(false, Ordering::SeqCst);
    handle.notify_layer_changed(&LayerId::new("b"));
    let composite = tokio::time::timeout(WAIT, handle.wait_for_generation(2))
        .await
        .unwrap()
        .unwrap();
    assert!(!composite.partial);
    assert_eq!(tags(&composite.graphics), vec![1.0, 2.0, 3.0]);

    handle.shutdown();
    let coordinator = task.await.unwrap();
    assert_eq!(coordinator.redraw_count(), 2);
    assert_eq!(b.renders(), 2);
}

#[tokio::test]
async fn test_empty_layer_is_skipped() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    b.empty.store(true, Ordering::SeqCst);
    let mut coordinator = stack(&[&a, &b]);

    let composite = coordinator.repaint_now().await;
    assert!(composite.partial);
    assert_eq!(composite.layers, vec![LayerId::new("a")]);

    b.empty.store(false, Ordering::SeqCst);
    coordinator.notify_layer_changed(&LayerId::new("b"));
    let composite = coordinator.repaint_now().await;
    assert!(!composite.partial);
    assert_eq!(composite.layers.len(), 2);
}

#[tokio::test]
async fn test_hidden_layer_is_neither_rendered_nor_drawn() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    let hidden = LayerStyle {
        visible: false,
        ..LayerStyle::default()
    };
    coordinator.set_layer_style(&LayerId::new("b"), hidden);

    let composite = coordinator.repaint_now().await;
    assert_eq!(b.renders(), 0);
    assert_eq!(composite.layers, vec![LayerId::new("a")]);
    assert!(!composite.partial);
    assert_eq!(composite.raster.pixel(0, 0), Some([255, 0, 0, 255]));
    assert!(a.last_request().is_stack_top());

    // Showing it again marks it dirty.
    assert!(coordinator.set_layer_style(&LayerId::new("b"), LayerStyle::default()));
    assert_eq!(coordinator.dirty_layers(), vec![LayerId::new("b")]);
    let composite = coordinator.repaint_now().await;
    assert_eq!(b.renders(), 1);
    assert!(b.last_request().is_stack_top());
    assert_eq!(composite.raster.pixel(0, 0), Some([0, 255, 0, 255]));
}

#[tokio::test]
async fn test_stale_late_response_is_dropped() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let mut coordinator = stack(&[&a]);
    coordinator.repaint_now().await;
    coordinator.notify_layer_changed(&LayerId::new("a"));
    coordinator.repaint_now().await;
    assert_eq!(coordinator.published_generation(), 2);

    assert!(!coordinator.deliver_response(a.response(1, size())));
    assert!(!coordinator.is_repaint_queued());

    assert!(coordinator.deliver_response(a.response(2, size())));
    assert!(coordinator.is_repaint_queued());
    let composite = coordinator.repaint_now().await;
    assert_eq!(composite.generation, 3);
    // Nothing was dirty; the delivered response was recomposited.
    assert_eq!(a.renders(), 2);
}

#[tokio::test]
async fn test_generations_are_published_in_order() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let mut coordinator = stack(&[&a]);
    let mut composites = coordinator.subscribe();

    let mut seen = Vec::new();
    for _ in 0..3 {
        coordinator.notify_layer_changed(&LayerId::new("a"));
        coordinator.repaint_now().await;
        let latest = composites.borrow_and_update().clone().unwrap();
        seen.push(latest.generation);
    }
    assert_eq!(seen, vec![1, 2, 3]);
    let requested: Vec<u64> = a
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.generation())
        .collect();
    assert_eq!(requested, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_resize_rerenders_every_layer() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    let mut resizes = coordinator.subscribe_resize();
    coordinator.repaint_now().await;

    let bigger = PixelSize::new(8, 6);
    assert!(coordinator.set_client_view_size(bigger));
    assert!(!coordinator.set_client_view_size(bigger));
    assert_eq!(resizes.try_recv().unwrap(), bigger);
    assert_eq!(coordinator.client_view_size(), bigger);
    assert_eq!(coordinator.dirty_layers().len(), 2);

    let composite = coordinator.repaint_now().await;
    assert_eq!(composite.raster.size(), bigger);
    assert_eq!(a.last_request().output_size(), bigger);
    assert_eq!(b.renders(), 2);
}

#[tokio::test]
async fn test_view_changes_mark_all_layers_dirty() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    coordinator.repaint_now().await;

    coordinator.set_zoom(Some(2.5)).unwrap();
    coordinator.set_pan(Some(Point::new(1.0, 2.0))).unwrap();
    coordinator.set_frames(vec![4]);
    assert_eq!(coordinator.dirty_layers().len(), 2);
    coordinator.repaint_now().await;

    let request = a.last_request();
    assert_eq!(request.zoom(), Some(2.5));
    assert_eq!(request.pan(), Some(Point::new(1.0, 2.0)));
    assert_eq!(request.channel(), 4);
    assert!(!request.is_stack_top());
    assert!(b.last_request().is_stack_top());

    // Unchanged values do not trigger anything.
    coordinator.set_zoom(Some(2.5)).unwrap();
    coordinator.set_frames(vec![4]);
    assert!(!coordinator.is_repaint_queued());
}

#[tokio::test]
async fn test_event_loop_coalesces_a_burst() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 255, 0, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    coordinator.repaint_now().await;

    let (handle, task) = coordinator.spawn();
    for _ in 0..5 {
        handle.notify_layer_changed(&LayerId::new("a"));
        handle.notify_layer_changed(&LayerId::new("b"));
    }

    let composite = tokio::time::timeout(WAIT, handle.wait_for_generation(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(composite.generation, 2);

    handle.shutdown();
    let coordinator = task.await.unwrap();
    assert_eq!(coordinator.redraw_count(), 2);
    assert_eq!((a.renders(), b.renders()), (2, 2));
}

#[tokio::test]
async fn test_notification_during_repaint_schedules_another() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let coordinator = stack(&[&a]);

    let (handle, task) = coordinator.spawn();
    assert!(a.renotify.set(handle.clone()).is_ok());
    handle.notify_layer_changed(&LayerId::new("a"));

    let composite = tokio::time::timeout(WAIT, handle.wait_for_generation(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(composite.generation, 2);

    handle.shutdown();
    let coordinator = task.await.unwrap();
    assert_eq!(a.renders(), 2);
    assert!(!coordinator.is_repaint_queued());
}

#[tokio::test]
async fn test_event_loop_accepts_late_responses() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    a.empty.store(true, Ordering::SeqCst);
    let coordinator = stack(&[&a]);

    let (handle, task) = coordinator.spawn();
    let first = tokio::time::timeout(WAIT, handle.wait_for_generation(1))
        .await
        .unwrap()
        .unwrap();
    assert!(first.partial);

    assert!(handle.send(CoordinatorEvent::ResponseReady(a.response(1, size()))));
    let second = tokio::time::timeout(WAIT, handle.wait_for_generation(2))
        .await
        .unwrap()
        .unwrap();
    assert!(!second.partial);
    assert_eq!(second.raster.pixel(1, 1), Some([255, 0, 0, 255]));

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(a.renders(), 1);
}

#[tokio::test]
async fn test_removed_layer_leaves_composite() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 0, 255, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    coordinator.repaint_now().await;

    assert!(coordinator.remove_layer(&LayerId::new("b")));
    assert!(!coordinator.remove_layer(&LayerId::new("b")));
    assert!(coordinator.is_repaint_queued());
    assert_eq!(coordinator.layer_ids(), vec![LayerId::new("a")]);

    let composite = coordinator.repaint_now().await;
    assert_eq!(composite.layers, vec![LayerId::new("a")]);
    assert_eq!(tags(&composite.graphics), vec![1.0]);
    // Nothing was dirty; the held response of "a" was reused.
    assert_eq!(a.renders(), 1);
}

#[tokio::test]
async fn test_top_index_reaches_every_layer() {
    let a = ScriptedLayer::new("a", [255, 0, 0, 255], 1.0);
    let b = ScriptedLayer::new("b", [0, 0, 255, 255], 2.0);
    let mut coordinator = stack(&[&a, &b]);
    coordinator.repaint_now().await;

    coordinator.set_top_index(Some(0));
    assert!(coordinator.is_repaint_queued());
    coordinator.repaint_now().await;

    assert_eq!(a.last_request().top_index(), Some(0));
    assert_eq!(b.last_request().top_index(), Some(0));
    assert!(!a.last_request().is_stack_top());
    assert!(b.last_request().is_stack_top());

    // Setting the same index again changes nothing.
    coordinator.set_top_index(Some(0));
    assert!(!coordinator.is_repaint_queued());
}
