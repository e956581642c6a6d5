//! End-to-end session runs.

use std::sync::Arc;

use histogram::PipelineConfig;
use storage::{ArtifactCache, CacheConfig};
use viewer::{Session, SessionConfig};

const SESSION: &str = r#"
view:
  width: 32
  height: 32
sources:
  - id: cube
    gaussian: { width: 16, height: 16, channels: 4, amplitude: 10.0, sigma: 3.0 }
    frequency: { start: 100.0, step: 10.0 }
layers:
  - id: image
    kind: image
    source: cube
    colormap: heat
    clip_percentile: [0.0, 1.0]
  - id: contours
    kind: contour
    source: cube
    levels: [5.0, 8.0]
    line_color: [255, 255, 255, 255]
steps:
  - frame: 1
  - zoom: 3.0
  - save: zoomed.png
  - hide: contours
  - resize: [20, 10]
  - save: small.png
  - histogram: { source: cube, bins: 8, channels: [0, 3], output: cube.hist }
  - histogram: { source: cube, bins: 8, channels: [0, 3], output: cube.hist }
  - histogram: { source: cube, bins: 8, channels: [0, 3], frequency: [115.0, 135.0] }
"#;

fn png_size(bytes: &[u8]) -> (u32, u32) {
    assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    (width, height)
}

#[tokio::test]
async fn test_session_saves_composites_and_histograms() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let cache_config = CacheConfig {
        path: dir.path().join("cache"),
        ..CacheConfig::default()
    };
    let cache = Arc::new(ArtifactCache::open(&cache_config).await);

    let config = SessionConfig::from_yaml(SESSION).unwrap();
    let session = Session::build(
        &config,
        cache.clone(),
        PipelineConfig::default(),
        dir.path(),
        &out,
    )
    .unwrap();
    let report = session.run(&config.steps).await.unwrap();

    // One paint per save; steps in between were coalesced.
    assert_eq!(report.repaints, 2);
    assert_eq!(report.partial_composites, 0);
    assert_eq!(report.saved.len(), 2);

    let zoomed = std::fs::read(out.join("zoomed.png")).unwrap();
    assert_eq!(png_size(&zoomed), (32, 32));
    let small = std::fs::read(out.join("small.png")).unwrap();
    assert_eq!(png_size(&small), (20, 10));

    assert_eq!(report.histograms.len(), 3);
    assert!(!report.histograms[0].reused);
    assert!(report.histograms[1].reused);
    assert_eq!(report.histograms[0].total, 16 * 16 * 4);
    // Channels at 120 and 130 Hz only.
    assert_eq!(report.histograms[2].total, 16 * 16 * 2);

    let table = std::fs::read_to_string(out.join("cube.hist")).unwrap();
    assert_eq!(table.lines().count(), 9);

    // Intensity tables for two frames plus two histograms.
    assert!(cache.entry_count() >= 3);
}

#[tokio::test]
async fn test_invalid_histogram_step_does_not_abort() {
    let text = r#"
sources:
  - id: cube
    gaussian: { width: 4, height: 4, channels: 2, amplitude: 1.0, sigma: 1.0 }
steps:
  - histogram: { source: cube, bins: 4, channels: [0, 5] }
  - histogram: { source: cube, bins: 4, channels: [0, 1] }
"#;
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::from_yaml(text).unwrap();
    let session = Session::build(
        &config,
        Arc::new(ArtifactCache::disabled()),
        PipelineConfig::default(),
        dir.path(),
        dir.path(),
    )
    .unwrap();

    let report = session.run(&config.steps).await.unwrap();
    assert_eq!(report.failed_histograms, 1);
    assert_eq!(report.histograms.len(), 1);
    assert_eq!(report.repaints, 0);
}
