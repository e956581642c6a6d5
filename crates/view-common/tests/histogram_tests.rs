//! Tests for histogram parameter identity and percentile queries.

use std::sync::Arc;

use view_common::{CubeShape, HistogramParameters, HistogramResult, ImageSource, ViewResult};

#[derive(Debug)]
struct FlatSource {
    id: String,
    shape: CubeShape,
    open: bool,
}

impl FlatSource {
    fn new(id: &str, channels: usize) -> Arc<dyn ImageSource> {
        Arc::new(Self {
            id: id.to_string(),
            shape: CubeShape::new(4, 4, channels),
            open: true,
        })
    }
}

impl ImageSource for FlatSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn shape(&self) -> CubeShape {
        self.shape
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_plane(&self, _channel: usize) -> ViewResult<Vec<f32>> {
        Ok(vec![1.0; self.shape.plane_len()])
    }
}

// ============================================================================
// Parameter identity
// ============================================================================

#[test]
fn test_identical_parameters_are_equal() {
    let source = FlatSource::new("cube", 10);
    let a = HistogramParameters::new(source.clone(), 64, (0, 9));
    let b = HistogramParameters::new(source, 64, (0, 9));
    // NaN auto ranges compare equal bit for bit
    assert_eq!(a, b);
    assert_eq!(a.cache_key(), b.cache_key());
}

#[test]
fn test_any_field_change_breaks_equality() {
    let source = FlatSource::new("cube", 10);
    let base = HistogramParameters::new(source.clone(), 64, (0, 9));

    assert_ne!(base, HistogramParameters::new(source.clone(), 32, (0, 9)));
    assert_ne!(base, HistogramParameters::new(source.clone(), 64, (1, 9)));
    assert_ne!(base, base.clone().with_intensity_range(0.0, 1.0));
    assert_ne!(base, base.clone().with_frequency_range(1.0e9, 2.0e9, "Hz"));
    assert_ne!(base, base.clone().with_output_file("/tmp/hist.txt"));
}

#[test]
fn test_distinct_handles_with_same_id_are_not_equal() {
    let a = HistogramParameters::new(FlatSource::new("cube", 10), 64, (0, 9));
    let b = HistogramParameters::new(FlatSource::new("cube", 10), 64, (0, 9));
    assert_ne!(a, b);
    // ...but they describe the same computation
    assert_eq!(a.cache_key(), b.cache_key());
}

#[test]
fn test_output_file_not_part_of_cache_key() {
    let source = FlatSource::new("cube", 10);
    let a = HistogramParameters::new(source.clone(), 8, (0, 0));
    let b = a.clone().with_output_file("out.txt");
    assert_eq!(a.cache_key(), b.cache_key());
}

#[test]
fn test_validate() {
    let source = FlatSource::new("cube", 4);
    assert!(HistogramParameters::new(source.clone(), 16, (0, 3)).validate().is_ok());
    assert!(HistogramParameters::new(source.clone(), 0, (0, 3)).validate().is_err());
    assert!(HistogramParameters::new(source.clone(), 16, (2, 1)).validate().is_err());
    assert!(HistogramParameters::new(source.clone(), 16, (0, 4)).validate().is_err());
    assert!(HistogramParameters::new(source.clone(), 16, (0, 3))
        .with_intensity_range(5.0, 5.0)
        .validate()
        .is_err());

    let closed: Arc<dyn ImageSource> = Arc::new(FlatSource {
        id: "closed".into(),
        shape: CubeShape::new(2, 2, 1),
        open: false,
    });
    assert!(HistogramParameters::new(closed, 16, (0, 0)).validate().is_err());
}

// ============================================================================
// Results
// ============================================================================

fn uniform_result() -> HistogramResult {
    let params = HistogramParameters::new(FlatSource::new("cube", 1), 4, (0, 0));
    HistogramResult::new(params, vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![10, 10, 10, 10]).unwrap()
}

#[test]
fn test_result_shape_is_checked() {
    let params = HistogramParameters::new(FlatSource::new("cube", 1), 4, (0, 0));
    assert!(HistogramResult::new(params.clone(), vec![0.0, 1.0], vec![1, 2]).is_err());
    assert!(HistogramResult::new(params.clone(), vec![1.0, 0.0], vec![1]).is_err());
    assert!(HistogramResult::new(params, vec![0.0], vec![]).is_err());
}

#[test]
fn test_intensity_at_percentile() {
    let result = uniform_result();
    assert_eq!(result.total(), 40);
    assert!((result.intensity_at_percentile(0.5).unwrap() - 2.0).abs() < 1e-9);
    assert!((result.intensity_at_percentile(0.25).unwrap() - 1.0).abs() < 1e-9);
    assert!((result.intensity_at_percentile(1.0).unwrap() - 4.0).abs() < 1e-9);
}

#[test]
fn test_percentile_of_intensity() {
    let result = uniform_result();
    assert!((result.percentile_of_intensity(2.0).unwrap() - 0.5).abs() < 1e-9);
    assert!((result.percentile_of_intensity(-1.0).unwrap() - 0.0).abs() < 1e-9);
    assert!((result.percentile_of_intensity(10.0).unwrap() - 1.0).abs() < 1e-9);
    assert!(result.percentile_of_intensity(f64::NAN).is_none());
}

#[test]
fn test_table_has_one_line_per_bin() {
    let table = uniform_result().to_table();
    assert_eq!(table.lines().count(), 5);
    assert!(table.lines().nth(1).unwrap().starts_with("0.5\t10"));
}
