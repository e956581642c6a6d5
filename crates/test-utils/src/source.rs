//! In-memory `ImageSource` for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use view_common::{CubeShape, ImageSource, ViewError, ViewResult};

/// A cube held in memory, with knobs for the failure paths.
///
/// - `close()` makes `is_open` false and every read fail
/// - `fail_channel(c)` makes reads of channel `c` fail
/// - `with_read_delay` slows each read down (blocking sleep)
/// - `reads()` counts plane reads, to assert on cache hits
#[derive(Debug)]
pub struct MemorySource {
    id: String,
    shape: CubeShape,
    planes: Vec<Vec<f32>>,
    frequencies: Option<Vec<f64>>,
    unit: String,
    open: AtomicBool,
    failing_channel: Option<usize>,
    read_delay: Option<Duration>,
    reads: AtomicUsize,
}

impl MemorySource {
    /// Build from per-channel planes; every plane must hold `width * height` samples.
    pub fn new(id: &str, width: usize, height: usize, planes: Vec<Vec<f32>>) -> Self {
        assert!(
            planes.iter().all(|p| p.len() == width * height),
            "plane size does not match {}x{}",
            width,
            height
        );
        Self {
            id: id.to_string(),
            shape: CubeShape::new(width, height, planes.len()),
            planes,
            frequencies: None,
            unit: "Jy/beam".to_string(),
            open: AtomicBool::new(true),
            failing_channel: None,
            read_delay: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Linear frequency axis: channel `c` at `start + c * step`.
    pub fn with_frequencies(mut self, start: f64, step: f64) -> Self {
        self.frequencies = Some(
            (0..self.shape.channels)
                .map(|c| start + c as f64 * step)
                .collect(),
        );
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn fail_channel(mut self, channel: usize) -> Self {
        self.failing_channel = Some(channel);
        self
    }

    pub fn into_arc(self) -> Arc<dyn ImageSource> {
        Arc::new(self)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Number of `read_plane` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ImageSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn shape(&self) -> CubeShape {
        self.shape
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn read_plane(&self, channel: usize) -> ViewResult<Vec<f32>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        if !self.is_open() {
            return Err(ViewError::SourceClosed(self.id.clone()));
        }
        if self.failing_channel == Some(channel) {
            return Err(ViewError::DataReadError(format!(
                "injected read failure on channel {}",
                channel
            )));
        }
        self.planes
            .get(channel)
            .cloned()
            .ok_or(ViewError::ChannelOutOfRange {
                channel,
                channels: self.shape.channels,
            })
    }

    fn frequency(&self, channel: usize) -> Option<f64> {
        self.frequencies.as_ref()?.get(channel).copied()
    }

    fn pixel_unit(&self) -> &str {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_channel_index_cube;

    #[test]
    fn test_reads_are_counted() {
        let source = MemorySource::new("cube", 2, 2, create_channel_index_cube(2, 2, 3));
        assert_eq!(source.read_plane(1).unwrap(), vec![1.0; 4]);
        assert!(source.read_plane(5).is_err());
        assert_eq!(source.reads(), 2);
    }

    #[test]
    fn test_closed_source_fails() {
        let source = MemorySource::new("cube", 1, 1, vec![vec![0.0]]);
        source.close();
        assert!(!source.is_open());
        assert!(source.read_plane(0).is_err());
    }

    #[test]
    fn test_frequency_axis() {
        let source = MemorySource::new("cube", 1, 1, vec![vec![0.0]; 3]).with_frequencies(1.0e9, 1.0e6);
        assert_eq!(source.frequency(2), Some(1.002e9));
        assert_eq!(source.frequency(3), None);
    }
}
