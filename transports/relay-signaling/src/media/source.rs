//! Video track sources and sink registration

use crate::media::frame::{VideoFrame, VideoSink};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// What a sink asks of the frames delivered to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkWants {
    /// Deliver frames with rotation already applied to the pixels
    pub rotation_applied: bool,
}

/// Identifies one sink registration on a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        SinkId(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct SinkEntry {
    id: SinkId,
    sink: Arc<dyn VideoSink>,
    wants: SinkWants,
}

/// Producer of raw frames that fans out to registered sinks
///
/// Frames are pushed with [`deliver_frame`](Self::deliver_frame), typically
/// from a capture thread.
pub struct VideoTrackSource {
    name: String,
    sinks: RwLock<Vec<SinkEntry>>,
}

impl VideoTrackSource {
    /// Create a source with no sinks
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sinks: RwLock::new(Vec::new()),
        })
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `sink` under `id`, or update its wants if already registered
    pub fn add_or_update_sink(&self, id: SinkId, sink: Arc<dyn VideoSink>, wants: SinkWants) {
        let mut sinks = self.sinks.write();
        if let Some(entry) = sinks.iter_mut().find(|e| e.id == id) {
            entry.sink = sink;
            entry.wants = wants;
            return;
        }
        sinks.push(SinkEntry { id, sink, wants });
        debug!("Sink added to source {} ({} total)", self.name, sinks.len());
    }

    /// Unregister a sink; returns false if it was not registered
    pub fn remove_sink(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|e| e.id != id);
        let removed = sinks.len() != before;
        if removed {
            debug!("Sink removed from source {} ({} left)", self.name, sinks.len());
        }
        removed
    }

    /// Number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Whether `id` is registered
    pub fn has_sink(&self, id: SinkId) -> bool {
        self.sinks.read().iter().any(|e| e.id == id)
    }

    /// Deliver a frame to every sink
    ///
    /// Sinks are called outside the registry lock so they may add or remove
    /// sinks themselves.
    pub fn deliver_frame(&self, frame: &VideoFrame) {
        let snapshot: Vec<(Arc<dyn VideoSink>, SinkWants)> = self
            .sinks
            .read()
            .iter()
            .map(|e| (Arc::clone(&e.sink), e.wants))
            .collect();

        let mut rotated: Option<VideoFrame> = None;
        for (sink, wants) in snapshot {
            if wants.rotation_applied && frame.rotation != Default::default() {
                let rotated = rotated.get_or_insert_with(|| frame.with_rotation_applied());
                sink.on_frame(rotated);
            } else {
                sink.on_frame(frame);
            }
        }
    }
}

impl std::fmt::Debug for VideoTrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTrackSource")
            .field("name", &self.name)
            .field("sinks", &self.sink_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::VideoRotation;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<VideoFrame>>);

    impl VideoSink for Collect {
        fn on_frame(&self, frame: &VideoFrame) {
            self.0.lock().push(frame.clone());
        }
    }

    #[test]
    fn test_add_update_remove() {
        let source = VideoTrackSource::new("camera");
        let sink = Arc::new(Collect::default());
        let id = SinkId::next();

        source.add_or_update_sink(id, sink.clone(), SinkWants::default());
        source.add_or_update_sink(id, sink, SinkWants { rotation_applied: true });
        assert_eq!(source.sink_count(), 1);
        assert!(source.has_sink(id));

        assert!(source.remove_sink(id));
        assert!(!source.remove_sink(id));
        assert_eq!(source.sink_count(), 0);
    }

    #[test]
    fn test_rotation_applied_only_when_wanted() {
        let source = VideoTrackSource::new("camera");
        let raw = Arc::new(Collect::default());
        let upright = Arc::new(Collect::default());
        source.add_or_update_sink(SinkId::next(), raw.clone(), SinkWants::default());
        source.add_or_update_sink(
            SinkId::next(),
            upright.clone(),
            SinkWants { rotation_applied: true },
        );

        let frame = VideoFrame::filled(4, 2, 0xFF11_2233, 0).with_rotation(VideoRotation::Deg90);
        source.deliver_frame(&frame);

        let raw = raw.0.lock();
        let upright = upright.0.lock();
        assert_eq!(raw[0].rotation, VideoRotation::Deg90);
        assert_eq!((raw[0].width, raw[0].height), (4, 2));
        assert_eq!(upright[0].rotation, VideoRotation::Deg0);
        assert_eq!((upright[0].width, upright[0].height), (2, 4));
    }
}
