//! Content-tag routing for remote media streams
//!
//! A peer announces what each of its streams carries (`webcam` or
//! `screenShare`) in a `content-tag` message, but the tag and the track can
//! reach the remote side in either order. [`ContentRouter`] parks whichever
//! half arrives first and routes the track once both are known.

use crate::protocol::ContentKind;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A track matched with its content tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedStream<T> {
    /// Remote stream id
    pub stream_id: String,
    /// Content carried by the stream
    pub kind: ContentKind,
    /// The track handle
    pub track: T,
}

/// Matches remote tracks with out-of-band content tags
///
/// Generic over the track handle so the pairing logic stays transport free.
/// Tags stay bound to their stream until [`ContentRouter::remove_stream`], so
/// every track of a tagged stream is routed, each exactly once.
#[derive(Debug)]
pub struct ContentRouter<T> {
    tags: HashMap<String, ContentKind>,
    unidentified: HashMap<String, Vec<T>>,
}

impl<T> Default for ContentRouter<T> {
    fn default() -> Self {
        Self {
            tags: HashMap::new(),
            unidentified: HashMap::new(),
        }
    }
}

impl<T> ContentRouter<T> {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content tag, releasing any tracks that were waiting for it
    pub fn on_tag(&mut self, stream_id: &str, kind: ContentKind) -> Vec<RoutedStream<T>> {
        if let Some(previous) = self.tags.insert(stream_id.to_string(), kind) {
            if previous != kind {
                warn!(stream_id, %previous, %kind, "Content tag changed for stream");
            }
        }

        self.unidentified
            .remove(stream_id)
            .unwrap_or_default()
            .into_iter()
            .map(|track| RoutedStream {
                stream_id: stream_id.to_string(),
                kind,
                track,
            })
            .collect()
    }

    /// Route a newly arrived track, or park it until its tag arrives
    pub fn on_track(&mut self, stream_id: &str, track: T) -> Option<RoutedStream<T>> {
        match self.tags.get(stream_id) {
            Some(&kind) => Some(RoutedStream {
                stream_id: stream_id.to_string(),
                kind,
                track,
            }),
            None => {
                debug!(stream_id, "Track arrived before its content tag, parking");
                self.unidentified
                    .entry(stream_id.to_string())
                    .or_default()
                    .push(track);
                None
            }
        }
    }

    /// Tag recorded for a stream
    pub fn kind_of(&self, stream_id: &str) -> Option<ContentKind> {
        self.tags.get(stream_id).copied()
    }

    /// Number of tracks waiting for a tag
    pub fn unidentified_count(&self) -> usize {
        self.unidentified.values().map(Vec::len).sum()
    }

    /// Forget a stream's tag and any parked tracks
    pub fn remove_stream(&mut self, stream_id: &str) {
        self.tags.remove(stream_id);
        self.unidentified.remove(stream_id);
    }

    /// Forget everything (the partner left)
    pub fn clear(&mut self) {
        self.tags.clear();
        self.unidentified.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_before_track() {
        let mut router = ContentRouter::new();
        assert!(router.on_tag("cam", ContentKind::Webcam).is_empty());

        let routed = router.on_track("cam", "track-1").unwrap();
        assert_eq!(routed.kind, ContentKind::Webcam);
        assert_eq!(routed.track, "track-1");
        assert_eq!(router.unidentified_count(), 0);
    }

    #[test]
    fn test_track_before_tag() {
        let mut router = ContentRouter::new();
        assert!(router.on_track("screen", "track-1").is_none());
        assert_eq!(router.unidentified_count(), 1);

        let routed = router.on_tag("screen", ContentKind::ScreenShare);
        assert_eq!(
            routed,
            vec![RoutedStream {
                stream_id: "screen".to_string(),
                kind: ContentKind::ScreenShare,
                track: "track-1",
            }]
        );
        assert_eq!(router.unidentified_count(), 0);
    }

    #[test]
    fn test_each_track_routed_once() {
        let mut router = ContentRouter::new();
        router.on_track("cam", 1);
        router.on_track("cam", 2);

        assert_eq!(router.on_tag("cam", ContentKind::Webcam).len(), 2);
        // A repeated tag does not re-route tracks that were already released
        assert!(router.on_tag("cam", ContentKind::Webcam).is_empty());
    }

    #[test]
    fn test_streams_are_independent() {
        let mut router = ContentRouter::new();
        router.on_track("cam", "a");
        router.on_tag("screen", ContentKind::ScreenShare);

        assert_eq!(router.unidentified_count(), 1);
        assert_eq!(router.kind_of("screen"), Some(ContentKind::ScreenShare));
        assert_eq!(router.kind_of("cam"), None);
    }

    #[test]
    fn test_remove_stream() {
        let mut router = ContentRouter::new();
        router.on_tag("cam", ContentKind::Webcam);
        router.on_track("other", "x");

        router.remove_stream("cam");
        assert!(router.on_track("cam", "y").is_none());

        router.clear();
        assert_eq!(router.unidentified_count(), 0);
    }
}
