use std::cmp::Ordering;

use ffmpeg_next::Rational;

use crate::stream::MediaKind;
use crate::timestamp::compare;

/// A stream that still has input, as seen by the pacer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub kind: MediaKind,
    /// Timestamp of the next frame the stream would encode.
    pub next_pts: i64,
    pub time_base: Rational,
}

/// Chooses which stream advances next so that the streams move along a
/// shared clock.
#[derive(Debug, Clone)]
pub struct Pacer {
    priority: Vec<MediaKind>,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(vec![MediaKind::Video, MediaKind::Audio])
    }
}

impl Pacer {
    /// `priority` breaks ties between streams due at the same instant. Kinds
    /// not listed rank after listed ones.
    pub fn new(priority: Vec<MediaKind>) -> Self {
        Self { priority }
    }

    fn rank(&self, kind: MediaKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }

    /// Returns the `index` of the earliest candidate, or `None` when every
    /// stream is finished.
    pub fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        candidates
            .iter()
            .min_by(|a, b| self.order(a, b))
            .map(|c| c.index)
    }

    fn order(&self, a: &Candidate, b: &Candidate) -> Ordering {
        compare(a.next_pts, a.time_base, b.next_pts, b.time_base)
            .then_with(|| self.rank(a.kind).cmp(&self.rank(b.kind)))
            .then_with(|| a.index.cmp(&b.index))
    }
}
