//! Merge candidate selection.
//!
//! Two triggers are checked in order:
//! - segment count: more than `merge_factor` segments merges the smallest
//!   (by live document count) together;
//! - deletions: a segment whose deleted ratio exceeds `deletes_pct_allowed`
//!   is rewritten on its own, which drops its deleted documents.

use crate::config::Options;
use crate::state::SegmentEntry;

/// Why a merge was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many segments
    SegmentCount,
    /// A segment carries too many deletions
    Deletes,
    /// Requested through `force_merge`
    Forced,
}

/// A merge task selected by the picker
#[derive(Debug, Clone)]
pub struct MergeTask {
    /// Input segments, in segment-list order
    pub inputs: Vec<SegmentEntry>,
    /// Trigger that selected the inputs
    pub reason: MergeReason,
}

/// Picker for selecting segments to merge
#[derive(Debug, Clone)]
pub struct MergePicker {
    merge_factor: usize,
    max_merge_at_once: usize,
    deletes_pct_allowed: f64,
}

impl MergePicker {
    /// Create a new merge picker
    pub fn new(merge_factor: usize, max_merge_at_once: usize, deletes_pct_allowed: f64) -> Self {
        Self { merge_factor, max_merge_at_once, deletes_pct_allowed }
    }

    /// Create a picker from index options
    pub fn from_options(options: &Options) -> Self {
        Self::new(options.merge_factor, options.max_merge_at_once, options.deletes_pct_allowed)
    }

    /// Pick segments for a policy-driven merge
    ///
    /// Returns None if no merge is needed
    pub fn pick_merge(&self, segments: &[SegmentEntry]) -> Option<MergeTask> {
        if segments.len() > self.merge_factor {
            let count = self.max_merge_at_once.min(segments.len());
            log::debug!(
                "Picking count-triggered merge: {} segments > merge factor {}, merging {}",
                segments.len(),
                self.merge_factor,
                count
            );
            return Some(MergeTask {
                inputs: smallest(segments, count),
                reason: MergeReason::SegmentCount,
            });
        }

        let worst = segments
            .iter()
            .filter(|s| s.delete_ratio() > self.deletes_pct_allowed)
            .max_by(|a, b| a.delete_ratio().total_cmp(&b.delete_ratio()))?;

        log::debug!(
            "Picking delete-triggered rewrite of segment {} ({:.0}% deleted)",
            worst.generation(),
            worst.delete_ratio() * 100.0
        );
        Some(MergeTask { inputs: vec![worst.clone()], reason: MergeReason::Deletes })
    }

    /// Pick segments to bring the index down to `max_segments`
    ///
    /// Once at or below the target, segments that still carry deletions are
    /// rewritten one at a time. Returns None when nothing is left to do.
    pub fn pick_forced_merge(&self, segments: &[SegmentEntry], max_segments: usize) -> Option<MergeTask> {
        let max_segments = max_segments.max(1);

        if segments.len() > max_segments {
            let count = segments.len() - max_segments + 1;
            return Some(MergeTask { inputs: smallest(segments, count), reason: MergeReason::Forced });
        }

        let with_deletes = segments.iter().find(|s| s.live.has_deletions())?;
        Some(MergeTask { inputs: vec![with_deletes.clone()], reason: MergeReason::Forced })
    }
}

/// The `count` smallest segments by live documents, returned in list order.
fn smallest(segments: &[SegmentEntry], count: usize) -> Vec<SegmentEntry> {
    let mut positions: Vec<usize> = (0..segments.len()).collect();
    positions.sort_by_key(|&i| (segments[i].live_count(), segments[i].generation()));
    positions.truncate(count);
    positions.sort_unstable();
    positions.into_iter().map(|i| segments[i].clone()).collect()
}
