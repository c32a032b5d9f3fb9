//! Merge (compaction) of sealed segments.
//!
//! A merge folds the live documents of several segments into one new segment,
//! in index-sort order, physically dropping deleted documents. It never touches
//! its inputs: the index state swaps the result in afterwards.
//!
//! ## Process
//!
//! 1. Pick segments (picker.rs)
//! 2. K-way merge their live documents (iterator.rs)
//! 3. Write the merged documents to a new segment
//! 4. Swap inputs for the output in the index state
//! 5. Delete input files once no snapshot holds them

pub mod iterator;
pub mod picker;

pub use iterator::MergeIterator;
pub use picker::{MergePicker, MergeReason, MergeTask};

use crate::config::SegmentConfig;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::segment::{SegmentBuilder, SegmentInfo};
use crate::state::SegmentEntry;
use crate::store::ByteStore;

/// Merges segments into one sorted segment
#[derive(Debug, Clone)]
pub struct Merger {
    config: SegmentConfig,
}

/// Result of a merge operation
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The published output segment
    pub info: SegmentInfo,
    /// Generations of the merged inputs
    pub input_generations: Vec<u64>,
    /// Deleted documents dropped by the merge
    pub dropped_docs: u64,
}

impl Merger {
    /// Create a merger writing segments with `config`
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// Returns the segment settings
    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Merge the live documents of `inputs` into segment `generation`.
    ///
    /// Fails with `MergeAborted` if the inputs hold no live documents; nothing
    /// is written in that case.
    pub fn merge(&self, inputs: &[SegmentEntry], store: &dyn ByteStore, generation: u64) -> Result<MergeResult> {
        let input_generations: Vec<u64> = inputs.iter().map(|s| s.generation()).collect();
        let live_docs: u64 = inputs.iter().map(|s| s.live_count() as u64).sum();
        let max_docs: u64 = inputs.iter().map(|s| s.max_doc() as u64).sum();

        if live_docs == 0 {
            return Err(Error::MergeAborted(format!(
                "no live documents in segments {:?}",
                input_generations
            )));
        }

        let mut schema = Schema::new();
        for input in inputs {
            if input.reader.sort() != &self.config.sort {
                return Err(Error::invalid_argument(format!(
                    "Segment {} sorted by {}, index sorted by {}",
                    input.generation(),
                    input.reader.sort(),
                    self.config.sort
                )));
            }
            schema.merge_from(input.reader.schema())?;
        }

        log::info!(
            "Starting merge: {} segments {:?} ({} live docs) -> segment {}",
            inputs.len(),
            input_generations,
            live_docs,
            generation
        );

        let mut builder =
            SegmentBuilder::new(generation, schema, self.config.sort.clone(), self.config.compression);
        for address in MergeIterator::new(inputs, self.config.sort.clone())? {
            let address = address?;
            let doc = inputs[address.segment].reader.document(address.ordinal)?;
            builder.add(&doc)?;
        }

        let info = builder.finish(store)?;

        log::info!(
            "Merge completed: {} docs written to {}, file size: {} bytes",
            info.doc_count,
            info.name,
            info.file_size
        );

        Ok(MergeResult { info, input_generations, dropped_docs: max_docs - live_docs })
    }
}
