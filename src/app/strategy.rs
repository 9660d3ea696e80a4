//! How a run walks its file list.
//!
//! Both strategies process files strictly one after another; they differ
//! only in how the list is grouped and how progress is reported.

use crate::exercise::ExerciseFile;

/// Groups files into the batches a run processes in order.
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Contiguous batches covering every file exactly once, in order.
    fn partition<'a>(&self, files: &'a [ExerciseFile]) -> Vec<&'a [ExerciseFile]>;

    /// Report progress every N files instead of once per batch.
    fn per_file_progress(&self) -> bool {
        true
    }
}

/// The whole list as a single batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ExecutionStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn partition<'a>(&self, files: &'a [ExerciseFile]) -> Vec<&'a [ExerciseFile]> {
        if files.is_empty() {
            Vec::new()
        } else {
            vec![files]
        }
    }
}

/// Fixed-size batches with a progress message after each one.
#[derive(Debug, Clone, Copy)]
pub struct Chunked {
    size: usize
}

impl Chunked {
    /// A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1)
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl ExecutionStrategy for Chunked {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn partition<'a>(&self, files: &'a [ExerciseFile]) -> Vec<&'a [ExerciseFile]> {
        files.chunks(self.size).collect()
    }

    fn per_file_progress(&self) -> bool {
        false
    }
}
