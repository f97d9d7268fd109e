pub mod analysis_queue;
pub mod processing_counter;

pub use analysis_queue::{
    AnalysisQueue, BookRequest, EnqueueReceipt, JobError, QueueError, process_book,
};
pub use processing_counter::ProcessingCounter;
