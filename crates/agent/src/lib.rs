//! The task execution engine.
//!
//! - [`RequestChannel`]: streaming completions with retry, timeout and cancellation
//! - [`SentenceSegmenter`]: splits a growing answer into sentences
//! - [`NarrationPipeline`]: speaks finalized sentences while the answer streams
//! - [`ReasoningLoop`]: picks and runs tools until a task is done
//! - [`Assistant`]: one conversational turn built from the above

pub mod assistant;
pub mod narration;
pub mod reasoning;
pub mod request;
pub mod segmenter;

#[cfg(test)]
mod test_helpers;

pub use assistant::{Assistant, Description, Reply};
pub use narration::{AudioQueue, NarrationHandle, NarrationPipeline, NarrationReport};
pub use reasoning::{ASK, ReasoningLoop, ReasoningStep, TASK_COMPLETE, TaskOutcome};
pub use request::{ChunkObserver, Completion, RequestChannel, RequestError, RequestHooks};
pub use segmenter::{SentenceSegmenter, StreamSnapshot, split_sentences};
