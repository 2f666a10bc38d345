//! # Daisy Commands
//!
//! Picks the tool best suited to a task by comparing the task's embedding
//! with example phrases recorded for every tool.
//!
//! - [`similarity`]: cosine similarity over embedding vectors
//! - [`modules`]: the `module-<tool>.json` example files and their index
//! - [`matcher`]: candidates, ranking, and the embed-then-match entry point

pub mod matcher;
pub mod modules;
pub mod similarity;

pub use matcher::{
    CommandCandidate, CommandMatcher, MatchError, MatchOutcome, MatchResult, RankedCommand,
    match_command,
};
pub use modules::{ExampleIndex, ModuleError, ModuleExample, ModuleFile, ModuleInfo};
pub use similarity::cosine_similarity;
