//! Built-in tools for Daisy.
//!
//! Each tool takes one free-text argument, because that is what the
//! reasoning loop extracts from the model's step. Example phrases on every
//! tool feed the command matcher.

pub mod calculator;
pub mod clock;
pub mod weather;

use std::sync::Arc;

use daisy_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;
pub use weather::WeatherTool;

/// Create a registry with all built-in tools, in a fixed order.
///
/// Order matters: it breaks ties between equally confident matches.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WeatherTool));
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(ClockTool));
    registry
}
