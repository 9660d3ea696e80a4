//! Type conversion functions for CLI to internal types.
//!
//! This module translates CLI-facing enums (from the `cli` module) to the
//! internal types used by the orchestrator and the output formatters.

use super::strategy::{Chunked, ExecutionStrategy, Sequential};
use crate::{
    cli::{Analysis, Format, Strategy},
    llm::AnalysisMode,
    output::OutputFormat
};

/// Converts a CLI strategy to an execution strategy.
///
/// `batch_size` only matters for the chunked strategy.
///
/// # Example
///
/// ```
/// use sql_exercise_grader::{app::convert_strategy, cli::Strategy};
///
/// let strategy = convert_strategy(Strategy::Chunked, 10);
/// assert_eq!(strategy.name(), "chunked");
/// ```
pub fn convert_strategy(strategy: Strategy, batch_size: usize) -> Box<dyn ExecutionStrategy> {
    match strategy {
        Strategy::Sequential => Box::new(Sequential),
        Strategy::Chunked => Box::new(Chunked::new(batch_size))
    }
}

/// Converts a CLI analysis depth to the LLM analysis mode.
pub fn convert_analysis(analysis: Analysis) -> AnalysisMode {
    match analysis {
        Analysis::Comprehensive => AnalysisMode::Comprehensive,
        Analysis::Granular => AnalysisMode::Granular
    }
}

/// Converts a CLI format enum to the internal output format type.
///
/// # Example
///
/// ```
/// use sql_exercise_grader::{app::convert_format, cli::Format, output::OutputFormat};
///
/// let format = convert_format(Format::Json);
/// assert!(matches!(format, OutputFormat::Json));
/// ```
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml
    }
}
