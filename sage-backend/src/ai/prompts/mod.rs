//! System prompts for the three agents, compiled into the binary

/// Agent 1: query classification and search planning
pub const CLASSIFIER: &str = include_str!("classifier.md");

/// Agent 2: curated extraction from encyclopedia articles
pub const EXTRACTOR: &str = include_str!("extractor.md");

/// Agent 3: final answer synthesis
pub const WRITER: &str = include_str!("writer.md");
