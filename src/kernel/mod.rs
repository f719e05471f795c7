pub mod conversation;
pub mod extractor;
pub mod heuristics;
pub mod resolver;
pub mod result;
pub mod short_term;
pub mod telemetry;
pub mod text;
pub mod time;
