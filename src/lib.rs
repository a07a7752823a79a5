//! Streaming plan client for the qisu wellbeing backend.
//!
//! [`stream`] assembles server-sent events into a growing buffer, [`plan`]
//! turns any prefix of that buffer into renderable sections, and [`flow`]
//! folds successive results into a view that keeps the user's own state.

pub mod cli;
pub mod client;
pub mod config;
pub mod flow;
pub mod logging;
pub mod paths;
pub mod plan;
pub mod render;
pub mod stream;

pub use plan::{parse, ParseResult, PlanSection, PlanTask, SectionKind};
pub use stream::{PlanStream, PlanUpdate, SseAssembler, StreamPhase};
