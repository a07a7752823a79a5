//! Incremental plan parser.
//!
//! Turns the (possibly truncated) text accumulated from a plan-generation
//! stream into ordered [`PlanSection`]s. Structured JSON is tried first; plain
//! prose falls back to a line-oriented heuristic scan. Every call is a pure
//! function of the buffer it is given.

pub mod merge;
pub mod repair;
pub mod structured;
pub mod text;

use serde::{Deserialize, Serialize};
use structured::Decoded;
use tracing::debug;

/// `None` means nothing renderable could be derived from the buffer yet.
pub type ParseResult = Option<Vec<PlanSection>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Week,
    Day,
    Practice,
    TimeSlot,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub index: usize,
    pub kind: SectionKind,
    /// Numbering exactly as the source wrote it (`"week": 2`, `"day": 5`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<PlanTask>,
    pub expanded: bool,
    pub is_streaming: bool,
}

impl PlanSection {
    pub fn new(index: usize, kind: SectionKind, title: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            number: None,
            title: title.into(),
            time_window: None,
            duration: None,
            description: None,
            tasks: Vec::new(),
            expanded: index == 0,
            is_streaming: false,
        }
    }

    /// Append a task, deriving its id from the section and task positions.
    pub fn push_task(&mut self, text: impl Into<String>, date: Option<String>) {
        let id = task_id(self.index, self.tasks.len());
        self.tasks.push(PlanTask {
            id,
            text: text.into(),
            date,
            completed: false,
        });
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Owned by the caller. The parser always emits `false`.
    #[serde(default)]
    pub completed: bool,
}

pub fn task_id(section_index: usize, task_index: usize) -> String {
    format!("{}-{}", section_index, task_index)
}

/// Parse an accumulated stream buffer.
///
/// Called after every chunk with `is_final = false` and once more when the
/// stream ends with `is_final = true`, which clears `is_streaming` on every
/// section. Never fails: anything undecodable degrades to `None` or, for
/// prose, to a single fallback section.
pub fn parse(buffer: &str, is_final: bool) -> ParseResult {
    if buffer.trim().is_empty() {
        return None;
    }

    let mut sections = match structured::decode(buffer) {
        Decoded::Sections(sections) if !sections.is_empty() => sections,
        Decoded::Sections(_) => {
            if is_final {
                Vec::new()
            } else {
                return None;
            }
        }
        Decoded::Incomplete => {
            if !is_final {
                debug!("plan buffer looks structured but nothing is complete yet");
                return None;
            }
            debug!("structured plan never completed, falling back to text scan");
            text::decode(buffer)
        }
        Decoded::NotStructured => text::decode(buffer),
    };

    for section in &mut sections {
        section.expanded = section.index == 0;
        section.is_streaming = !is_final;
    }
    Some(sections)
}
