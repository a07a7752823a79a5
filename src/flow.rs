//! Questionnaire answers, the step the user is on, and the plan view the
//! streaming updates are folded into.

use crate::plan::{merge::carry_completion, PlanSection};
use crate::stream::PlanUpdate;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

const STATE_FILE: &str = "flow.json";

/// Everything the backend needs to personalise a plan. Field names follow
/// the backend's `flowData` payload; unknown keys are carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_concerns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_improvements: Option<String>,
    #[serde(
        rename = "problemDescription",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub problem_description: Option<String>,
    #[serde(rename = "relationshipType", default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(rename = "incidentProcess", default, skip_serializing_if = "Option::is_none")]
    pub incident_process: Option<String>,
    #[serde(rename = "additionalInfo", default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(rename = "aiAnalysis", default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowData {
    /// Set one answer by its wire name. Unknown names land in `extra`; an
    /// empty value clears the answer.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("flow key cannot be empty");
        }
        let mut wire = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if value.trim().is_empty() {
            wire.remove(key);
        } else {
            wire.insert(key.to_string(), Value::String(value.to_string()));
        }
        *self = serde_json::from_value(Value::Object(wire))
            .with_context(|| format!("cannot set flow key {}", key))?;
        Ok(())
    }

    /// Answers in wire order, for display.
    pub fn entries(&self) -> Vec<(String, String)> {
        let Ok(Value::Object(map)) = serde_json::to_value(self) else {
            return Vec::new();
        };
        map.into_iter()
            .map(|(k, v)| {
                let shown = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, shown)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == FlowData::default()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    #[default]
    Questionnaire,
    Analysis,
    Treatment,
    Daily,
}

impl FlowStep {
    pub fn next(self) -> Option<FlowStep> {
        match self {
            FlowStep::Questionnaire => Some(FlowStep::Analysis),
            FlowStep::Analysis => Some(FlowStep::Treatment),
            FlowStep::Treatment => Some(FlowStep::Daily),
            FlowStep::Daily => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowStep::Questionnaire => "questionnaire",
            FlowStep::Analysis => "analysis",
            FlowStep::Treatment => "treatment",
            FlowStep::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewStatus {
    #[default]
    Idle,
    Streaming,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanViewEvent {
    Started,
    Update(PlanUpdate),
    ToggleSection(usize),
    ToggleTask { section: usize, task: usize },
    Reset,
}

/// What a plan screen shows. Parser output is folded in with the user's
/// completion and expansion state carried over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanView {
    pub content: String,
    pub sections: Vec<PlanSection>,
    pub status: ViewStatus,
}

impl PlanView {
    pub fn apply(&mut self, event: PlanViewEvent) {
        match event {
            PlanViewEvent::Started => {
                self.content.clear();
                self.sections.clear();
                self.status = ViewStatus::Streaming;
            }
            PlanViewEvent::Update(PlanUpdate::Partial { content, sections }) => {
                self.content = content;
                // No parse yet: keep showing the last good sections.
                if let Some(next) = sections {
                    self.sections = carry_completion(&self.sections, next);
                }
                self.status = ViewStatus::Streaming;
            }
            PlanViewEvent::Update(PlanUpdate::Complete { content, sections }) => {
                self.content = content;
                self.sections = carry_completion(&self.sections, sections.unwrap_or_default());
                self.status = ViewStatus::Ready;
            }
            PlanViewEvent::Update(PlanUpdate::Failed { message, content }) => {
                self.content = content;
                for section in &mut self.sections {
                    section.is_streaming = false;
                }
                self.status = ViewStatus::Failed(message);
            }
            PlanViewEvent::ToggleSection(index) => {
                if let Some(section) = self.sections.get_mut(index) {
                    section.expanded = !section.expanded;
                }
            }
            PlanViewEvent::ToggleTask { section, task } => {
                if let Some(task) = self
                    .sections
                    .get_mut(section)
                    .and_then(|s| s.tasks.get_mut(task))
                {
                    task.completed = !task.completed;
                }
            }
            PlanViewEvent::Reset => *self = PlanView::default(),
        }
    }

    /// `(completed, total)` across all sections.
    pub fn progress(&self) -> (usize, usize) {
        self.sections.iter().fold((0, 0), |(done, total), s| {
            (done + s.completed_count(), total + s.tasks.len())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    #[serde(default)]
    pub flow: FlowData,
    #[serde(default)]
    pub step: FlowStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct FlowStore {
    root: PathBuf,
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStore {
    pub fn new() -> Self {
        Self {
            root: crate::paths::state_dir(),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Missing file means a fresh questionnaire.
    pub fn load(&self) -> Result<FlowState> {
        let path = self.path();
        if !path.exists() {
            return Ok(FlowState::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("corrupt flow state at {}", path.display()))?;
        Ok(state)
    }

    pub fn save(&self, state: &mut FlowState) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        state.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(state)?;
        fs::write(self.path(), json)?;
        tracing::debug!("flow state saved at step {}", state.step.as_str());
        Ok(())
    }

    /// Returns whether there was anything to remove.
    pub fn reset(&self) -> Result<bool> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::parse;

    fn temp_store() -> (FlowStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::with_root(dir.path().join("state"));
        (store, dir)
    }

    fn partial(buffer: &str) -> PlanViewEvent {
        PlanViewEvent::Update(PlanUpdate::Partial {
            content: buffer.to_string(),
            sections: parse(buffer, false),
        })
    }

    fn complete(buffer: &str) -> PlanViewEvent {
        PlanViewEvent::Update(PlanUpdate::Complete {
            content: buffer.to_string(),
            sections: parse(buffer, true),
        })
    }

    #[test]
    fn flow_data_uses_backend_field_names() {
        let data: FlowData = serde_json::from_str(
            r#"{"age":"28","emotional_state":"焦虑","problemDescription":"失眠","mbti":"INFP"}"#,
        )
        .unwrap();
        assert_eq!(data.emotional_state.as_deref(), Some("焦虑"));
        assert_eq!(data.problem_description.as_deref(), Some("失眠"));
        assert_eq!(data.extra.get("mbti"), Some(&Value::String("INFP".into())));

        let wire = serde_json::to_value(&data).unwrap();
        assert_eq!(wire["problemDescription"], "失眠");
        assert!(wire.get("gender").is_none());
    }

    #[test]
    fn set_routes_known_and_unknown_keys() {
        let mut data = FlowData::default();
        data.set("aiAnalysis", "需要规律作息").unwrap();
        data.set("hobby", "跑步").unwrap();
        assert_eq!(data.ai_analysis.as_deref(), Some("需要规律作息"));
        assert_eq!(data.extra["hobby"], "跑步");

        data.set("aiAnalysis", "").unwrap();
        assert!(data.ai_analysis.is_none());
        assert!(data.set(" ", "x").is_err());
    }

    #[test]
    fn steps_advance_in_order() {
        let mut step = FlowStep::default();
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            step = next;
            seen.push(step);
        }
        assert_eq!(
            seen,
            [
                FlowStep::Questionnaire,
                FlowStep::Analysis,
                FlowStep::Treatment,
                FlowStep::Daily
            ]
        );
    }

    #[test]
    fn view_keeps_completion_across_stream_updates() {
        let mut view = PlanView::default();
        view.apply(PlanViewEvent::Started);
        view.apply(partial("晨间\n• 冥想"));
        view.apply(PlanViewEvent::ToggleTask { section: 0, task: 0 });

        view.apply(partial("晨间\n• 冥想\n午间"));
        view.apply(complete("晨间\n• 冥想\n午间\n• 散步"));
        assert_eq!(view.status, ViewStatus::Ready);
        assert!(view.sections[0].tasks[0].completed);
        assert_eq!(view.progress(), (1, 2));
    }

    #[test]
    fn unparseable_partial_keeps_previous_sections() {
        let mut view = PlanView::default();
        view.apply(PlanViewEvent::Started);
        view.apply(partial(r#"{"weeks":[{"title":"A","items":["x"]}"#));
        assert_eq!(view.sections.len(), 1);
        view.apply(partial(r#"{"weeks":[{"title":"A","items":["x"]},{"ti"#));
        assert_eq!(view.sections.len(), 1);
        assert_eq!(view.status, ViewStatus::Streaming);
    }

    #[test]
    fn failure_keeps_what_arrived() {
        let mut view = PlanView::default();
        view.apply(PlanViewEvent::Started);
        view.apply(partial("晨间\n• 冥想"));
        view.apply(PlanViewEvent::Update(PlanUpdate::Failed {
            message: "boom".into(),
            content: "晨间\n• 冥想".into(),
        }));
        assert_eq!(view.status, ViewStatus::Failed("boom".into()));
        assert_eq!(view.sections.len(), 1);
        assert!(!view.sections[0].is_streaming);
    }

    #[test]
    fn toggles_ignore_out_of_range_indices_and_reset_clears() {
        let mut view = PlanView::default();
        view.apply(complete("晨间\n• a\n午间\n• b"));
        view.apply(PlanViewEvent::ToggleSection(1));
        view.apply(PlanViewEvent::ToggleSection(9));
        view.apply(PlanViewEvent::ToggleTask { section: 5, task: 0 });
        assert!(view.sections[1].expanded);

        view.apply(PlanViewEvent::Reset);
        assert_eq!(view, PlanView::default());
    }

    #[test]
    fn store_round_trips_and_resets() {
        let (store, _dir) = temp_store();
        assert_eq!(store.load().unwrap(), FlowState::default());
        assert!(!store.reset().unwrap());

        let mut state = FlowState::default();
        state.flow.set("age", "30").unwrap();
        state.step = FlowStep::Treatment;
        store.save(&mut state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.step, FlowStep::Treatment);
        assert_eq!(loaded.flow.age.as_deref(), Some("30"));
        assert!(loaded.updated_at.is_some());

        assert!(store.reset().unwrap());
        assert_eq!(store.load().unwrap().step, FlowStep::Questionnaire);
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let (store, _dir) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }
}
