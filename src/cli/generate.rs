//! Online commands: stream analysis, treatment and daily plans from the
//! backend and fold them into a plan view.

use crate::client::{BackendClient, PlanKind, PlanType, SavePlanRequest};
use crate::config::Config;
use crate::flow::{FlowData, FlowState, FlowStep, FlowStore, PlanView, PlanViewEvent, ViewStatus};
use crate::plan;
use crate::render::{self, OutputFormat};
use crate::stream::PlanUpdate;
use anyhow::Result;
use futures_util::{Stream, StreamExt};
use std::io::Write;

const TREATMENT_PLAN_NAME: &str = "心理疗愈治疗计划";

/// How progress is shown while a stream is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Live {
    /// Echo new text to stdout as it arrives.
    Text,
    /// One status line per update on stderr.
    Sections,
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

pub fn analysis_prompt(flow: &FlowData) -> String {
    format!(
        "请根据以下信息分析我目前的心理状态：\n年龄：{}\n性别：{}\n职业：{}\n情绪状态：{}\n主要困扰：{}\n希望改善：{}\n问题描述：{}",
        field(&flow.age),
        field(&flow.gender),
        field(&flow.occupation),
        field(&flow.emotional_state),
        field(&flow.main_concerns),
        field(&flow.desired_improvements),
        field(&flow.problem_description),
    )
}

pub fn treatment_prompt(flow: &FlowData) -> String {
    format!(
        "基于以下心理咨询信息，请制定一个详细的治疗计划：\n问题描述：{}\n关系类型：{}\n事件经过：{}\n补充信息：{}\nAI分析：{}\n\n请提供具体的治疗建议和步骤。",
        field(&flow.problem_description),
        field(&flow.relationship_type),
        field(&flow.incident_process),
        field(&flow.additional_info),
        field(&flow.ai_analysis),
    )
}

/// `M.D`, the date key the backend files daily plans under.
pub fn today_key() -> String {
    chrono::Local::now().format("%-m.%-d").to_string()
}

async fn drive<S>(updates: S, live: Live) -> Result<PlanView>
where
    S: Stream<Item = Result<PlanUpdate>>,
{
    let mut updates = Box::pin(updates);
    let mut view = PlanView::default();
    view.apply(PlanViewEvent::Started);

    let mut echoed = 0usize;
    while let Some(update) = updates.next().await {
        let update = update?;
        match live {
            Live::Text => {
                let content = update.content();
                if let Some(fresh) = content.get(echoed..) {
                    print!("{}", fresh);
                    let _ = std::io::stdout().flush();
                }
                echoed = content.len();
            }
            Live::Sections => {
                if let Some(sections) = update.sections() {
                    let tasks: usize = sections.iter().map(|s| s.tasks.len()).sum();
                    eprint!("\r{} sections, {} tasks", sections.len(), tasks);
                }
            }
        }
        view.apply(PlanViewEvent::Update(update));
    }
    if live == Live::Text {
        println!();
    } else {
        eprintln!();
    }
    Ok(view)
}

fn ensure_ready(view: &PlanView) -> Result<()> {
    match &view.status {
        ViewStatus::Ready => Ok(()),
        ViewStatus::Failed(message) => anyhow::bail!("plan generation failed: {}", message),
        other => anyhow::bail!("plan stream ended in state {:?}", other),
    }
}

fn advance_to(state: &mut FlowState, step: FlowStep) {
    if state.step < step {
        state.step = step;
    }
}

pub async fn analyze(config: &Config, prompt: Option<String>) -> Result<()> {
    let store = FlowStore::new();
    let mut state = store.load()?;
    let client = BackendClient::new(&config.backend)?;
    let prompt = prompt.unwrap_or_else(|| analysis_prompt(&state.flow));

    let updates = client.stream_plan(PlanKind::Analysis, &prompt, &state.flow).await?;
    let view = drive(updates, Live::Text).await?;
    ensure_ready(&view)?;

    state.flow.ai_analysis = Some(view.content.trim().to_string());
    advance_to(&mut state, FlowStep::Treatment);
    store.save(&mut state)?;
    tracing::info!("analysis stored ({} chars)", view.content.chars().count());
    Ok(())
}

pub async fn treatment(
    config: &Config,
    prompt: Option<String>,
    save: bool,
    format: OutputFormat,
) -> Result<()> {
    let store = FlowStore::new();
    let mut state = store.load()?;
    let client = BackendClient::new(&config.backend)?;
    let prompt = prompt.unwrap_or_else(|| treatment_prompt(&state.flow));

    let updates = client.stream_plan(PlanKind::Treatment, &prompt, &state.flow).await?;
    let view = drive(updates, Live::Sections).await?;
    ensure_ready(&view)?;
    print!("{}", render::render(&view.sections, format)?);

    if save {
        let saved = client
            .save_plan(&SavePlanRequest {
                user_id: config.user.id,
                plan_name: TREATMENT_PLAN_NAME,
                plan_content: &view.content,
                flow_data: &state.flow,
                plan_type: PlanType::Monthly,
            })
            .await?;
        eprintln!("saved treatment plan {}", saved.id.map_or("-".to_string(), |id| id.to_string()));
    }
    advance_to(&mut state, FlowStep::Daily);
    store.save(&mut state)?;
    Ok(())
}

pub async fn today(
    config: &Config,
    practices: bool,
    regenerate: bool,
    format: OutputFormat,
) -> Result<()> {
    let store = FlowStore::new();
    let mut state = store.load()?;
    let client = BackendClient::new(&config.backend)?;
    let date = today_key();

    if !regenerate {
        if let Some(saved) = client.fetch_today_plan(config.user.id, &date).await? {
            tracing::info!("using saved plan for {}", date);
            let sections = plan::parse(&saved.plan_content, true).unwrap_or_default();
            if let Some(name) = &saved.plan_name {
                eprintln!("{}", name);
            }
            print!("{}", render::render(&sections, format)?);
            return Ok(());
        }
    }

    let kind = if practices {
        PlanKind::TodayPractices
    } else {
        PlanKind::Today
    };
    let prompt = format!("请为我制定{}的今日疗愈计划", date);
    let updates = client.stream_plan(kind, &prompt, &state.flow).await?;
    let view = drive(updates, Live::Sections).await?;
    ensure_ready(&view)?;
    print!("{}", render::render(&view.sections, format)?);

    let saved = client
        .save_plan(&SavePlanRequest {
            user_id: config.user.id,
            plan_name: &config.user.plan_name,
            plan_content: &view.content,
            flow_data: &state.flow,
            plan_type: PlanType::Daily,
        })
        .await;
    if let Err(e) = saved {
        tracing::warn!("failed to save today's plan: {:#}", e);
    }
    advance_to(&mut state, FlowStep::Daily);
    store.save(&mut state)?;
    Ok(())
}
