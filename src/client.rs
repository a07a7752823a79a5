use crate::config::BackendConfig;
use crate::flow::FlowData;
use crate::stream::{PlanStream, PlanUpdate};
use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend reply when nothing was saved for the day.
const NO_PLAN_MESSAGE: &str = "未找到今日计划";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Free-text assessment of the questionnaire.
    Analysis,
    /// Multi-week plan, streamed as `{weeks:[...]}` JSON.
    Treatment,
    /// Today's plan as prose with time-slot headers.
    Today,
    /// Today's plan streamed as `{practices:[...]}` JSON.
    TodayPractices,
}

impl PlanKind {
    fn endpoint(self) -> &'static str {
        match self {
            PlanKind::Analysis => "/api/chat/analyze-stream",
            PlanKind::Treatment => "/api/chat/treatment-stream",
            PlanKind::Today => "/api/chat/today-plan-detailed",
            PlanKind::TodayPractices => "/api/chat/today-plan-detailed-stream",
        }
    }

    /// The prose endpoint reads only `flowData`; the others require `prompt`.
    fn sends_prompt(self) -> bool {
        !matches!(self, PlanKind::Today)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavePlanRequest<'a> {
    pub user_id: i64,
    pub plan_name: &'a str,
    pub plan_content: &'a str,
    pub flow_data: &'a FlowData,
    pub plan_type: PlanType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedPlan {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub plan_content: String,
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TodayPlanReply {
    Found(SavedPlan),
    Message { message: String },
}

#[derive(Debug, Serialize)]
struct PlanRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(rename = "flowData")]
    flow_data: &'a FlowData,
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a generation request and yield one update per chunk that
    /// changed the plan. Dropping the stream abandons the request.
    pub async fn stream_plan(
        &self,
        kind: PlanKind,
        prompt: &str,
        flow: &FlowData,
    ) -> Result<impl Stream<Item = Result<PlanUpdate>> + Send> {
        let url = self.url(kind.endpoint());
        let session = PlanStream::new();
        tracing::info!(
            request = %session.id(),
            "Plan request: {:?} -> {}, prompt_chars={}",
            kind,
            url,
            prompt.chars().count()
        );

        let body = PlanRequest {
            prompt: kind.sends_prompt().then_some(prompt),
            flow_data: flow,
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("backend error ({}): {}", status, text);
        }

        let state = StreamState {
            body: resp.bytes_stream().boxed(),
            session,
            ended: false,
        };
        Ok(futures_util::stream::unfold(state, |mut state| async move {
            let item = state.next_update().await?;
            Some((item, state))
        }))
    }

    /// The plan saved for `date` (`M.D`), or `None` when there is none yet.
    pub async fn fetch_today_plan(&self, user_id: i64, date: &str) -> Result<Option<SavedPlan>> {
        let url = self.url("/api/chat/get-today-plan");
        let resp = self
            .http
            .get(&url)
            .query(&[("user_id", user_id.to_string()), ("date", date.to_string())])
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("backend error ({}): {}", status, text);
        }
        match resp.json::<TodayPlanReply>().await? {
            TodayPlanReply::Found(plan) => Ok(Some(plan)),
            TodayPlanReply::Message { message } => {
                if message != NO_PLAN_MESSAGE {
                    tracing::warn!("unexpected get-today-plan reply: {}", message);
                }
                Ok(None)
            }
        }
    }

    pub async fn save_plan(&self, request: &SavePlanRequest<'_>) -> Result<SavedPlan> {
        let path = match request.plan_type {
            PlanType::Daily => "/api/chat/save-today-plan",
            PlanType::Monthly => "/api/chat/save-treatment-plan",
        };
        let url = self.url(path);
        tracing::info!(
            "Saving {:?} plan '{}' for user {} ({} chars)",
            request.plan_type,
            request.plan_name,
            request.user_id,
            request.plan_content.chars().count()
        );
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("backend error ({}): {}", status, text);
        }
        Ok(resp.json().await?)
    }

    /// Reachability probe used by `doctor`.
    pub async fn ping(&self) -> Result<reqwest::StatusCode> {
        let resp = self
            .http
            .get(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        Ok(resp.status())
    }
}

struct StreamState<S> {
    body: S,
    session: PlanStream,
    ended: bool,
}

impl<S, B> StreamState<S>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    async fn next_update(&mut self) -> Option<Result<PlanUpdate>> {
        loop {
            if self.ended || self.session.phase().is_terminal() {
                return None;
            }
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    if let Some(update) = self.session.feed(chunk.as_ref()) {
                        return Some(Ok(update));
                    }
                }
                Some(Err(e)) => {
                    self.ended = true;
                    tracing::warn!(request = %self.session.id(), "plan stream transport error: {}", e);
                    self.session.cancel();
                    return Some(Err(anyhow::Error::new(e).context("plan stream interrupted")));
                }
                None => {
                    self.ended = true;
                    return self.session.finish().map(Ok);
                }
            }
        }
    }
}

impl<S> Drop for StreamState<S> {
    fn drop(&mut self) {
        self.session.cancel();
    }
}
