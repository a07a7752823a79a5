use super::{SseAssembler, StreamEvent};
use crate::plan::{self, ParseResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Receiving,
    Finalizing,
    Complete,
    Failed(String),
    Cancelled,
}

impl StreamPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamPhase::Complete | StreamPhase::Failed(_) | StreamPhase::Cancelled
        )
    }
}

/// What the UI layer re-renders from after each chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanUpdate {
    Partial {
        content: String,
        sections: ParseResult,
    },
    Complete {
        content: String,
        sections: ParseResult,
    },
    Failed {
        message: String,
        content: String,
    },
}

impl PlanUpdate {
    pub fn content(&self) -> &str {
        match self {
            PlanUpdate::Partial { content, .. }
            | PlanUpdate::Complete { content, .. }
            | PlanUpdate::Failed { content, .. } => content,
        }
    }

    pub fn sections(&self) -> Option<&[plan::PlanSection]> {
        match self {
            PlanUpdate::Partial { sections, .. } | PlanUpdate::Complete { sections, .. } => {
                sections.as_deref()
            }
            PlanUpdate::Failed { .. } => None,
        }
    }
}

/// One plan-generation request: its own buffer, its own lifecycle.
///
/// `Idle → Receiving → Finalizing → Complete`, or `Failed` when the backend
/// reports an error, or `Cancelled` when the caller abandons it. Once
/// terminal, every call is a no-op.
#[derive(Debug)]
pub struct PlanStream {
    id: Uuid,
    assembler: SseAssembler,
    phase: StreamPhase,
    chunks: usize,
}

impl Default for PlanStream {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanStream {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            assembler: SseAssembler::new(),
            phase: StreamPhase::Idle,
            chunks: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> &StreamPhase {
        &self.phase
    }

    pub fn content(&self) -> &str {
        self.assembler.content()
    }

    /// Feed one transport chunk.
    ///
    /// Returns a partial update when the chunk added content, the final
    /// update when it carried `[DONE]`, or a failure when the backend sent an
    /// error fragment.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<PlanUpdate> {
        if self.phase.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::Receiving;
        self.chunks += 1;

        let events = self.assembler.push(chunk);
        self.apply(events)
    }

    /// The body ended. Finalizes with whatever arrived even without `[DONE]`.
    pub fn finish(&mut self) -> Option<PlanUpdate> {
        if self.phase.is_terminal() {
            return None;
        }
        let events = self.assembler.finish();
        if let Some(update) = self.apply(events) {
            if !matches!(update, PlanUpdate::Partial { .. }) {
                return Some(update);
            }
        }
        if self.phase.is_terminal() {
            return None;
        }
        debug!(request = %self.id, "stream ended without [DONE], finalizing");
        Some(self.finalize())
    }

    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            info!(request = %self.id, "plan stream cancelled after {} chunks", self.chunks);
            self.phase = StreamPhase::Cancelled;
        }
    }

    fn apply(&mut self, events: Vec<StreamEvent>) -> Option<PlanUpdate> {
        let mut grew = false;
        for event in events {
            match event {
                StreamEvent::Content(_) => grew = true,
                StreamEvent::Done => return Some(self.finalize()),
                StreamEvent::Error(message) => {
                    warn!(request = %self.id, "plan stream failed: {}", message);
                    self.phase = StreamPhase::Failed(message.clone());
                    return Some(PlanUpdate::Failed {
                        message,
                        content: self.assembler.content().to_string(),
                    });
                }
            }
        }

        if !grew {
            return None;
        }
        let content = self.assembler.content().to_string();
        let sections = plan::parse(&content, false);
        debug!(
            request = %self.id,
            "partial plan: {} chars, {} sections",
            content.chars().count(),
            sections.as_ref().map_or(0, Vec::len)
        );
        Some(PlanUpdate::Partial { content, sections })
    }

    fn finalize(&mut self) -> PlanUpdate {
        self.phase = StreamPhase::Finalizing;
        let content = self.assembler.content().to_string();
        let sections = plan::parse(&content, true);
        info!(
            request = %self.id,
            "plan stream complete: {} chunks, {} sections",
            self.chunks,
            sections.as_ref().map_or(0, Vec::len)
        );
        self.phase = StreamPhase::Complete;
        PlanUpdate::Complete { content, sections }
    }
}
