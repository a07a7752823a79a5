//! Caller-side continuity between successive parses of one stream.
//!
//! The parser rebuilds every section from scratch, so user state (completed
//! tasks, expanded cards) lives with the caller and is carried onto each new
//! result here.

use super::PlanSection;

/// Copy `completed` and `expanded` from `previous` onto `next`.
///
/// A task keeps its flag when it sits at the same section/task position and
/// its text is unchanged or has only grown (the stream appended to it). A
/// task whose text changed in any other way is a different task and starts
/// over as not completed.
pub fn carry_completion(previous: &[PlanSection], mut next: Vec<PlanSection>) -> Vec<PlanSection> {
    for section in &mut next {
        let Some(prev) = previous.iter().find(|p| p.index == section.index) else {
            continue;
        };
        section.expanded = prev.expanded;
        for (task, prev_task) in section.tasks.iter_mut().zip(&prev.tasks) {
            let grown = !prev_task.text.is_empty() && task.text.starts_with(&prev_task.text);
            if task.text == prev_task.text || grown {
                task.completed = prev_task.completed;
            }
        }
    }
    next
}
