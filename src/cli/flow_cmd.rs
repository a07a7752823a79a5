use crate::flow::{FlowStep, FlowStore};
use anyhow::Result;

pub enum FlowAction {
    Show,
    Set { key: String, value: String },
    Step { step: Option<FlowStep> },
    Reset,
}

pub fn run(action: FlowAction) -> Result<()> {
    run_with(&FlowStore::new(), action)
}

fn run_with(store: &FlowStore, action: FlowAction) -> Result<()> {
    match action {
        FlowAction::Show => {
            let state = store.load()?;
            println!("step: {}", state.step.as_str());
            if let Some(at) = state.updated_at {
                println!("updated: {}", at.to_rfc3339());
            }
            if state.flow.is_empty() {
                println!("(no answers yet)");
            }
            for (key, value) in state.flow.entries() {
                println!("  {}: {}", key, value);
            }
        }
        FlowAction::Set { key, value } => {
            let mut state = store.load()?;
            state.flow.set(&key, &value)?;
            store.save(&mut state)?;
        }
        FlowAction::Step { step } => {
            let mut state = store.load()?;
            let target = match step {
                Some(step) => step,
                None => match state.step.next() {
                    Some(next) => next,
                    None => anyhow::bail!("already at the last step ({})", state.step.as_str()),
                },
            };
            state.step = target;
            store.save(&mut state)?;
            println!("step: {}", target.as_str());
        }
        FlowAction::Reset => {
            if store.reset()? {
                println!("flow cleared");
            } else {
                println!("nothing to clear");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_step_through_the_flow() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::with_root(dir.path().to_path_buf());

        run_with(
            &store,
            FlowAction::Set {
                key: "main_concerns".into(),
                value: "睡眠差".into(),
            },
        )
        .unwrap();
        run_with(&store, FlowAction::Step { step: None }).unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.step, FlowStep::Analysis);
        assert_eq!(state.flow.main_concerns.as_deref(), Some("睡眠差"));

        run_with(&store, FlowAction::Step { step: Some(FlowStep::Daily) }).unwrap();
        assert!(run_with(&store, FlowAction::Step { step: None }).is_err());

        run_with(&store, FlowAction::Reset).unwrap();
        assert_eq!(store.load().unwrap().step, FlowStep::Questionnaire);
    }
}
