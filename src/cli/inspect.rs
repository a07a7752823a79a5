//! Offline commands: parse a saved buffer, or replay a recorded stream.

use crate::flow::{PlanView, PlanViewEvent};
use crate::plan;
use crate::render::{self, OutputFormat};
use crate::stream::{PlanStream, PlanUpdate};
use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::read(p).with_context(|| format!("failed to read {}", p.display()))
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

pub fn parse(path: Option<&Path>, partial: bool, format: OutputFormat) -> Result<()> {
    let raw = read_input(path)?;
    let buffer = String::from_utf8_lossy(&raw);
    match plan::parse(&buffer, !partial) {
        Some(sections) => print!("{}", render::render(&sections, format)?),
        None => eprintln!("nothing renderable yet"),
    }
    Ok(())
}

/// A transcript without any `data:` line is plain plan text; wrap it as a
/// stream so it goes through the same path as a live response.
fn as_event_stream(raw: &[u8], chunk_size: usize) -> Vec<u8> {
    let text = String::from_utf8_lossy(raw);
    if text.lines().any(|l| l.starts_with("data:")) {
        return raw.to_vec();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    for piece in chars.chunks(chunk_size.max(1)) {
        let content: String = piece.iter().collect();
        let line = serde_json::json!({ "content": content });
        out.push_str(&format!("data: {}\n\n", line));
    }
    out.push_str("data: [DONE]\n");
    out.into_bytes()
}

/// Feed `raw` through a fresh stream session `chunk_size` bytes at a time.
/// Chunk boundaries may fall inside a UTF-8 character.
pub fn replay_updates(raw: &[u8], chunk_size: usize) -> Vec<PlanUpdate> {
    let bytes = as_event_stream(raw, chunk_size);
    let mut session = PlanStream::new();
    let mut updates: Vec<PlanUpdate> = bytes
        .chunks(chunk_size.max(1))
        .filter_map(|chunk| session.feed(chunk))
        .collect();
    updates.extend(session.finish());
    updates
}

pub fn replay(path: &Path, chunk_size: usize, format: OutputFormat) -> Result<()> {
    let raw = read_input(Some(path))?;
    let updates = replay_updates(&raw, chunk_size);

    let mut view = PlanView::default();
    view.apply(PlanViewEvent::Started);
    for (i, update) in updates.into_iter().enumerate() {
        let shown = update.sections().map_or(0, <[_]>::len);
        eprintln!(
            "#{:<4} {:>6} chars  {} sections",
            i + 1,
            update.content().chars().count(),
            shown
        );
        view.apply(PlanViewEvent::Update(update));
    }
    eprintln!("status: {:?}", view.status);
    print!("{}", render::render(&view.sections, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_of_plain_text_ends_complete() {
        let updates = replay_updates("晨间\n• 冥想\n晚间\n• 写日记".as_bytes(), 3);
        let last = updates.last().unwrap();
        assert!(matches!(last, PlanUpdate::Complete { .. }));
        assert_eq!(last.sections().unwrap().len(), 2);
        assert!(updates.len() > 2);
    }

    #[test]
    fn replay_of_a_recorded_stream_splits_bytes_anywhere() {
        let transcript = "data: {\"content\":\"第1天\\n- 散步\"}\n\ndata: {\"content\":\"\\n- 早睡\"}\n\ndata: [DONE]\n";
        for size in [1, 2, 5, 64] {
            let updates = replay_updates(transcript.as_bytes(), size);
            match updates.last().unwrap() {
                PlanUpdate::Complete { content, sections } => {
                    assert_eq!(content, "第1天\n- 散步\n- 早睡");
                    assert_eq!(sections.as_ref().unwrap()[0].tasks.len(), 2);
                }
                other => panic!("chunk size {}: unexpected {:?}", size, other),
            }
        }
    }

    #[test]
    fn streamed_json_grows_monotonically() {
        let plan = r#"{"weeks":[{"title":"第一周","items":["a","b"]},{"title":"第二周","items":["c"]}]}"#;
        let updates = replay_updates(plan.as_bytes(), 4);
        let counts: Vec<usize> = updates
            .iter()
            .filter_map(|u| u.sections().map(<[_]>::len))
            .collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(counts.last(), Some(&2));
    }
}
