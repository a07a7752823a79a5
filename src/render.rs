use crate::plan::PlanSection;
use anyhow::Result;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

pub fn render(sections: &[PlanSection], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(sections)),
        OutputFormat::Markdown => Ok(render_markdown(sections)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(sections)?),
    }
}

/// `晨间 · 07:00-08:00 · 15分钟` style header detail, empty when nothing is known.
fn header_meta(section: &PlanSection) -> String {
    [section.time_window.as_deref(), section.duration.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| *s != section.title)
        .collect::<Vec<_>>()
        .join(" · ")
}

fn checkbox(completed: bool) -> &'static str {
    if completed {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn render_text(sections: &[PlanSection]) -> String {
    if sections.is_empty() {
        return "(empty plan)\n".to_string();
    }
    let mut out = String::new();
    for section in sections {
        let meta = header_meta(section);
        let marker = if section.is_streaming { " …" } else { "" };
        if meta.is_empty() {
            let _ = writeln!(out, "{}{}", section.title, marker);
        } else {
            let _ = writeln!(out, "{} ({}){}", section.title, meta, marker);
        }
        if let Some(desc) = &section.description {
            let _ = writeln!(out, "  {}", desc);
        }
        for task in &section.tasks {
            let _ = writeln!(out, "  {} {}", checkbox(task.completed), task.text);
        }
        let _ = writeln!(
            out,
            "  {}/{} done",
            section.completed_count(),
            section.tasks.len()
        );
    }
    out
}

pub fn render_markdown(sections: &[PlanSection]) -> String {
    let mut out = String::new();
    for section in sections {
        let _ = writeln!(out, "## {}", section.title);
        let meta = header_meta(section);
        if !meta.is_empty() {
            let _ = writeln!(out, "\n_{}_", meta);
        }
        if let Some(desc) = &section.description {
            let _ = writeln!(out, "\n{}", desc);
        }
        if !section.tasks.is_empty() {
            out.push('\n');
        }
        for task in &section.tasks {
            match &task.date {
                Some(date) => {
                    let _ = writeln!(out, "- {} {} ({})", checkbox(task.completed), task.text, date);
                }
                None => {
                    let _ = writeln!(out, "- {} {}", checkbox(task.completed), task.text);
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::parse;

    fn sample() -> Vec<PlanSection> {
        let mut sections =
            parse("晨间练习（15分钟）\n• 冥想\n• 喝水\n晚间\n• 写日记", true).unwrap();
        sections[0].tasks[1].completed = true;
        sections
    }

    #[test]
    fn text_shows_checkboxes_and_progress() {
        let out = render_text(&sample());
        assert!(out.contains("  [ ] 冥想\n"));
        assert!(out.contains("  [x] 喝水\n"));
        assert!(out.contains("  1/2 done\n"));
        assert!(out.contains("  0/1 done\n"));
    }

    #[test]
    fn markdown_uses_headings_and_task_lists() {
        let out = render_markdown(&sample());
        assert!(out.starts_with("## "));
        assert!(out.contains("- [x] 喝水\n"));
        assert!(out.contains("## 晚间"));
    }

    #[test]
    fn streaming_sections_are_marked() {
        let sections = parse("晨间\n• 冥想", false).unwrap();
        assert!(render_text(&sections).lines().next().unwrap().ends_with('…'));
    }

    #[test]
    fn json_output_uses_camel_case() {
        let out = render(&sample(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["tasks"][1]["completed"], true);
        assert_eq!(value[0]["isStreaming"], false);
    }

    #[test]
    fn empty_plan_is_said_out_loud() {
        assert_eq!(render_text(&[]), "(empty plan)\n");
    }
}
