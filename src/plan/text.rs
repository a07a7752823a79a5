//! Line-oriented fallback for plans written as prose.
//!
//! Recognizes time-slot and day headers ("晨间", "第3天", "## ...") and
//! bullet or numbered task lines. Anything it cannot place degrades to a
//! single section holding the whole buffer, so the caller always has
//! something to show.

use super::{PlanSection, SectionKind};
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_TITLE: &str = "今日疗愈计划";
const ALL_DAY: &str = "全天";
const DEFAULT_DURATION: &str = "15-30分钟";
const DEFAULT_DESCRIPTION: &str = "心理疗愈练习";
const TIME_SLOTS: &[&str] = &["晨间", "午间", "晚间"];
const PRACTICE_MARKER: &str = "练习";
const BULLETS: &[char] = &['•', '✓', '-', '·', '*'];

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*([0-9]+|[零一二两三四五六七八九十百]+)\s*([天日周])").unwrap()
});
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\s*[-~～到至]\s*\d+)?\s*(?:分钟|小时)").unwrap()
});
static PAREN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[（(]([^）)]+)[）)]").unwrap());

enum Line {
    Header,
    Task(String),
    Other,
}

#[derive(Default)]
struct Builder {
    sections: Vec<PlanSection>,
    current: Option<PlanSection>,
    /// The open section was seeded from an introductory line, not a header.
    current_seeded: bool,
}

impl Builder {
    fn next_index(&self) -> usize {
        self.sections.len()
    }

    fn close_current(&mut self) {
        if let Some(section) = self.current.take() {
            // An intro line that never collected tasks is not a section.
            if !(self.current_seeded && section.tasks.is_empty()) {
                self.sections.push(section);
            }
        }
        self.current_seeded = false;
    }

    fn open_header(&mut self, line: &str) {
        self.close_current();
        self.current = Some(header_section(self.next_index(), line));
    }

    fn push_task(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.current.is_none() {
            self.current = Some(default_section(self.next_index()));
        }
        if let Some(section) = self.current.as_mut() {
            section.push_task(text, None);
        }
    }

    fn seed(&mut self, line: &str) {
        if self.current.is_some() {
            return;
        }
        let mut section = default_section(self.next_index());
        section.description = Some(line.to_string());
        self.current = Some(section);
        self.current_seeded = true;
    }

    fn finish(mut self) -> Vec<PlanSection> {
        self.close_current();
        self.sections
    }
}

/// Scan `buffer` line by line. Always returns at least one section for a
/// non-blank buffer.
pub fn decode(buffer: &str) -> Vec<PlanSection> {
    let mut builder = Builder::default();
    for line in buffer.lines().map(str::trim) {
        if line.is_empty() || is_rule(line) {
            continue;
        }
        match classify(line) {
            Line::Header => builder.open_header(line),
            Line::Task(text) => builder.push_task(text),
            Line::Other => builder.seed(line),
        }
    }

    let sections = builder.finish();
    let whole = buffer.trim();
    if sections.is_empty() && !whole.is_empty() {
        return vec![fallback_section(whole)];
    }
    sections
}

fn classify(line: &str) -> Line {
    if let Some(rest) = strip_list_marker(line) {
        let bold = rest.len() > 4 && rest.starts_with("**") && rest.ends_with("**");
        let colon = rest.ends_with(':') || rest.ends_with('：');
        if (bold || colon) && slot_marker(rest).is_some() {
            return Line::Header;
        }
        return Line::Task(clean_task_text(rest));
    }
    if is_header(line) {
        Line::Header
    } else {
        Line::Other
    }
}

fn is_header(line: &str) -> bool {
    line.starts_with('#')
        || slot_marker(line).is_some()
        || line.contains(PRACTICE_MARKER)
        || ORDINAL_RE.is_match(line)
}

/// `---`, `***`, `===` separators carry no content.
fn is_rule(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| matches!(c, '-' | '*' | '=' | '_'))
}

/// Remove a bullet (`•`, `-`, ...) or numbered prefix (`1.`, `2)`, `3、`),
/// returning the remainder, or `None` when the line is not a list item.
fn strip_list_marker(line: &str) -> Option<&str> {
    // "**bold**" opens with the same character as a "*" bullet.
    if line.starts_with("**") {
        return None;
    }
    if let Some(rest) = line.strip_prefix(BULLETS) {
        return Some(rest.trim_start());
    }

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let after = &line[digits..];
    let mut chars = after.chars();
    match chars.next() {
        Some(')' | '、' | '）') => Some(chars.as_str().trim_start()),
        // "1.5小时" is a quantity, not a list marker.
        Some('.') if !chars.as_str().starts_with(|c: char| c.is_ascii_digit()) => {
            Some(chars.as_str().trim_start())
        }
        _ => None,
    }
}

fn clean_task_text(rest: &str) -> String {
    let rest = ["[ ]", "[x]", "[X]", "[]"]
        .iter()
        .find_map(|box_| rest.strip_prefix(box_))
        .unwrap_or(rest);
    rest.replace("**", "").trim().to_string()
}

fn slot_marker(line: &str) -> Option<&'static str> {
    TIME_SLOTS.iter().copied().find(|slot| line.contains(slot))
}

fn header_section(index: usize, line: &str) -> PlanSection {
    let title = header_title(line);
    let ordinal = ORDINAL_RE.captures(line);
    let slot = slot_marker(line);

    let kind = match (&slot, &ordinal) {
        (Some(_), _) => SectionKind::TimeSlot,
        (None, Some(caps)) if &caps[2] == "周" => SectionKind::Week,
        (None, Some(_)) => SectionKind::Day,
        (None, None) => SectionKind::Practice,
    };

    let mut section = PlanSection::new(index, kind, title);
    section.number = ordinal
        .as_ref()
        .and_then(|caps| ordinal_value(&caps[1]))
        .or_else(|| u32::try_from(index + 1).ok());
    section.time_window = slot.map(str::to_string);
    section.duration = Some(
        DURATION_RE
            .find(line)
            .map(|m| m.as_str().replace(' ', ""))
            .unwrap_or_else(|| DEFAULT_DURATION.to_string()),
    );
    section.description = Some(
        PAREN_RE
            .captures(line)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
    );
    section
}

fn header_title(line: &str) -> String {
    let stripped = line
        .trim_start_matches('#')
        .trim_start_matches(BULLETS)
        .replace("**", "");
    let stripped = stripped.trim();
    stripped
        .strip_suffix(':')
        .or_else(|| stripped.strip_suffix('：'))
        .unwrap_or(stripped)
        .trim()
        .to_string()
}

fn ordinal_value(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let digit = |c: char| match c {
        '零' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    };
    let mut total = 0;
    let mut pending = 0;
    for c in raw.chars() {
        match c {
            '十' => {
                total += if pending == 0 { 10 } else { pending * 10 };
                pending = 0;
            }
            '百' => {
                total += if pending == 0 { 100 } else { pending * 100 };
                pending = 0;
            }
            other => pending = digit(other)?,
        }
    }
    Some(total + pending)
}

fn default_section(index: usize) -> PlanSection {
    let mut section = PlanSection::new(index, SectionKind::Default, DEFAULT_TITLE);
    section.time_window = Some(ALL_DAY.to_string());
    section
}

fn fallback_section(whole: &str) -> PlanSection {
    let mut section = default_section(0);
    section.duration = Some(ALL_DAY.to_string());
    section.description = Some(whole.to_string());
    section.push_task(whole, None);
    section
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(section: &PlanSection) -> Vec<&str> {
        section.tasks.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn time_slot_headers_with_bullets() {
        let sections = decode("晨间\n• 冥想10分钟\n午间\n• 散步");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].time_window.as_deref(), Some("晨间"));
        assert_eq!(sections[0].kind, SectionKind::TimeSlot);
        assert_eq!(texts(&sections[0]), ["冥想10分钟"]);
        assert_eq!(sections[1].time_window.as_deref(), Some("午间"));
        assert_eq!(texts(&sections[1]), ["散步"]);
        assert_eq!(sections[1].tasks[0].id, "1-0");
    }

    #[test]
    fn plain_prose_falls_back_to_one_task() {
        let sections = decode("随便写点什么");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, DEFAULT_TITLE);
        assert_eq!(sections[0].time_window.as_deref(), Some("全天"));
        assert_eq!(texts(&sections[0]), ["随便写点什么"]);
    }

    #[test]
    fn markdown_plan_with_numbered_tasks() {
        let text = "好的，这是为你定制的今日计划。\n\n\
            ### 1. 晨间疗愈（7:00-7:30）\n\
            1. **正念呼吸**：闭眼5分钟\n\
            2. 写下三件感恩的事\n\
            ---\n\
            ### 2. 午间调节\n\
            - [ ] 午饭后散步 20 分钟\n\
            ### 3. 晚间总结\n\
            * 记录今天的情绪变化\n";
        let sections = decode(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "1. 晨间疗愈（7:00-7:30）");
        assert_eq!(sections[0].description.as_deref(), Some("7:00-7:30"));
        assert_eq!(texts(&sections[0]), ["正念呼吸：闭眼5分钟", "写下三件感恩的事"]);
        assert_eq!(texts(&sections[1]), ["午饭后散步 20 分钟"]);
        assert_eq!(texts(&sections[2]), ["记录今天的情绪变化"]);
        // The intro line never gathered tasks, so the first header is index 0.
        assert_eq!(sections[0].index, 0);
        assert!(sections.iter().all(|s| s.tasks.iter().all(|t| !t.completed)));
    }

    #[test]
    fn header_defaults_and_extracted_duration() {
        let sections = decode("晚间放松练习 15分钟\n- 泡脚\n晨间唤醒\n- 拉伸");
        assert_eq!(sections[0].duration.as_deref(), Some("15分钟"));
        assert_eq!(sections[0].description.as_deref(), Some("心理疗愈练习"));
        assert_eq!(sections[1].duration.as_deref(), Some("15-30分钟"));
        assert_eq!(sections[1].number, Some(2));
    }

    #[test]
    fn day_headers_keep_their_ordinal() {
        let sections = decode("第三天：接纳\n• 写信给自己\n第12天\n• 复盘");
        assert_eq!(sections[0].kind, SectionKind::Day);
        assert_eq!(sections[0].number, Some(3));
        assert_eq!(sections[1].number, Some(12));
        assert_eq!(texts(&sections[1]), ["复盘"]);
    }

    #[test]
    fn bullet_with_practice_word_stays_a_task() {
        let sections = decode("晨间\n• 呼吸练习5分钟\n• **晚间**\n• 写日记");
        assert_eq!(sections.len(), 2);
        assert_eq!(texts(&sections[0]), ["呼吸练习5分钟"]);
        assert_eq!(sections[1].time_window.as_deref(), Some("晚间"));
        assert_eq!(sections[1].title, "晚间");
        assert_eq!(texts(&sections[1]), ["写日记"]);
    }

    #[test]
    fn tasks_before_any_header_open_a_default_section() {
        let sections = decode("- 喝一杯温水\n- 1.5小时阅读");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].kind, SectionKind::Default);
        assert_eq!(texts(&sections[0]), ["喝一杯温水", "1.5小时阅读"]);
    }

    #[test]
    fn intro_line_seeds_section_that_collects_tasks() {
        let sections = decode("今天以放松为主\n- 听音乐");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].description.as_deref(), Some("今天以放松为主"));
        assert_eq!(texts(&sections[0]), ["听音乐"]);
    }

    #[test]
    fn chinese_ordinals() {
        assert_eq!(ordinal_value("十"), Some(10));
        assert_eq!(ordinal_value("十二"), Some(12));
        assert_eq!(ordinal_value("二十一"), Some(21));
        assert_eq!(ordinal_value("七"), Some(7));
        assert_eq!(ordinal_value("x"), None);
    }
}
