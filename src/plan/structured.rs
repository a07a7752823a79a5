//! JSON plan shapes: `{weeks:[...]}`, `{days:[...]}`, `{practices:[...]}`
//! and a bare `{tasks:[...]}` daily plan.

use super::{repair, PlanSection, SectionKind};
use serde_json::de::Deserializer;
use serde_json::{Map, Value};
use tracing::debug;

const TASK_LIST_KEYS: &[&str] = &["items", "tasks", "activities"];
const TASK_TEXT_KEYS: &[&str] = &["text", "title", "content", "description", "name", "theme"];
const SECTION_TITLE_KEYS: &[&str] = &["title", "theme", "name", "timeSlot"];
const SECTION_WINDOW_KEYS: &[&str] = &[
    "timeSlot",
    "time_slot",
    "timeWindow",
    "time_window",
    "dateRange",
    "date_range",
    "date",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Sections(Vec<PlanSection>),
    /// Starts like a JSON document but yields no plan, either because nothing
    /// has closed yet or because no known shape is present.
    Incomplete,
    /// Prose; hand it to the text decoder.
    NotStructured,
}

pub fn decode(buffer: &str) -> Decoded {
    let body = strip_code_fence(buffer.trim());

    if body.starts_with('{') {
        let value = serde_json::from_str::<Value>(body)
            .ok()
            .or_else(|| first_json_value(body))
            .or_else(|| repair::recover(body));
        let Some(value) = value else {
            return Decoded::Incomplete;
        };
        return match sections_from_value(&value) {
            Some(sections) => Decoded::Sections(sections),
            None => {
                debug!("JSON plan buffer has no weeks/days/practices/tasks key");
                Decoded::Incomplete
            }
        };
    }

    // Prose that embeds a plan object, e.g. "好的，计划如下：\n```json\n{...".
    if let Some(idx) = body.find('{') {
        let tail = &body[idx..];
        if let Some(sections) = first_json_value(tail)
            .as_ref()
            .and_then(sections_from_value)
        {
            return Decoded::Sections(sections);
        }
        if opens_json_object(tail) {
            return match repair::recover(tail).as_ref().and_then(sections_from_value) {
                Some(sections) => Decoded::Sections(sections),
                None => Decoded::Incomplete,
            };
        }
    }
    Decoded::NotStructured
}

/// `{` followed by a quoted key (or nothing yet) rather than prose in braces.
fn opens_json_object(tail: &str) -> bool {
    let after = tail[1..].trim_start();
    after.is_empty() || after.starts_with('"') || after.starts_with('}')
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => "",
    };
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First complete JSON value at the start of `text`, ignoring anything after it.
fn first_json_value(text: &str) -> Option<Value> {
    Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

pub fn sections_from_value(value: &Value) -> Option<Vec<PlanSection>> {
    let obj = value.as_object()?;

    let shapes = [
        ("weeks", SectionKind::Week),
        ("days", SectionKind::Day),
        ("practices", SectionKind::Practice),
    ];
    for (key, kind) in shapes {
        if let Some(items) = obj.get(key).and_then(Value::as_array) {
            let sections = items
                .iter()
                .enumerate()
                .map(|(index, item)| build_section(index, kind, item))
                .collect();
            return Some(sections);
        }
    }

    if obj.get("tasks").and_then(Value::as_array).is_some() {
        return Some(vec![build_section(0, SectionKind::Default, value)]);
    }
    None
}

fn build_section(index: usize, kind: SectionKind, value: &Value) -> PlanSection {
    let Some(obj) = value.as_object() else {
        let title = match value {
            Value::String(s) => s.clone(),
            _ => default_title(kind, index, None),
        };
        return PlanSection::new(index, kind, title);
    };

    let number = source_number(kind, obj);
    let title = str_field(obj, SECTION_TITLE_KEYS)
        .unwrap_or_else(|| default_title(kind, index, number));

    let mut section = PlanSection::new(index, kind, title);
    section.number = number;
    section.time_window = str_field(obj, SECTION_WINDOW_KEYS);
    section.duration = str_field(obj, &["duration"]);
    section.description = str_field(obj, &["description"]);

    if let Some(list) = task_list(obj) {
        for item in list {
            let (text, date) = task_from_value(item, None);
            section.push_task(text, date);
        }
    } else if let Some(days) = obj.get("days").and_then(Value::as_array) {
        for day in days {
            flatten_day(&mut section, day);
        }
    }

    if section.time_window.is_none() {
        section.time_window = date_range(&section);
    }
    section
}

/// A week written as `days: [{theme, activities:[...]}]` contributes one task
/// per activity; a day without a list is a task by itself.
fn flatten_day(section: &mut PlanSection, day: &Value) {
    let Some(obj) = day.as_object() else {
        let (text, date) = task_from_value(day, None);
        section.push_task(text, date);
        return;
    };
    let day_date = str_field(obj, &["date"]);
    match task_list(obj) {
        Some(list) => {
            for item in list {
                let (text, date) = task_from_value(item, day_date.clone());
                section.push_task(text, date);
            }
        }
        None => {
            let (text, date) = task_from_value(day, None);
            section.push_task(text, date);
        }
    }
}

fn task_list(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    TASK_LIST_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
}

fn task_from_value(value: &Value, inherited_date: Option<String>) -> (String, Option<String>) {
    match value {
        Value::String(s) => (s.clone(), inherited_date),
        Value::Object(obj) => {
            let text = str_field(obj, TASK_TEXT_KEYS).unwrap_or_default();
            let date = str_field(obj, &["date"]).or(inherited_date);
            (text, date)
        }
        Value::Null => (String::new(), inherited_date),
        other => (other.to_string(), inherited_date),
    }
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        obj.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn source_number(kind: SectionKind, obj: &Map<String, Value>) -> Option<u32> {
    let keys: &[&str] = match kind {
        SectionKind::Week => &["week", "number"],
        SectionKind::Day => &["day", "number"],
        _ => &["id", "number"],
    };
    keys.iter().find_map(|key| {
        let value = obj.get(*key)?;
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn default_title(kind: SectionKind, index: usize, number: Option<u32>) -> String {
    let n = number.map(|n| n as usize).unwrap_or(index + 1);
    match kind {
        SectionKind::Week => format!("第{}周", n),
        SectionKind::Day => format!("第{}天", n),
        SectionKind::Practice | SectionKind::TimeSlot => format!("练习{}", n),
        SectionKind::Default => super::text::DEFAULT_TITLE.to_string(),
    }
}

fn date_range(section: &PlanSection) -> Option<String> {
    let mut dates = section.tasks.iter().filter_map(|t| t.date.as_deref());
    let first = dates.next()?;
    let last = dates.last().unwrap_or(first);
    if first == last {
        Some(first.to_string())
    } else {
        Some(format!("{} ~ {}", first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(buffer: &str) -> Vec<PlanSection> {
        match decode(buffer) {
            Decoded::Sections(s) => s,
            other => panic!("expected sections, got {:?}", other),
        }
    }

    #[test]
    fn weeks_take_priority_over_days() {
        let s = sections(r#"{"days":[{"theme":"d"}],"weeks":[{"title":"w","items":["a"]}]}"#);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].kind, SectionKind::Week);
        assert_eq!(s[0].title, "w");
    }

    #[test]
    fn task_lists_under_items_tasks_or_bare_strings() {
        let s = sections(
            r#"{"practices":[
                {"timeSlot":"晨间","title":"呼吸","tasks":["吸气","呼气"]},
                {"title":"散步","items":[{"text":"出门"},{"text":"回家","date":"5.1"}]},
                {"title":"空"}
            ]}"#,
        );
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].time_window.as_deref(), Some("晨间"));
        assert_eq!(s[0].tasks.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), ["吸气", "呼气"]);
        assert_eq!(s[1].tasks[1].date.as_deref(), Some("5.1"));
        assert_eq!(s[1].tasks[1].id, "1-1");
        assert!(s[2].tasks.is_empty());
    }

    #[test]
    fn task_count_matches_source_even_without_text() {
        let s = sections(r#"{"days":[{"day":3,"items":[{"completed":true},7,"x"]}]}"#);
        let texts: Vec<&str> = s[0].tasks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["", "7", "x"]);
        assert!(s[0].tasks.iter().all(|t| !t.completed));
    }

    #[test]
    fn source_numbering_is_kept_verbatim() {
        let s = sections(r#"{"days":[{"day":5,"theme":"复盘"},{"day":9}]}"#);
        assert_eq!(s[0].number, Some(5));
        assert_eq!(s[0].title, "复盘");
        assert_eq!(s[1].title, "第9天");
        assert_eq!(s[1].index, 1);
    }

    #[test]
    fn week_days_are_flattened_into_tasks() {
        let s = sections(
            r#"{"weeks":[{"week":1,"title":"第一周","days":[
                {"day":1,"date":"2024-05-01","theme":"觉察","activities":["写日记","深呼吸"]},
                {"day":2,"date":"2024-05-02","theme":"休息"}
            ]}]}"#,
        );
        let texts: Vec<&str> = s[0].tasks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["写日记", "深呼吸", "休息"]);
        assert_eq!(s[0].tasks[0].date.as_deref(), Some("2024-05-01"));
        assert_eq!(s[0].time_window.as_deref(), Some("2024-05-01 ~ 2024-05-02"));
    }

    #[test]
    fn daily_tasks_object_forms_one_section() {
        let s = sections(
            r#"{"title":"今日疗愈","date":"2024-05-01","tasks":[{"id":1,"text":"喝水"}]}"#,
        );
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].title, "今日疗愈");
        assert_eq!(s[0].time_window.as_deref(), Some("2024-05-01"));
        assert_eq!(s[0].tasks[0].text, "喝水");
    }

    #[test]
    fn fenced_and_prose_wrapped_json_is_found() {
        let fenced = "```json\n{\"weeks\":[{\"title\":\"A\",\"items\":[\"x\"]}]}\n```";
        assert_eq!(sections(fenced)[0].title, "A");

        let wrapped = "好的，以下是计划：\n{\"practices\":[{\"title\":\"B\",\"tasks\":[\"y\"]}]}\n祝你顺利";
        assert_eq!(sections(wrapped)[0].title, "B");
    }

    #[test]
    fn unknown_json_and_prose_are_classified() {
        assert_eq!(decode(r#"{"message":"hello"}"#), Decoded::Incomplete);
        assert_eq!(decode("晨间\n• 冥想"), Decoded::NotStructured);
        assert_eq!(decode("我很好 {不是json"), Decoded::NotStructured);
    }

    #[test]
    fn prose_wrapped_json_is_recovered_while_open() {
        let open = "以下是计划：\n```json\n{\n  \"practices\": [\n    {\"title\": \"B\", \"tasks\": [\"y\"]},\n    {\"timeSlot\": \"午间\",";
        assert_eq!(sections(open).len(), 1);
        assert_eq!(sections(open)[0].title, "B");

        let unfinished = "以下是计划：\n```json\n{\n  \"practices\": [\n    {\"timeSlot\": \"晨";
        assert_eq!(decode(unfinished), Decoded::Sections(Vec::new()));
        assert_eq!(decode("以下是计划：\n```json\n{\n  \"pra"), Decoded::Incomplete);
        assert_eq!(decode("以下是计划：\n```json\n{"), Decoded::Incomplete);
    }
}
