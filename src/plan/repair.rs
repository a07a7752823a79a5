//! Recovery for JSON documents cut off mid-stream.
//!
//! A streamed plan arrives as a growing prefix of one JSON object. The
//! helpers here close whatever is still open so `serde_json` can read the
//! part that has arrived, dropping an in-progress section element rather
//! than guessing at its contents.

use serde_json::Value;

#[derive(Debug, Clone, Copy)]
struct Frame {
    open: u8,
    start: usize,
    /// Byte offset just past the last child container closed inside this frame.
    last_child_end: Option<usize>,
}

#[derive(Debug, Default)]
struct Scan {
    stack: Vec<Frame>,
    in_string: bool,
    /// A closer appeared with nothing open; no amount of appending fixes that.
    overclosed: bool,
}

fn scan(text: &str) -> Scan {
    // Structural characters are ASCII, so a byte walk is safe on UTF-8 input.
    let mut out = Scan::default();
    let mut escape = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        if out.in_string {
            match b {
                b'\\' => escape = true,
                b'"' => out.in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => out.in_string = true,
            b'{' | b'[' => out.stack.push(Frame {
                open: b,
                start: i,
                last_child_end: None,
            }),
            b'}' | b']' => {
                if out.stack.pop().is_none() {
                    out.overclosed = true;
                    return out;
                }
                if let Some(parent) = out.stack.last_mut() {
                    parent.last_child_end = Some(i + 1);
                }
            }
            _ => {}
        }
    }
    out
}

/// Close a truncated document: trim, drop one trailing comma, then append the
/// missing `}`/`]` in LIFO order. Returns `None` when the text ends inside a
/// string or closes more than it opened.
pub fn close_truncated(text: &str) -> Option<String> {
    let trimmed = text.trim_end();
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return None;
    }

    let scan = scan(trimmed);
    if scan.in_string || scan.overclosed {
        return None;
    }

    let mut closed = String::with_capacity(trimmed.len() + scan.stack.len());
    closed.push_str(trimmed);
    for frame in scan.stack.iter().rev() {
        closed.push(if frame.open == b'{' { '}' } else { ']' });
    }
    Some(closed)
}

fn close_and_parse(text: &str) -> Option<Value> {
    let closed = close_truncated(text)?;
    serde_json::from_str::<Value>(&closed).ok()
}

/// Best-effort parse of a JSON object prefix.
///
/// When the text stops inside an element of a top-level array
/// (`{"weeks":[{...` still open), that element is cut away first so only
/// fully-closed sections survive. If closing the remainder still does not
/// parse (a dangling key, a half-written number), the text is cut back to
/// the end of the last closed child container and tried again.
pub fn recover(text: &str) -> Option<Value> {
    let initial = scan(text);
    if initial.overclosed {
        return None;
    }

    let cut = match initial.stack.as_slice() {
        [root, array, element, ..]
            if root.open == b'{' && array.open == b'[' && element.open == b'{' =>
        {
            element.start
        }
        _ => text.len(),
    };
    let head = &text[..cut];
    if let Some(value) = close_and_parse(head) {
        return Some(value);
    }

    let rescan = scan(head);
    for frame in rescan.stack.iter().rev() {
        if let Some(end) = frame.last_child_end {
            if let Some(value) = close_and_parse(&head[..end]) {
                return Some(value);
            }
        }
    }
    None
}
