//! Text surgery on near-JSON
//!
//! - `candidates`: JSON-looking spans inside prose or code fences
//! - `lexical_repair`: trailing commas, raw control characters in strings,
//!   Python literals
//! - `close_truncated`: finish a structure that was cut off mid-stream
//!
//! Every scan works on ASCII structural characters only, so slicing at the
//! positions it finds is always on a char boundary.

/// Attempts `close_truncated` makes before giving up
const MAX_CLOSE_ATTEMPTS: usize = 64;

/// JSON-looking spans, most specific first
///
/// Fenced blocks come first, then the span from the first `{` and the
/// first `[` to their last matching closer (or to the end of input when
/// the closer never arrives).
pub(crate) fn candidates(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for block in fenced_blocks(text) {
        push_unique(&mut out, block);
    }

    let mut spans: Vec<(usize, &str)> = Vec::new();
    for (open, close) in [(b'{', b'}'), (b'[', b']')] {
        if let Some(start) = text.bytes().position(|b| b == open) {
            let end = text
                .bytes()
                .rposition(|b| b == close)
                .filter(|end| *end > start)
                .map_or(text.len(), |end| end + 1);
            spans.push((start, &text[start..end]));
        }
    }
    spans.sort_by_key(|(start, _)| *start);
    for (_, span) in spans {
        push_unique(&mut out, span);
    }
    out
}

fn push_unique<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() && !out.contains(&s) {
        out.push(s);
    }
}

/// Contents of ``` fenced blocks; an unterminated fence runs to the end
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map_or(after.len(), |nl| nl + 1);
        let info = &after[..body_start];
        let body = if info.trim().starts_with(['{', '[']) {
            after
        } else {
            &after[body_start..]
        };
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

/// Fix lexical damage without changing structure
pub(crate) fn lexical_repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = text[i + 1..].trim_start().chars().next();
                if !matches!(next, Some('}' | ']') | None) {
                    out.push(c);
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || *n == '_' {
                        word.push(*n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => word.as_str(),
                });
            }
            c if c.is_control() && !c.is_ascii_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

/// Structural scan of a prefix
struct Scan {
    /// Open brackets, innermost last
    stack: Vec<u8>,
    in_string: bool,
    escaped: bool,
    /// Byte offset of the last comma outside strings
    last_comma: Option<usize>,
    /// Byte offset of the innermost unclosed opener
    last_open: Option<usize>,
}

fn scan(text: &str) -> Option<Scan> {
    let mut s = Scan {
        stack: Vec::new(),
        in_string: false,
        escaped: false,
        last_comma: None,
        last_open: None,
    };
    let mut opens: Vec<usize> = Vec::new();
    for (i, b) in text.bytes().enumerate() {
        if s.in_string {
            if s.escaped {
                s.escaped = false;
            } else if b == b'\\' {
                s.escaped = true;
            } else if b == b'"' {
                s.in_string = false;
            }
            continue;
        }
        match b {
            b'"' => s.in_string = true,
            b'{' | b'[' => {
                s.stack.push(b);
                opens.push(i);
            }
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                if s.stack.pop() != Some(expected) {
                    return None;
                }
                opens.pop();
            }
            b',' => s.last_comma = Some(i),
            _ => {}
        }
    }
    s.last_open = opens.last().copied();
    Some(s)
}

/// Close a truncated structure so it parses
///
/// Returns the first completion that `serde_json` accepts, dropping the
/// trailing incomplete element when simply closing is not enough.
pub(crate) fn close_truncated(text: &str) -> Option<String> {
    let mut current = text.trim_end();
    for _ in 0..MAX_CLOSE_ATTEMPTS {
        let s = scan(current)?;
        if s.stack.is_empty() && !s.in_string {
            return None;
        }

        let mut candidate = current.to_string();
        if s.in_string {
            if s.escaped {
                candidate.pop();
            }
            candidate.push('"');
        }
        let trimmed_len = candidate.trim_end().trim_end_matches(',').trim_end().len();
        candidate.truncate(trimmed_len);
        if candidate.ends_with(':') {
            candidate.push_str("null");
        }
        for open in s.stack.iter().rev() {
            candidate.push(if *open == b'{' { '}' } else { ']' });
        }
        if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
            return Some(candidate);
        }

        // Drop the trailing element and try again.
        let cut = match (s.last_comma, s.last_open) {
            (Some(comma), Some(open)) if comma > open => comma,
            (_, Some(open)) if open + 1 < current.len() => open + 1,
            _ => return None,
        };
        current = current[..cut].trim_end();
    }
    None
}
