//! Best-effort repair of truncated JSON payloads.
//!
//! The server occasionally cuts a frame short. Repair only closes what is
//! already open (a string literal, objects, arrays) and drops a dangling
//! comma; it never invents keys or values. Anything that still fails to parse
//! afterwards is reported as unrepairable.

use std::borrow::Cow;

#[derive(Debug, Default)]
struct ScanState {
    open_scopes: Vec<char>,
    in_string: bool,
    escaped: bool,
    surplus_closer: bool,
}

fn scan(input: &str) -> ScanState {
    let mut state = ScanState::default();

    for c in input.chars() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if c == '\\' {
                state.escaped = true;
            } else if c == '"' {
                state.in_string = false;
            }
            continue;
        }

        match c {
            '"' => state.in_string = true,
            '{' | '[' => state.open_scopes.push(c),
            '}' | ']' => {
                let expected = if c == '}' { '{' } else { '[' };
                if state.open_scopes.pop() != Some(expected) {
                    state.surplus_closer = true;
                }
            }
            _ => {}
        }
    }

    state
}

fn parses(input: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(input).is_ok()
}

/// Repair a truncated JSON document.
///
/// Returns the input unchanged when it already parses, a repaired copy when
/// closing the open scopes makes it parse, and `None` otherwise.
pub fn repair_json(input: &str) -> Option<Cow<'_, str>> {
    if parses(input) {
        return Some(Cow::Borrowed(input));
    }

    let mut repaired = input.trim_end().to_string();
    let state = scan(&repaired);

    if state.surplus_closer {
        return None;
    }

    if state.in_string {
        if state.escaped {
            repaired.pop();
        }
        repaired.push('"');
    }

    let trimmed_len = repaired.trim_end().len();
    repaired.truncate(trimmed_len);
    if repaired.ends_with(',') {
        repaired.pop();
    }

    for scope in state.open_scopes.iter().rev() {
        repaired.push(if *scope == '{' { '}' } else { ']' });
    }

    if parses(&repaired) {
        log::debug!("Repaired truncated JSON payload ({} bytes)", input.len());
        return Some(Cow::Owned(repaired));
    }

    None
}
