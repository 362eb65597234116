//! Chat-facing text formatting.

use dungeon_core::error::GameError;

/// Characters the chat platform treats as markdown.
const MARKDOWN_SPECIALS: [char; 6] = ['*', '_', '`', '~', '\\', '>'];

fn is_special(c: char) -> bool {
    MARKDOWN_SPECIALS.contains(&c)
}

/// Escapes markdown so generated text renders exactly as produced.
///
/// Already escaped specials are left escaped once, so the function is
/// idempotent.
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if is_special(next) {
                    chars.next();
                    out.push('\\');
                    out.push(next);
                    continue;
                }
            }
        }
        if is_special(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The message posted for a completed turn: the quoted action followed by
/// the escaped continuation.
#[must_use]
pub fn turn_message(action: &str, result: &str) -> String {
    format!("> {action}\n{}", escape_markdown(result))
}

/// The message posted when a turn could not be generated.
#[must_use]
pub fn failure_message(action: &str, error: &GameError) -> String {
    format!("> {action}\nThe story could not continue ({error}). Nothing was changed, try again.")
}

/// The message posted for a request dropped by a restart or new game.
#[must_use]
pub fn discarded_message(action: &str) -> String {
    format!("> {action}\nSkipped: the story was reset before this action ran.")
}
