//! Terminal rendering of display directives.
//!
//! Each channel gets a glyph and an ANSI colour; `Plain` gets neither.
//! Colour is optional so the same text works for pipes and `--no-color`.

use crate::output::{Channel, DisplayDirective, Outcome};

const RESET: &str = "\x1b[0m";

/// Glyph shown in front of a block, if any.
pub fn glyph(channel: Channel) -> Option<&'static str> {
    match channel {
        Channel::Success => Some("✔"),
        Channel::Error => Some("✖"),
        Channel::Warning => Some("⚠"),
        Channel::Info => Some("ℹ"),
        Channel::Plain => None,
    }
}

fn ansi(channel: Channel) -> Option<&'static str> {
    match channel {
        Channel::Success => Some("\x1b[32m"),
        Channel::Error => Some("\x1b[31m"),
        Channel::Warning => Some("\x1b[33m"),
        Channel::Info => Some("\x1b[36m"),
        Channel::Plain => None,
    }
}

/// Render one block. Lines after the first are indented under the text so
/// the glyph column stays clear; blank lines stay blank.
pub fn render_directive(directive: &DisplayDirective, color: bool) -> String {
    let Some(glyph) = glyph(directive.channel) else {
        return directive.text.clone();
    };

    let mut out = String::with_capacity(directive.text.len() + 8);
    for (i, line) in directive.text.split('\n').enumerate() {
        if i == 0 {
            out.push_str(glyph);
            out.push(' ');
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str("  ");
            }
        }
        out.push_str(line);
    }

    match ansi(directive.channel) {
        Some(code) if color => format!("{code}{out}{RESET}"),
        _ => out,
    }
}

/// Render a whole outcome, blocks separated by a blank line.
///
/// A rejection renders as a single error block. Findings with no blocks
/// render as an empty string.
pub fn render_outcome(outcome: &Outcome, color: bool) -> String {
    match outcome {
        Outcome::Rejected { message } => {
            render_directive(&DisplayDirective::new(Channel::Error, message.as_str()), color)
        }
        Outcome::Findings { blocks } => blocks
            .iter()
            .map(|d| render_directive(d, color))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}
