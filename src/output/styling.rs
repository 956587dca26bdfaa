use console::{style, StyledObject};
use std::fmt::Display;

/// Styling helpers for terminal output
pub fn bright(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn bright_yellow(text: impl Display) -> StyledObject<String> {
    bright(text).yellow()
}

pub fn bright_green(text: impl Display) -> StyledObject<String> {
    bright(text).green()
}

pub fn bright_red(text: impl Display) -> StyledObject<String> {
    bright(text).red()
}

pub fn cyan(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn magenta_bold(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Label of a finished phase.
pub fn done(label: impl Display) -> StyledObject<String> {
    bright_green(format!("{label} ✓"))
}

/// Label of a phase that failed.
pub fn failed(label: impl Display) -> StyledObject<String> {
    bright_red(format!("{label} ✗"))
}
