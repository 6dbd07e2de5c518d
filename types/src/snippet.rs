//! Caret-annotated source excerpts for diagnostics.
//!
//! Output layout for a single-line span:
//!
//! ```text
//! [1/2 TypesDoNotUnify] src/Main.purs:4:8
//!
//!   4  main = log 42
//!             ^^^^^^
//!
//! Could not match type Int with type String.
//! ```
//!
//! Multi-line spans get a `v` marker above the first line at the start column
//! and a `^` marker below the last line at the end column.

use std::path::Path;

use crossterm::style::Stylize;

use crate::{Diagnostic, Position};

/// Rendering knobs that do not affect the text layout.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Locations are shown relative to this directory when possible.
    pub root: &'a Path,
    /// Style the header and markers with ANSI colors.
    pub colors: bool,
}

/// The retained lines of a diagnostic span, with the span adjusted to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt<'s> {
    lines: Vec<&'s str>,
    position: Position,
}

impl<'s> Excerpt<'s> {
    /// Slice `position` out of `source`.
    ///
    /// A multi-line span ending at column 1 really ends on the previous line's
    /// line break, so the final line is dropped along with any blank lines
    /// left trailing by that. Returns `None` when the span starts past the end
    /// of the source.
    #[must_use]
    pub fn extract(source: &'s str, position: Position) -> Option<Self> {
        let all: Vec<&str> = source
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        let start_line = position.start_line.max(1);
        let from = start_line - 1;
        let to = position.end_line.max(start_line).min(all.len());
        if from >= to {
            return None;
        }

        let mut lines = all[from..to].to_vec();
        let mut position = Position {
            start_line,
            end_line: start_line + lines.len() - 1,
            ..position
        };

        if position.end_column == 1 && lines.len() > 1 {
            lines.pop();
            position.end_line -= 1;
            while lines.len() > 1 && lines.last().is_some_and(|line| line.is_empty()) {
                lines.pop();
                position.end_line -= 1;
            }
            position.end_column = lines
                .last()
                .map_or(1, |line| line.chars().count().max(1));
        }

        Some(Self { lines, position })
    }

    #[must_use]
    pub fn lines(&self) -> &[&'s str] {
        &self.lines
    }

    /// The span after trailing-newline adjustment.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Numbered lines plus marker lines, without header or message.
    #[must_use]
    pub fn render(&self, colors: bool) -> String {
        let pos = self.position;
        let width = pos.end_line.to_string().len();
        let gutter = " ".repeat(width + 4);
        let single_line = self.lines.len() == 1;

        let mut out = Vec::with_capacity(self.lines.len() + 2);
        if !single_line {
            out.push(format!(
                "{gutter}{}{}",
                " ".repeat(pos.start_column.saturating_sub(1)),
                paint("v", colors)
            ));
        }
        for (offset, line) in self.lines.iter().enumerate() {
            out.push(format!("  {:>width$}  {line}", pos.start_line + offset));
        }
        if single_line {
            let carets = (pos.end_column + 1).saturating_sub(pos.start_column).max(1);
            out.push(format!(
                "{gutter}{}{}",
                " ".repeat(pos.start_column.saturating_sub(1)),
                paint(&"^".repeat(carets), colors)
            ));
        } else {
            out.push(format!(
                "{gutter}{}{}",
                " ".repeat(pos.end_column.saturating_sub(1)),
                paint("^", colors)
            ));
        }
        out.join("\n")
    }
}

fn paint(text: &str, colors: bool) -> String {
    if colors {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

fn header(diagnostic: &Diagnostic, index: usize, total: usize, colors: bool) -> String {
    let header = format!("[{}/{total} {}]", index + 1, diagnostic.code());
    if colors {
        header.yellow().to_string()
    } else {
        header
    }
}

/// Render `diagnostic` as `[index/total code] message`, for diagnostics whose
/// source cannot be shown. `index` is zero-based and displayed one-based.
#[must_use]
pub fn render_message_only(
    diagnostic: &Diagnostic,
    index: usize,
    total: usize,
    options: &RenderOptions<'_>,
) -> String {
    format!(
        "{} {}",
        header(diagnostic, index, total, options.colors),
        diagnostic.message()
    )
}

/// Render `diagnostic` against the text of the file it points into.
///
/// `index` is zero-based and displayed one-based. Falls back to
/// [`render_message_only`] when the diagnostic has no location or the
/// location is outside `source`.
#[must_use]
pub fn render_diagnostic(
    source: &str,
    diagnostic: &Diagnostic,
    index: usize,
    total: usize,
    options: &RenderOptions<'_>,
) -> String {
    let (Some(path), Some(position)) = (diagnostic.path(), diagnostic.position()) else {
        return render_message_only(diagnostic, index, total, options);
    };
    let Some(excerpt) = Excerpt::extract(source, position) else {
        return render_message_only(diagnostic, index, total, options);
    };

    let shown = path.strip_prefix(options.root).unwrap_or(path);
    format!(
        "{} {}:{}:{}\n\n{}\n\n{}",
        header(diagnostic, index, total, options.colors),
        shown.display(),
        position.start_line,
        position.start_column,
        excerpt.render(options.colors),
        diagnostic.message()
    )
}
