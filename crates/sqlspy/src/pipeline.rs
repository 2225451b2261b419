//! Turns raw statement text into the dump written to the SQL channels.

use crate::config::SpyConfig;
use crate::format::{
    BasicFormatter, DdlFormatter, Highlighter, SqlFormatter, is_definition_statement,
};
use colored::Colorize;
use std::io::{BufRead, Cursor};

/// Prefix of every dumped statement.
pub const MARKER: &str = "[sqlspy] ";

/// The configured sequence of text transformations.
///
/// Stages run in a fixed order: semicolon, layout, trim, highlight, wrap,
/// blank-line collapse, layout indent, marker. Each can be switched off
/// except the marker.
#[derive(Debug, Clone)]
pub struct SqlPipeline {
    add_semicolon: bool,
    format_sql: bool,
    trim_sql: bool,
    highlight_sql: bool,
    max_line_length: usize,
    trim_extra_blank_lines: bool,
}

impl SqlPipeline {
    pub fn from_config(config: &SpyConfig) -> Self {
        Self {
            add_semicolon: config.add_semicolon,
            format_sql: config.format_sql,
            trim_sql: config.trim_sql,
            highlight_sql: config.highlight_sql,
            max_line_length: config.max_line_length,
            trim_extra_blank_lines: config.trim_extra_blank_lines,
        }
    }

    /// Run every enabled stage over `sql`.
    pub fn process(&self, sql: Option<&str>) -> Option<String> {
        let sql = sql?;

        let mut out = if self.format_sql {
            if is_definition_statement(sql) {
                DdlFormatter.format(sql)
            } else {
                BasicFormatter.format(sql)
            }
        } else {
            sql.to_string()
        };
        if self.add_semicolon {
            out.push(';');
        }

        if self.trim_sql {
            out = out.trim().to_string();
        }

        if self.highlight_sql {
            out = Highlighter.format(&out);
        }

        if self.max_line_length > 0 {
            out = wrap(&out, self.max_line_length);
        }

        if self.trim_extra_blank_lines {
            out = collapse_blank_lines(&out);
        }

        if self.format_sql {
            let indent = if self.max_line_length == 0 { "    " } else { "" };
            out = format!("\n{indent}{out}");
        }

        let marker = if self.highlight_sql {
            colored::control::set_override(true);
            format!("{} ", "[sqlspy]".magenta())
        } else {
            MARKER.to_string()
        };
        out.insert_str(0, &marker);
        Some(out)
    }
}

/// Greedy re-wrap: every token is followed by one space, and a newline once
/// the running line length passes `max` characters.
fn wrap(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / max.max(1) + 1);
    let mut line_len = 0usize;
    for token in text.split([' ', '\t', '\n', '\r', '\x0c']).filter(|t| !t.is_empty()) {
        out.push_str(token);
        out.push(' ');
        line_len += token.chars().count() + 1;
        if line_len > max {
            out.push('\n');
            line_len = 0;
        }
    }
    out
}

/// Keep the first blank line of each run and drop the rest.
///
/// Every emitted line ends in `\n`. A read error ends the output there.
pub(crate) fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in Cursor::new(text.as_bytes()).lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
            out.push_str(&line);
        }
        out.push('\n');
    }
    out
}
