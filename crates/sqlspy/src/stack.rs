//! Locating the application frame that triggered a logged call.
//!
//! The locator itself is pure: it works on a list of [`StackFrame`]s handed
//! over by a [`StackSource`]. [`BacktraceSource`] captures the real call
//! stack through `std::backtrace`; tests use [`FixedStack`].

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Path prefix of every frame that belongs to this crate.
pub const OWN_NAMESPACE: &str = "sqlspy::";

/// One call stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Fully qualified path of the defining unit, e.g. `app::repo::UserRepo`.
    pub unit: String,
    /// Function name within the unit.
    pub member: String,
    /// Source file name, without directories.
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(
        unit: impl Into<String>,
        member: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            unit: unit.into(),
            member: member.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// Split a demangled symbol path into unit and member.
    pub fn from_symbol(symbol: &str, file: Option<&str>, line: Option<u32>) -> Self {
        let symbol = strip_symbol_hash(symbol.trim());
        let (unit, member) = match symbol.rsplit_once("::") {
            Some((unit, member)) => (unit, member),
            None => ("", symbol),
        };
        Self {
            unit: unit.to_string(),
            member: member.to_string(),
            file: file.map(file_name),
            line,
        }
    }

    fn belongs_to(&self, namespace: &str) -> bool {
        self.unit.trim_start_matches('<').starts_with(namespace)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.member)?;
        } else {
            write!(f, "{}::{}", self.unit, self.member)?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "({file}:{line})"),
            (Some(file), None) => write!(f, "({file})"),
            _ => f.write_str("(Unknown Source)"),
        }
    }
}

fn file_name(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

fn strip_symbol_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

/// Supplies the current call stack, innermost frame first.
pub trait StackSource: Send + Sync {
    fn frames(&self) -> Vec<StackFrame>;
}

/// A fixed stack, for tests and for hosts that capture frames themselves.
#[derive(Debug, Clone, Default)]
pub struct FixedStack(pub Vec<StackFrame>);

impl StackSource for FixedStack {
    fn frames(&self) -> Vec<StackFrame> {
        self.0.clone()
    }
}

/// Captures the real stack with [`std::backtrace::Backtrace`].
///
/// Frames are recovered from the backtrace's text form. Without debug info
/// file and line are missing and frames render as `(Unknown Source)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceSource;

impl StackSource for BacktraceSource {
    fn frames(&self) -> Vec<StackFrame> {
        let text = std::backtrace::Backtrace::force_capture().to_string();
        parse_backtrace(&text)
            .into_iter()
            .skip_while(|f| f.belongs_to("std::backtrace"))
            .collect()
    }
}

fn frame_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+:\s+(.+?)\s*$").expect("valid regex"))
}

fn location_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(.+?):(\d+)(?::\d+)?\s*$").expect("valid regex"))
}

/// Parse the text form of a `std::backtrace::Backtrace`.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines() {
        if let Some(caps) = frame_line_re().captures(line) {
            if let Some(symbol) = pending.take() {
                frames.push(StackFrame::from_symbol(&symbol, None, None));
            }
            pending = Some(caps[1].to_string());
        } else if let Some(caps) = location_line_re().captures(line) {
            if let Some(symbol) = pending.take() {
                let line_no = caps[2].parse().ok();
                frames.push(StackFrame::from_symbol(&symbol, Some(&caps[1]), line_no));
            }
        }
    }
    if let Some(symbol) = pending {
        frames.push(StackFrame::from_symbol(&symbol, None, None));
    }

    frames
}

/// Picks the frame worth showing next to a log line.
#[derive(Debug, Clone)]
pub struct StackLocator {
    namespace: String,
    app_pattern: Option<Regex>,
    full: bool,
}

impl Default for StackLocator {
    fn default() -> Self {
        Self {
            namespace: OWN_NAMESPACE.to_string(),
            app_pattern: None,
            full: false,
        }
    }
}

impl StackLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit every foreign frame instead of a single one.
    pub fn full_stack(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Report the first frame whose unit fully matches `pattern`.
    ///
    /// An invalid pattern leaves the locator without one.
    pub fn app_pattern(mut self, pattern: &str) -> Self {
        self.app_pattern = Regex::new(&format!("^(?:{pattern})$")).ok();
        self
    }

    /// Treat units under `namespace` as this library's own frames.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Render the diagnostic text for `frames` (innermost first).
    pub fn locate(&self, frames: &[StackFrame]) -> String {
        if self.full {
            self.locate_full(frames)
        } else {
            self.locate_single(frames)
        }
    }

    fn locate_full(&self, frames: &[StackFrame]) -> String {
        let mut dump = String::new();
        let mut first = true;
        for frame in frames.iter().filter(|f| !f.belongs_to(&self.namespace)) {
            if first {
                first = false;
            } else {
                dump.push_str("  ");
            }
            dump.push_str(&format!("at {frame}\n"));
        }
        dump
    }

    fn locate_single(&self, frames: &[StackFrame]) -> String {
        let mut last_own: Option<usize> = None;
        let mut app_frame: Option<usize> = None;

        for (i, frame) in frames.iter().enumerate() {
            if frame.belongs_to(&self.namespace) {
                last_own = Some(i);
            } else if let Some(pattern) = &self.app_pattern {
                if pattern.is_match(&frame.unit) {
                    app_frame = Some(i);
                    break;
                }
            }
        }

        let target = app_frame.unwrap_or_else(|| last_own.map_or(0, |i| i + 1));
        match frames.get(target) {
            Some(frame) => format!(" {frame}"),
            None => String::new(),
        }
    }
}
