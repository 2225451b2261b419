//! Runtime configuration.
//!
//! A [`SpyConfig`] is built once, either with the `with_*` builders or
//! loaded from property pairs, environment variables or a TOML document, and
//! then frozen inside the delegate.
//!
//! ```rust,ignore
//! use sqlspy::SpyConfig;
//!
//! let config = SpyConfig::new()
//!     .with_format_sql(true)
//!     .with_warn_threshold_ms(200)
//!     .with_error_threshold_ms(2_000);
//!
//! // Or, from `SQLSPY_FORMAT_SQL=true` style variables:
//! let config = SpyConfig::from_env()?;
//! ```

use crate::error::{SpyError, SpyResult};
use crate::filter::SqlFilter;
use crate::severity::Thresholds;
use crate::stack::StackLocator;
use regex::Regex;
use serde::Deserialize;


/// Prefix shared by every property key.
pub const KEY_PREFIX: &str = "sqlspy.";

/// Immutable settings consulted by the delegate and the SQL pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpyConfig {
    /// Log `select` statements when filtering is on.
    pub dump_sql_select: bool,
    pub dump_sql_insert: bool,
    pub dump_sql_update: bool,
    pub dump_sql_delete: bool,
    pub dump_sql_create: bool,

    /// End every dumped statement with `;`.
    pub add_semicolon: bool,
    /// Wrap dumped SQL near this many characters; 0 disables wrapping.
    pub max_line_length: usize,
    pub trim_sql: bool,
    /// Collapse runs of blank lines in dumped SQL into one.
    pub trim_extra_blank_lines: bool,
    /// Lay dumped SQL out over several lines.
    pub format_sql: bool,
    /// Colour dumped SQL with ANSI escapes.
    pub highlight_sql: bool,

    /// Timing events at or above this many milliseconds log at warn.
    pub warn_threshold_ms: Option<u64>,
    /// Timing events at or above this many milliseconds log at error.
    pub error_threshold_ms: Option<u64>,

    /// Show every application frame in debug output instead of one.
    pub full_debug_stack_trace: bool,
    /// Regex matching the code units of the application.
    ///
    /// When set, debug output points at the first matching frame instead of
    /// the direct caller of this library.
    pub debug_stack_prefix: Option<String>,

    /// Render booleans as `true`/`false` instead of `1`/`0`.
    pub boolean_as_true_false: bool,
}

impl Default for SpyConfig {
    fn default() -> Self {
        Self {
            dump_sql_select: true,
            dump_sql_insert: true,
            dump_sql_update: true,
            dump_sql_delete: true,
            dump_sql_create: true,
            add_semicolon: false,
            max_line_length: 90,
            trim_sql: true,
            trim_extra_blank_lines: true,
            format_sql: false,
            highlight_sql: false,
            warn_threshold_ms: None,
            error_threshold_ms: None,
            full_debug_stack_trace: false,
            debug_stack_prefix: None,
            boolean_as_true_false: false,
        }
    }
}

impl SpyConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration with every SQL text transformation turned off.
    ///
    /// Dumps are then the marker followed by the statement as executed.
    pub fn raw() -> Self {
        Self {
            max_line_length: 0,
            trim_sql: false,
            trim_extra_blank_lines: false,
            ..Self::default()
        }
    }

    pub fn with_dump_sql_select(mut self, enabled: bool) -> Self {
        self.dump_sql_select = enabled;
        self
    }

    pub fn with_dump_sql_insert(mut self, enabled: bool) -> Self {
        self.dump_sql_insert = enabled;
        self
    }

    pub fn with_dump_sql_update(mut self, enabled: bool) -> Self {
        self.dump_sql_update = enabled;
        self
    }

    pub fn with_dump_sql_delete(mut self, enabled: bool) -> Self {
        self.dump_sql_delete = enabled;
        self
    }

    pub fn with_dump_sql_create(mut self, enabled: bool) -> Self {
        self.dump_sql_create = enabled;
        self
    }

    pub fn with_add_semicolon(mut self, enabled: bool) -> Self {
        self.add_semicolon = enabled;
        self
    }

    /// Set the wrap width. `0` disables wrapping.
    pub fn with_max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = len;
        self
    }

    pub fn with_trim_sql(mut self, enabled: bool) -> Self {
        self.trim_sql = enabled;
        self
    }

    pub fn with_trim_extra_blank_lines(mut self, enabled: bool) -> Self {
        self.trim_extra_blank_lines = enabled;
        self
    }

    pub fn with_format_sql(mut self, enabled: bool) -> Self {
        self.format_sql = enabled;
        self
    }

    pub fn with_highlight_sql(mut self, enabled: bool) -> Self {
        self.highlight_sql = enabled;
        self
    }

    /// Log timing events at warn once they take at least `ms` milliseconds.
    pub fn with_warn_threshold_ms(mut self, ms: u64) -> Self {
        self.warn_threshold_ms = Some(ms);
        self
    }

    /// Log timing events at error once they take at least `ms` milliseconds.
    pub fn with_error_threshold_ms(mut self, ms: u64) -> Self {
        self.error_threshold_ms = Some(ms);
        self
    }

    pub fn with_full_debug_stack_trace(mut self, enabled: bool) -> Self {
        self.full_debug_stack_trace = enabled;
        self
    }

    /// Point debug output at the first frame whose unit fully matches `pattern`.
    pub fn with_debug_stack_prefix(mut self, pattern: impl Into<String>) -> Self {
        self.debug_stack_prefix = Some(pattern.into());
        self
    }

    pub fn with_boolean_as_true_false(mut self, enabled: bool) -> Self {
        self.boolean_as_true_false = enabled;
        self
    }

    /// The statement-kind filter described by the `dump_sql_*` flags.
    pub fn filter(&self) -> SqlFilter {
        SqlFilter {
            select: self.dump_sql_select,
            insert: self.dump_sql_insert,
            update: self.dump_sql_update,
            delete: self.dump_sql_delete,
            create: self.dump_sql_create,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn_ms: self.warn_threshold_ms,
            error_ms: self.error_threshold_ms,
        }
    }

    /// A stack locator honouring the diagnostic settings.
    pub fn locator(&self) -> StackLocator {
        let locator = StackLocator::new().full_stack(self.full_debug_stack_trace);
        match &self.debug_stack_prefix {
            Some(pattern) => locator.app_pattern(pattern),
            None => locator,
        }
    }

    /// Check settings that can only be validated as a whole.
    pub fn validate(&self) -> SpyResult<()> {
        if let Some(pattern) = &self.debug_stack_prefix {
            Regex::new(pattern)
                .map_err(|e| SpyError::config("sqlspy.debug.stack.prefix", e.to_string()))?;
        }
        Ok(())
    }

    /// Build a configuration from `sqlspy.*` property pairs.
    ///
    /// Keys without the prefix are ignored, as are unrecognized `sqlspy.`
    /// keys. Booleans accept `true/false/yes/no/on/off/1/0` in any case.
    /// A negative threshold leaves that threshold disabled.
    pub fn from_properties<I, K, V>(props: I) -> SpyResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in props {
            let key = key.as_ref().trim();
            if let Some(name) = key.strip_prefix(KEY_PREFIX) {
                config.apply(name, value.as_ref().trim())?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from environment variables.
    ///
    /// Each property key maps to an upper-case variable with `.` replaced by
    /// `_`, e.g. `sqlspy.format.sql` is read from `SQLSPY_FORMAT_SQL`.
    pub fn from_env() -> SpyResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`SpyConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> SpyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let props = PROPERTY_KEYS.iter().filter_map(|name| {
            let key = format!("{KEY_PREFIX}{name}");
            lookup(&env_var_name(&key)).map(|value| (key, value))
        });
        Self::from_properties(props)
    }

    /// Parse a TOML document.
    ///
    /// Settings may sit at the top level or under a `[sqlspy]` table, using
    /// the field names of this struct (`format_sql = true`).
    pub fn from_toml_str(s: &str) -> SpyResult<Self> {
        let mut table: toml::Table =
            toml::from_str(s).map_err(|e| SpyError::config("toml", e.to_string()))?;
        let section = match table.remove("sqlspy") {
            Some(toml::Value::Table(section)) => section,
            Some(_) => return Err(SpyError::config("sqlspy", "expected a table")),
            None => table,
        };
        let config: Self = toml::Value::Table(section)
            .try_into()
            .map_err(|e| SpyError::config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, name: &str, value: &str) -> SpyResult<()> {
        match name {
            "dump.sql.select" => self.dump_sql_select = parse_bool(name, value)?,
            "dump.sql.insert" => self.dump_sql_insert = parse_bool(name, value)?,
            "dump.sql.update" => self.dump_sql_update = parse_bool(name, value)?,
            "dump.sql.delete" => self.dump_sql_delete = parse_bool(name, value)?,
            "dump.sql.create" => self.dump_sql_create = parse_bool(name, value)?,
            "dump.sql.addsemicolon" => self.add_semicolon = parse_bool(name, value)?,
            "dump.sql.maxlinelength" => {
                self.max_line_length = value
                    .parse::<i64>()
                    .map(|n| usize::try_from(n).unwrap_or(0))
                    .map_err(|e| SpyError::config(full_key(name), e.to_string()))?;
            }
            "trim.sql" => self.trim_sql = parse_bool(name, value)?,
            "trim.sql.extrablanklines" => self.trim_extra_blank_lines = parse_bool(name, value)?,
            "format.sql" => self.format_sql = parse_bool(name, value)?,
            "highlight.sql" => self.highlight_sql = parse_bool(name, value)?,
            "sqltiming.warn.threshold" => self.warn_threshold_ms = parse_threshold(name, value)?,
            "sqltiming.error.threshold" => self.error_threshold_ms = parse_threshold(name, value)?,
            "dump.fulldebugstacktrace" => self.full_debug_stack_trace = parse_bool(name, value)?,
            "debug.stack.prefix" => {
                self.debug_stack_prefix = (!value.is_empty()).then(|| value.to_string());
            }
            "dump.booleanastruefalse" => self.boolean_as_true_false = parse_bool(name, value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Every recognized key, without the `sqlspy.` prefix.
pub const PROPERTY_KEYS: &[&str] = &[
    "dump.sql.select",
    "dump.sql.insert",
    "dump.sql.update",
    "dump.sql.delete",
    "dump.sql.create",
    "dump.sql.addsemicolon",
    "dump.sql.maxlinelength",
    "trim.sql",
    "trim.sql.extrablanklines",
    "format.sql",
    "highlight.sql",
    "sqltiming.warn.threshold",
    "sqltiming.error.threshold",
    "dump.fulldebugstacktrace",
    "debug.stack.prefix",
    "dump.booleanastruefalse",
];

/// Environment variable holding property `key`.
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn full_key(name: &str) -> String {
    format!("{KEY_PREFIX}{name}")
}

fn parse_bool(name: &str, value: &str) -> SpyResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(SpyError::config(
            full_key(name),
            format!("expected a boolean, got `{value}`"),
        )),
    }
}

fn parse_threshold(name: &str, value: &str) -> SpyResult<Option<u64>> {
    let ms: i64 = value
        .parse()
        .map_err(|e: std::num::ParseIntError| SpyError::config(full_key(name), e.to_string()))?;
    Ok(u64::try_from(ms).ok())
}
