//! Display formatters for statement text.
//!
//! None of these parse SQL. They tokenize just enough to break lines at
//! clause keywords, keep quoted text intact and colour keywords. Output of
//! the layout formatters starts with the first token; continuation lines are
//! indented in steps of four spaces, starting at four.

use colored::Colorize;
use std::collections::HashSet;
use std::sync::OnceLock;

const INDENT: &str = "    ";

/// Renders statement text in a display style.
pub trait SqlFormatter: Send + Sync {
    fn format(&self, sql: &str) -> String;
}

/// Whether a statement is a definition statement (`create`, `alter`, `drop`, `comment`).
pub fn is_definition_statement(sql: &str) -> bool {
    let head: String = sql.trim_start().chars().take(7).collect::<String>().to_lowercase();
    ["create", "alter", "drop", "comment"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    StringLiteral,
    QuotedIdent,
    LineComment,
    BlockComment,
    Punct,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token<'a> {
    pub(crate) start: usize,
    pub(crate) text: &'a str,
    pub(crate) kind: TokenKind,
    pub(crate) space_before: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '@' | '#')
}

/// The opening `$tag$` of a dollar-quoted string at the start of `s`, if any.
fn dollar_tag(s: &str) -> Option<&str> {
    let rest = s.strip_prefix('$')?;
    let len = rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))?;
    let tag = &rest[..len];
    if rest[len..].starts_with('$') && !tag.starts_with(|c: char| c.is_ascii_digit()) {
        Some(&s[..len + 2])
    } else {
        None
    }
}

/// Split `sql` into tokens, dropping whitespace but remembering where it was.
///
/// Dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`) come out as one
/// string literal; `$1` stays a word.
pub(crate) fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut space_before = false;

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            space_before = true;
            continue;
        }

        if c == '$' {
            if let Some(tag) = dollar_tag(&sql[start..]) {
                let body = start + tag.len();
                let end = sql[body..]
                    .find(tag)
                    .map_or(sql.len(), |i| body + i + tag.len());
                while chars.peek().is_some_and(|&(i, _)| i < end) {
                    chars.next();
                }
                tokens.push(Token {
                    start,
                    text: &sql[start..end],
                    kind: TokenKind::StringLiteral,
                    space_before,
                });
                space_before = false;
                continue;
            }
        }

        let mut end = start + c.len_utf8();
        let kind = match c {
            '\'' | '"' => {
                while let Some((i, d)) = chars.next() {
                    end = i + d.len_utf8();
                    if d == c {
                        // A doubled quote stays inside the literal.
                        if chars.peek().is_some_and(|&(_, n)| n == c) {
                            if let Some((j, n)) = chars.next() {
                                end = j + n.len_utf8();
                            }
                            continue;
                        }
                        break;
                    }
                }
                if c == '\'' {
                    TokenKind::StringLiteral
                } else {
                    TokenKind::QuotedIdent
                }
            }
            '-' if chars.peek().is_some_and(|&(_, n)| n == '-') => {
                while let Some(&(i, d)) = chars.peek() {
                    if d == '\n' {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                TokenKind::LineComment
            }
            '/' if chars.peek().is_some_and(|&(_, n)| n == '*') => {
                let mut prev = '/';
                for (i, d) in chars.by_ref() {
                    end = i + d.len_utf8();
                    if prev == '*' && d == '/' && i > start + 1 {
                        break;
                    }
                    prev = d;
                }
                TokenKind::BlockComment
            }
            c if is_word_char(c) => {
                while let Some(&(i, d)) = chars.peek() {
                    if !is_word_char(d) {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                TokenKind::Word
            }
            _ => TokenKind::Punct,
        };

        tokens.push(Token {
            start,
            text: &sql[start..end],
            kind,
            space_before,
        });
        space_before = false;
    }

    tokens
}

fn keywords() -> &'static HashSet<&'static str> {
    static KEYWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    KEYWORDS.get_or_init(|| {
        [
            "add", "all", "alter", "and", "any", "as", "asc", "between", "by", "cascade", "case",
            "check", "column", "comment", "conflict", "constraint", "create", "cross", "default",
            "delete", "desc", "distinct", "do", "drop", "else", "end", "except", "exists",
            "false", "fetch", "for", "foreign", "from", "full", "group", "having", "if", "ilike",
            "in", "index", "inner", "insert", "intersect", "into", "is", "join", "key", "left",
            "like", "limit", "not", "nothing", "null", "offset", "on", "or", "order", "outer",
            "primary", "references", "returning", "right", "select", "set", "table", "then",
            "true", "union", "unique", "update", "using", "values", "view", "when", "where",
            "with",
        ]
        .into_iter()
        .collect()
    })
}

fn is_keyword(word: &str) -> bool {
    keywords().contains(word.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone)]
struct Frame {
    base: usize,
    function: bool,
    clause: String,
}

struct Layout {
    out: String,
    frames: Vec<Frame>,
    pending_by: bool,
    in_between: bool,
    last_word: String,
}

impl Layout {
    fn new() -> Self {
        Self {
            out: String::new(),
            frames: vec![Frame {
                base: 1,
                function: false,
                clause: String::new(),
            }],
            pending_by: false,
            in_between: false,
            last_word: String::new(),
        }
    }

    fn frame(&self) -> &Frame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.trim_end_matches(' ').ends_with('\n')
    }

    fn newline(&mut self, level: usize) {
        if self.out.is_empty() {
            return;
        }
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        self.out.push('\n');
        for _ in 0..level.max(1) {
            self.out.push_str(INDENT);
        }
    }

    fn push(&mut self, token: &Token<'_>) {
        if token.space_before && !self.out.is_empty() && !self.at_line_start() {
            self.out.push(' ');
        }
        self.out.push_str(token.text);
        if token.kind == TokenKind::Word {
            self.last_word = token.text.to_ascii_lowercase();
        }
    }
}

/// Generic layout: one clause per line, clause bodies indented below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormatter;

impl SqlFormatter for BasicFormatter {
    fn format(&self, sql: &str) -> String {
        let tokens = tokenize(sql);
        let mut l = Layout::new();

        for (idx, token) in tokens.iter().enumerate() {
            let base = l.frame().base;
            match token.kind {
                TokenKind::LineComment => {
                    l.push(token);
                    l.newline(base + 1);
                    continue;
                }
                TokenKind::Word => {}
                TokenKind::Punct => {
                    match token.text {
                        "(" => {
                            let subquery = tokens.get(idx + 1).is_some_and(|t| {
                                matches!(t.text.to_ascii_lowercase().as_str(), "select" | "with")
                            });
                            l.push(token);
                            l.frames.push(Frame {
                                base: if subquery { base + 2 } else { base },
                                function: !subquery,
                                clause: String::new(),
                            });
                        }
                        ")" => {
                            if l.frames.len() > 1 {
                                if let Some(frame) = l.frames.pop() {
                                    if !frame.function {
                                        l.newline(l.frame().base + 1);
                                    }
                                }
                            }
                            l.push(token);
                        }
                        "," => {
                            l.push(token);
                            let frame = l.frame();
                            if !frame.function
                                && matches!(
                                    frame.clause.as_str(),
                                    "select" | "set" | "by" | "returning"
                                )
                            {
                                l.newline(base + 1);
                            }
                        }
                        _ => l.push(token),
                    }
                    continue;
                }
                _ => {
                    l.push(token);
                    continue;
                }
            }

            let lower = token.text.to_ascii_lowercase();
            match lower.as_str() {
                "select" | "from" | "where" | "set" | "having" | "values" | "returning"
                | "limit" | "offset" => {
                    l.newline(base);
                    l.push(token);
                    l.newline(base + 1);
                    set_clause(&mut l, &lower);
                }
                "union" | "intersect" | "except" | "insert" | "update" | "delete" | "with" => {
                    l.newline(base);
                    l.push(token);
                    set_clause(&mut l, &lower);
                }
                "group" | "order" => {
                    l.newline(base);
                    l.push(token);
                    l.pending_by = true;
                }
                "by" if l.pending_by => {
                    l.pending_by = false;
                    l.push(token);
                    l.newline(base + 1);
                    set_clause(&mut l, "by");
                }
                "left" | "right" | "inner" | "outer" | "full" | "cross" | "join" => {
                    let after_modifier = matches!(
                        l.last_word.as_str(),
                        "left" | "right" | "inner" | "outer" | "full" | "cross" | "natural"
                    );
                    if !after_modifier {
                        l.newline(base + 1);
                    }
                    l.push(token);
                }
                "between" => {
                    l.in_between = true;
                    l.push(token);
                }
                "and" | "or" => {
                    if l.in_between && lower == "and" {
                        l.in_between = false;
                    } else if !l.frame().function {
                        l.newline(base + 1);
                    }
                    l.push(token);
                }
                _ => l.push(token),
            }
        }

        l.out.trim_end().to_string()
    }
}

fn set_clause(l: &mut Layout, clause: &str) {
    if let Some(frame) = l.frames.last_mut() {
        frame.clause = clause.to_string();
    }
}

/// Layout for definition statements (`create`, `alter`, `comment`, `drop`).
///
/// `create table` puts each top-level column definition on its own line;
/// `alter table` breaks before each action; `comment on` breaks before `is`.
/// Anything else passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdlFormatter;

impl DdlFormatter {
    fn format_create_table(sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 32);
        let mut depth = 0usize;
        let mut quote: Option<char> = None;

        for c in sql.chars() {
            if let Some(q) = quote {
                out.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '(' => {
                    depth += 1;
                    out.push(c);
                    if depth == 1 {
                        out.push('\n');
                        out.push_str(INDENT);
                        out.push_str(INDENT);
                    }
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        out.push('\n');
                        out.push_str(INDENT);
                    }
                    out.push(c);
                }
                ',' if depth == 1 => {
                    out.push(c);
                    out.push('\n');
                    out.push_str(INDENT);
                    out.push_str("   ");
                }
                _ => out.push(c),
            }
        }
        out
    }

    fn format_with_breaks(sql: &str, breaks: &[&str], indent: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 32);
        for token in tokenize(sql) {
            let lower = token.text.to_ascii_lowercase();
            if token.kind == TokenKind::Word && breaks.contains(&lower.as_str()) {
                out.push('\n');
                out.push_str(indent);
            } else if token.space_before && !out.is_empty() {
                out.push(' ');
            }
            out.push_str(token.text);
        }
        out
    }
}

impl SqlFormatter for DdlFormatter {
    fn format(&self, sql: &str) -> String {
        let sql = sql.trim();
        let lower = sql.to_ascii_lowercase();
        if lower.starts_with("create table") {
            Self::format_create_table(sql)
        } else if lower.starts_with("alter table") {
            Self::format_with_breaks(
                sql,
                &["add", "drop", "references", "foreign", "on"],
                "        ",
            )
        } else if lower.starts_with("comment on") {
            Self::format_with_breaks(sql, &["is"], "       ")
        } else {
            sql.to_string()
        }
    }
}

/// Colours keywords blue, string literals cyan and quoted identifiers green.
///
/// Whitespace and every other character are kept exactly as given. Escapes
/// are emitted whether or not the process writes to a terminal: using the
/// highlighter switches `colored`'s terminal detection off for the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Highlighter;

impl SqlFormatter for Highlighter {
    fn format(&self, sql: &str) -> String {
        colored::control::set_override(true);

        let mut out = String::with_capacity(sql.len() * 2);
        let mut last = 0;

        for token in tokenize(sql) {
            out.push_str(&sql[last..token.start]);
            let painted = match token.kind {
                TokenKind::Word if is_keyword(token.text) => Some(token.text.blue()),
                TokenKind::StringLiteral => Some(token.text.cyan()),
                TokenKind::QuotedIdent => Some(token.text.green()),
                _ => None,
            };
            match painted {
                Some(painted) => out.push_str(&painted.to_string()),
                None => out.push_str(token.text),
            }
            last = token.start + token.text.len();
        }
        out.push_str(&sql[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_statement_detection() {
        assert!(is_definition_statement("CREATE TABLE t (id int)"));
        assert!(is_definition_statement("  alter table t add x int"));
        assert!(is_definition_statement("Drop index i"));
        assert!(is_definition_statement("comment on table t is 'x'"));
        assert!(!is_definition_statement("select 1"));
        assert!(!is_definition_statement("insert into t values (1)"));
        assert!(!is_definition_statement(""));
    }

    #[test]
    fn basic_select_layout() {
        let out = BasicFormatter.format("select a, b from t where x = 1 and y = 2");
        assert_eq!(
            out,
            "select\n        a,\n        b\n    from\n        t\n    where\n        x = 1\n        and y = 2"
        );
    }

    #[test]
    fn basic_keeps_function_arguments_inline() {
        let out = BasicFormatter.format("select coalesce(a, b) from t");
        assert_eq!(out, "select\n        coalesce(a, b)\n    from\n        t");
    }

    #[test]
    fn basic_between_and_stays_inline() {
        let out = BasicFormatter.format("select x from t where x between 1 and 2 or y = 3");
        assert_eq!(
            out,
            "select\n        x\n    from\n        t\n    where\n        x between 1 and 2\n        or y = 3"
        );
    }

    #[test]
    fn basic_order_by_and_join() {
        let out = BasicFormatter
            .format("select a from t left join u on t.id = u.id order by a desc, b");
        assert_eq!(
            out,
            "select\n        a\n    from\n        t\n        left join u on t.id = u.id\n    order by\n        a desc,\n        b"
        );
    }

    #[test]
    fn basic_subquery_is_indented() {
        let out = BasicFormatter.format("select a from t where id in (select id from u)");
        assert_eq!(
            out,
            "select\n        a\n    from\n        t\n    where\n        id in (\n            select\n                id\n            from\n                u\n        )"
        );
    }

    #[test]
    fn basic_keeps_literals_whole() {
        let out = BasicFormatter.format("select 'a, b from c' from t");
        assert_eq!(out, "select\n        'a, b from c'\n    from\n        t");
    }

    #[test]
    fn ddl_create_table() {
        let out = DdlFormatter.format("create table t (id int, name varchar(10))");
        assert_eq!(
            out,
            "create table t (\n        id int,\n        name varchar(10)\n    )"
        );
    }

    #[test]
    fn ddl_alter_table() {
        let out = DdlFormatter.format("alter table t add constraint fk foreign key (x) references u");
        assert_eq!(
            out,
            "alter table t\n        add constraint fk\n        foreign key (x)\n        references u"
        );
    }

    #[test]
    fn ddl_comment_on() {
        let out = DdlFormatter.format("comment on table t is 'users'");
        assert_eq!(out, "comment on table t\n       is 'users'");
    }

    #[test]
    fn ddl_other_statements_pass_through() {
        assert_eq!(DdlFormatter.format("drop table t"), "drop table t");
    }

    #[test]
    fn highlighter_colours_keywords_and_literals() {
        let out = Highlighter.format("select name from \"Users\" where x = 'a'");
        assert_eq!(
            out,
            "\x1b[34mselect\x1b[0m name \x1b[34mfrom\x1b[0m \x1b[32m\"Users\"\x1b[0m \x1b[34mwhere\x1b[0m x = \x1b[36m'a'\x1b[0m"
        );
    }

    #[test]
    fn highlighter_preserves_whitespace() {
        let out = Highlighter.format("  x\n\n  y  ");
        assert_eq!(out, "  x\n\n  y  ");
    }

    #[test]
    fn tokenizer_handles_doubled_quotes_and_comments() {
        let tokens = tokenize("'it''s' -- note\n/* c */ x");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["'it''s'", "-- note", "/* c */", "x"]);
    }

    #[test]
    fn tokenizer_keeps_dollar_quoted_bodies_whole() {
        let tokens = tokenize("do $$ a $1 'b $$; $fn$ x $$ y $fn$ $1 $2x $");
        let texts: Vec<(&str, TokenKind)> = tokens.iter().map(|t| (t.text, t.kind)).collect();
        assert_eq!(
            texts,
            vec![
                ("do", TokenKind::Word),
                ("$$ a $1 'b $$", TokenKind::StringLiteral),
                (";", TokenKind::Punct),
                ("$fn$ x $$ y $fn$", TokenKind::StringLiteral),
                ("$1", TokenKind::Word),
                ("$2x", TokenKind::Word),
                ("$", TokenKind::Word),
            ]
        );

        // An unterminated body runs to the end.
        let tokens = tokenize("select $$ open");
        assert_eq!(tokens[1].text, "$$ open");
    }
}
