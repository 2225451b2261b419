//! Statement-kind filter applied before SQL is dumped.

/// Which statement kinds are logged, keyed on the first word of the SQL.
///
/// Filtering is only active when at least one kind is switched off; with
/// every kind enabled [`SqlFilter::passes`] lets everything through,
/// including statements of no recognized kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlFilter {
    pub select: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    pub create: bool,
}

impl Default for SqlFilter {
    fn default() -> Self {
        Self {
            select: true,
            insert: true,
            update: true,
            delete: true,
            create: true,
        }
    }
}

impl SqlFilter {
    /// Whether the filter restricts anything at all.
    pub fn is_on(&self) -> bool {
        !(self.select && self.insert && self.update && self.delete && self.create)
    }

    /// Whether `sql` starts with an enabled statement kind.
    pub fn should_log(&self, sql: Option<&str>) -> bool {
        let Some(sql) = sql else {
            return false;
        };
        let head: String = sql.trim().chars().take(6).collect();
        if head.chars().count() < 6 {
            return false;
        }
        match head.to_lowercase().as_str() {
            "select" => self.select,
            "insert" => self.insert,
            "update" => self.update,
            "delete" => self.delete,
            "create" => self.create,
            _ => false,
        }
    }

    /// [`SqlFilter::should_log`], unless filtering is off altogether.
    pub fn passes(&self, sql: Option<&str>) -> bool {
        !self.is_on() || self.should_log(sql)
    }
}
