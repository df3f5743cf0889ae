//! Table include/exclude filtering by glob pattern.

use crate::config::DatabaseOptions;
use crate::error::{Error, Result};
use regex::Regex;

/// Compiled `tables` / `excluded_tables` patterns. Exclusion always wins.
#[derive(Clone, Debug)]
pub struct TableFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl TableFilter {
    pub fn from_options(options: &DatabaseOptions) -> Result<Self> {
        Ok(TableFilter {
            include: compile_all(options.tables.as_deref())?,
            exclude: compile_all(options.excluded_tables.as_deref())?,
        })
    }

    pub fn includes(&self, table_name: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(table_name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(table_name))
    }
}

impl DatabaseOptions {
    /// Whether a table with this name passes the configured filters.
    pub fn includes(&self, table_name: &str) -> Result<bool> {
        Ok(TableFilter::from_options(self)?.includes(table_name))
    }
}

fn compile_all(patterns: Option<&[String]>) -> Result<Vec<Regex>> {
    patterns
        .unwrap_or_default()
        .iter()
        .map(|p| glob_to_regex(p))
        .collect()
}

/// `?` matches one character, `*` any run; everything else is literal.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace("\\?", ".").replace("\\*", ".*");
    Regex::new(&format!("^{}$", escaped))
        .map_err(|e| Error::configuration(format!("invalid table pattern '{}': {}", pattern, e)))
}
