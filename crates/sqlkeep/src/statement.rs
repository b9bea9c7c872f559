//! Parameterized SQL text assembled apart from any connection.
//!
//! Placeholders are `?` characters in the template. Values are bound by
//! 1-based position with [`StatementText::set`] and spliced into the text as
//! escaped literals when the statement is rendered.

use std::collections::BTreeMap;
use std::fmt;

use crate::value::{NULL_LITERAL, Param};

/// The placeholder character.
pub const PLACEHOLDER: char = '?';

/// A SQL template plus its bound placeholder values.
///
/// Rendering is a pure function of the template and the bindings. The Nth
/// `?` in the template is replaced by binding N, or by `NULL` when N is
/// unbound. Bound text is never re-scanned, so a `?` inside a bound value
/// cannot be mistaken for a later placeholder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatementText {
    template: String,
    bindings: BTreeMap<usize, String>,
    verbatim: bool,
}

impl StatementText {
    /// Start a statement from `sql`.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            template: sql.into(),
            bindings: BTreeMap::new(),
            verbatim: false,
        }
    }

    /// A statement run exactly as written. `?` is not a placeholder here,
    /// so bindings are ignored and `render()` returns `sql` unchanged.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            verbatim: true,
            ..Self::new(sql)
        }
    }

    /// Whether this statement was built with [`Self::raw`].
    pub fn is_raw(&self) -> bool {
        self.verbatim
    }

    /// A statement with an empty template, built up with [`Self::append`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a template fragment.
    #[must_use]
    pub fn append(mut self, fragment: &str) -> Self {
        self.push_str(fragment);
        self
    }

    /// Append a template fragment in place.
    pub fn push_str(&mut self, fragment: &str) -> &mut Self {
        self.template.push_str(fragment);
        self
    }

    /// Bind the 1-based placeholder `index` to `value`.
    #[must_use]
    pub fn set(mut self, index: usize, value: impl Into<Param>) -> Self {
        self.bind(index, value);
        self
    }

    /// Bind in place. A null value leaves the position as it was.
    pub fn bind(&mut self, index: usize, value: impl Into<Param>) -> &mut Self {
        if let Some(literal) = value.into().to_sql_literal() {
            let _ = self.bindings.insert(index, literal);
        }
        self
    }

    /// Remove `suffix` from the end of the template if it is there.
    pub fn chop(&mut self, suffix: &str) -> &mut Self {
        if !suffix.is_empty() && self.template.len() > suffix.len() {
            if let Some(stripped) = self.template.strip_suffix(suffix) {
                let keep = stripped.len();
                self.template.truncate(keep);
            }
        }
        self
    }

    /// Drop every binding, keeping the template.
    pub fn reset(&mut self) -> &mut Self {
        self.bindings.clear();
        self
    }

    /// The raw template, placeholders included.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Number of placeholders in the template.
    pub fn placeholder_count(&self) -> usize {
        if self.verbatim {
            return 0;
        }
        self.template.matches(PLACEHOLDER).count()
    }

    /// Render the final SQL text.
    pub fn render(&self) -> String {
        if self.verbatim {
            return self.template.clone();
        }
        let bound: usize = self.bindings.values().map(String::len).sum();
        let mut out = String::with_capacity(self.template.len() + bound);
        for (i, fragment) in self.template.split(PLACEHOLDER).enumerate() {
            if i > 0 {
                out.push_str(self.bindings.get(&i).map_or(NULL_LITERAL, String::as_str));
            }
            out.push_str(fragment);
        }
        out
    }

    /// Whether the statement returns rows when executed.
    pub fn is_select(&self) -> bool {
        is_select_sql(&self.template)
    }
}

/// Whether `sql` starts with `select`, ignoring case and leading whitespace.
pub(crate) fn is_select_sql(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

impl fmt::Display for StatementText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for StatementText {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for StatementText {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl From<StatementText> for String {
    fn from(stmt: StatementText) -> Self {
        stmt.render()
    }
}

impl From<&StatementText> for String {
    fn from(stmt: &StatementText) -> Self {
        stmt.render()
    }
}
