//! Insert and upsert plan generators.
//!
//! Both generators keep columns in the order they were added, so the SQL
//! they produce is deterministic. Table and column names are spliced into
//! the SQL unquoted and must be plain identifiers; values go through the
//! usual placeholder binding.

use crate::errors::{Result, StoreError};
use crate::statement::StatementText;
use crate::transaction::TransactionPlan;
use crate::value::Param;

/// Value of one insert column.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertValue {
    /// A bound value.
    Value(Param),
    /// `max(column) + 1` over the existing rows, or 1 for an empty table.
    AutoNext,
}

/// Insert one row, then select it back by `ROWID`.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertPlan {
    table: String,
    fields: Vec<(String, InsertValue)>,
}

impl InsertPlan {
    /// Start an insert into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
        }
    }

    /// Set a column value. Setting a column twice keeps its first position.
    #[must_use]
    pub fn field(self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.with(name.into(), InsertValue::Value(value.into()))
    }

    /// Fill a column with the next value after the current maximum.
    #[must_use]
    pub fn auto_next(self, name: impl Into<String>) -> Self {
        self.with(name.into(), InsertValue::AutoNext)
    }

    fn with(mut self, name: String, value: InsertValue) -> Self {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Build the two-statement plan: the insert, then the select of the
    /// inserted row.
    pub fn build(&self) -> Result<TransactionPlan> {
        check_identifier("table", &self.table)?;
        if self.fields.is_empty() {
            return Err(StoreError::InvalidPlan(format!(
                "insert into {} has no fields",
                self.table
            )));
        }
        for (name, _) in &self.fields {
            check_identifier("column", name)?;
        }

        let mut insert = StatementText::new(format!("insert into {} (", self.table));
        for (name, _) in &self.fields {
            let _ = insert.push_str(name).push_str(",");
        }
        let _ = insert.chop(",").push_str(") values (");
        for _ in &self.fields {
            let _ = insert.push_str("?,");
        }
        let _ = insert.chop(",").push_str(")");

        for (i, (name, value)) in self.fields.iter().enumerate() {
            let param = match value {
                InsertValue::Value(param) => param.clone(),
                InsertValue::AutoNext => Param::Statement(StatementText::new(format!(
                    "(select ifnull(max({name}), 0) from {}) + 1",
                    self.table
                ))),
            };
            let _ = insert.bind(i + 1, param);
        }

        let select = StatementText::new(format!(
            "select * from {} where ROWID = last_insert_rowid()",
            self.table
        ));

        Ok(TransactionPlan::new().add(insert).add(select))
    }
}

#[derive(Clone, Debug, PartialEq)]
struct UpsertField {
    name: String,
    value: Param,
    insert_only: bool,
}

/// Insert a row if its key is absent, then update the row matching the key.
///
/// The key columns must carry a unique constraint (a primary key or unique
/// index). Without one, `insert or ignore` never conflicts and every upsert
/// adds a row.
///
/// Fields flagged insert-only are written by the insert and never by the
/// update. The plan selects nothing; query by key afterwards to read the
/// resulting row.
#[derive(Clone, Debug, PartialEq)]
pub struct UpsertPlan {
    table: String,
    keys: Vec<(String, Param)>,
    fields: Vec<UpsertField>,
}

impl UpsertPlan {
    /// Start an upsert into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            keys: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Add a key column with its fixed value.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.keys.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.keys.push((name, value)),
        }
        self
    }

    /// Add a field written on insert and on update.
    #[must_use]
    pub fn field(self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.field_with(name, value, false)
    }

    /// Add a field written only when the row is first inserted.
    #[must_use]
    pub fn insert_only(self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.field_with(name, value, true)
    }

    /// Add a field, choosing whether updates leave it alone.
    #[must_use]
    pub fn field_with(
        mut self,
        name: impl Into<String>,
        value: impl Into<Param>,
        insert_only: bool,
    ) -> Self {
        let field = UpsertField {
            name: name.into(),
            value: value.into(),
            insert_only,
        };
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Build the plan: `insert or ignore`, then `update ... where key`.
    ///
    /// The update is omitted when every field is insert-only.
    pub fn build(&self) -> Result<TransactionPlan> {
        check_identifier("table", &self.table)?;
        if self.keys.is_empty() {
            return Err(StoreError::InvalidPlan(format!(
                "upsert into {} has no key columns",
                self.table
            )));
        }
        for name in self
            .keys
            .iter()
            .map(|(n, _)| n)
            .chain(self.fields.iter().map(|f| &f.name))
        {
            check_identifier("column", name)?;
        }

        let inserted: Vec<(&str, &Param)> = self
            .keys
            .iter()
            .map(|(n, v)| (n.as_str(), v))
            .chain(self.fields.iter().map(|f| (f.name.as_str(), &f.value)))
            .collect();

        let mut insert = StatementText::new(format!("insert or ignore into {} (", self.table));
        for (name, _) in &inserted {
            let _ = insert.push_str(name).push_str(",");
        }
        let _ = insert.chop(",").push_str(") values (");
        for _ in &inserted {
            let _ = insert.push_str("?,");
        }
        let _ = insert.chop(",").push_str(")");
        for (i, (_, value)) in inserted.iter().enumerate() {
            let _ = insert.bind(i + 1, (*value).clone());
        }

        let mut plan = TransactionPlan::new().add(insert);

        let updated: Vec<&UpsertField> = self.fields.iter().filter(|f| !f.insert_only).collect();
        if !updated.is_empty() {
            let mut update = StatementText::new(format!("update {} set ", self.table));
            for field in &updated {
                let _ = update.push_str(&field.name).push_str(" = ?,");
            }
            let _ = update.chop(",").push_str(" where ");
            for (name, _) in &self.keys {
                let _ = update.push_str(name).push_str(" = ? and ");
            }
            let _ = update.chop(" and ");

            let values = updated
                .iter()
                .map(|f| &f.value)
                .chain(self.keys.iter().map(|(_, v)| v));
            for (i, value) in values.enumerate() {
                let _ = update.bind(i + 1, value.clone());
            }
            let _ = plan.push(update);
        }

        Ok(plan)
    }
}

/// Reject names that are not plain (optionally schema-qualified) identifiers.
fn check_identifier(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPlan(format!("invalid {kind} name: {name:?}")))
    }
}
