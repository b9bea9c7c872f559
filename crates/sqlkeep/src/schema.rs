//! Versioned schema definitions.
//!
//! A store's schema is a name plus an ordered list of migration steps. Step
//! `i` (1-based) takes the store from version `i - 1` to version `i`.
//!
//! ```ignore
//! let def = define_schema("inventory")
//!     .step(["create table item (id integer primary key, name text)"])
//!     .step(["alter table item add column qty integer"])
//!     .build()?;
//! ```

use std::sync::Arc;

use crate::errors::{Result, StoreError};
use crate::statement::StatementText;
use crate::transaction::TransactionPlan;

/// One migration step: raw SQL statements run as a single transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationStep {
    statements: Vec<String>,
}

impl MigrationStep {
    /// Step from raw statement texts.
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// The raw statement texts, in order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The step as an executable plan. Statements run exactly as written.
    pub fn to_plan(&self) -> TransactionPlan {
        self.statements
            .iter()
            .map(|sql| StatementText::raw(sql.as_str()))
            .collect()
    }
}

/// A named, versioned schema. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDefinition {
    name: String,
    steps: Vec<MigrationStep>,
}

impl SchemaDefinition {
    /// Store name. Also the key of its version record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Migration steps; index 0 is version 1.
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Step producing `version` (1-based), if defined.
    pub fn step(&self, version: usize) -> Option<&MigrationStep> {
        version.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Target version: the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Start a schema definition named `name`.
pub fn define_schema(name: impl Into<String>) -> SchemaBuilder {
    SchemaBuilder {
        name: name.into(),
        steps: Vec::new(),
        version_zero: None,
    }
}

/// Builder returned by [`define_schema`].
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    name: String,
    steps: Vec<MigrationStep>,
    version_zero: Option<String>,
}

impl SchemaBuilder {
    /// Append the next step.
    #[must_use]
    pub fn step<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(MigrationStep::new(statements));
        self
    }

    /// Add `sql` to the step producing `version` (1-based), creating it and
    /// any steps before it as needed. Version 0 fails at [`Self::build`].
    #[must_use]
    pub fn statement(mut self, version: usize, sql: impl Into<String>) -> Self {
        let Some(index) = version.checked_sub(1) else {
            let _ = self.version_zero.get_or_insert(sql.into());
            return self;
        };
        if self.steps.len() <= index {
            self.steps.resize_with(index + 1, MigrationStep::default);
        }
        self.steps[index].statements.push(sql.into());
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> Result<Arc<SchemaDefinition>> {
        if self.name.trim().is_empty() {
            return Err(definition("schema name is empty"));
        }
        if let Some(sql) = &self.version_zero {
            return Err(definition(format!(
                "{} has a statement for version 0 (versions start at 1): {sql}",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(definition(format!("{} has no migration steps", self.name)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.statements.is_empty() {
                return Err(definition(format!(
                    "{} step {} has no statements",
                    self.name,
                    i + 1
                )));
            }
            if step.statements.iter().any(|s| s.trim().is_empty()) {
                return Err(definition(format!(
                    "{} step {} has a blank statement",
                    self.name,
                    i + 1
                )));
            }
        }
        Ok(Arc::new(SchemaDefinition {
            name: self.name,
            steps: self.steps,
        }))
    }
}

fn definition(message: impl Into<String>) -> StoreError {
    StoreError::Definition {
        message: message.into(),
    }
}
