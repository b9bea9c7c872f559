//! Ordered statements executed as one atomic unit.

use crate::statement::StatementText;

/// Statement opening every plan.
pub const BEGIN: &str = "BEGIN";
/// Statement closing every successful plan.
pub const COMMIT: &str = "COMMIT";
/// Statement issued when any statement of a plan fails.
pub const ROLLBACK: &str = "ROLLBACK";

/// An ordered list of statements run inside a single engine transaction.
///
/// Either every statement takes effect or none does. Executing a plan yields
/// one row list per `select` statement, in plan order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionPlan {
    statements: Vec<StatementText>,
}

impl TransactionPlan {
    /// An empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement.
    #[must_use]
    pub fn add(mut self, statement: impl Into<StatementText>) -> Self {
        self.push(statement);
        self
    }

    /// Append a statement in place.
    pub fn push(&mut self, statement: impl Into<StatementText>) -> &mut Self {
        self.statements.push(statement.into());
        self
    }

    /// Number of statements, excluding the transaction markers.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the plan has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The statements, excluding the transaction markers.
    pub fn statements(&self) -> &[StatementText] {
        &self.statements
    }

    /// Rendered statements without the transaction markers.
    pub fn render_body(&self) -> Vec<String> {
        self.statements.iter().map(StatementText::render).collect()
    }

    /// Full rendered plan: `BEGIN`, each statement, `COMMIT`.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.statements.len() + 2);
        out.push(BEGIN.to_string());
        out.extend(self.render_body());
        out.push(COMMIT.to_string());
        out
    }
}

impl From<Vec<StatementText>> for TransactionPlan {
    fn from(statements: Vec<StatementText>) -> Self {
        Self { statements }
    }
}

impl FromIterator<StatementText> for TransactionPlan {
    fn from_iter<I: IntoIterator<Item = StatementText>>(iter: I) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}
