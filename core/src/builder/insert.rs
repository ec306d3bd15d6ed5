use super::Returning;
use crate::dialect::Dialect;
use crate::error::{BaseModelError, Result};
use crate::sql::{SQL, Token};
use crate::value::{Row, Value};
use compact_str::CompactString;

/// An INSERT of one or more rows sharing one column list.
#[derive(Debug, Clone, Default)]
pub struct InsertQuery {
    pub table: CompactString,
    pub columns: Vec<CompactString>,
    pub rows: Vec<Vec<Value>>,
    pub returning: Returning,
}

impl InsertQuery {
    pub fn into_table(table: impl Into<CompactString>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Adds a row given as physical column to value.
    ///
    /// The first row fixes the column list; later rows are aligned to it and
    /// may not introduce new columns.
    pub fn row(mut self, row: &Row) -> Result<Self> {
        if self.rows.is_empty() && self.columns.is_empty() {
            self.columns = row.keys().map(|k| CompactString::from(k.as_str())).collect();
        } else if let Some(extra) = row
            .keys()
            .find(|k| !self.columns.iter().any(|c| c.as_str() == k.as_str()))
        {
            return Err(BaseModelError::Statement(format!(
                "column {extra} is not part of the bulk insert column list"
            )));
        }
        self.push_aligned(row);
        Ok(self)
    }

    /// Splits `rows` into statements whose rows share one key set, so a
    /// column a row leaves out keeps its DEFAULT instead of receiving NULL.
    ///
    /// Statements come out in the order their key set first appears; rows
    /// without keys become single `DEFAULT VALUES` inserts.
    pub fn batches<'r, I>(table: impl Into<CompactString>, rows: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let table = table.into();
        let mut batches: Vec<Self> = Vec::new();
        for row in rows {
            let open = batches.iter_mut().find(|batch| {
                !row.is_empty()
                    && batch.columns.len() == row.len()
                    && batch.columns.iter().all(|c| row.contains_key(c.as_str()))
            });
            match open {
                Some(batch) => batch.push_aligned(row),
                None => batches.push(Self::into_table(table.clone()).row(row)?),
            }
        }
        Ok(batches)
    }

    fn push_aligned(&mut self, row: &Row) {
        let values = self
            .columns
            .iter()
            .map(|c| row.get(c.as_str()).cloned().unwrap_or(Value::Null))
            .collect();
        self.rows.push(values);
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SQL> {
        let head = SQL::token(Token::INSERT_INTO).append(SQL::ident(self.table.clone()));
        let output = self.returning.output_clause(dialect);

        if self.columns.is_empty() {
            if self.rows.len() > 1 {
                return Err(BaseModelError::Statement(
                    "multi-row insert needs at least one column".into(),
                ));
            }
            let body = if dialect == Dialect::MySQL {
                SQL::token(Token::VALUES).append(SQL::empty().parens())
            } else {
                SQL::token(Token::DEFAULT_VALUES)
            };
            return Ok(head
                .append(output)
                .append(body)
                .append(self.returning.returning_clause(dialect)));
        }
        if self.rows.is_empty() {
            return Err(BaseModelError::Statement("insert without rows".into()));
        }

        let columns = SQL::join(
            self.columns.iter().map(|c| SQL::ident(c.clone())),
            Token::COMMA,
        )
        .parens();
        let tuples = SQL::join(
            self.rows
                .iter()
                .map(|values| SQL::param_list(values.iter().cloned()).parens()),
            Token::COMMA,
        );
        Ok(head
            .append(columns)
            .append(output)
            .push(Token::VALUES)
            .append(tuples)
            .append(self.returning.returning_clause(dialect)))
    }
}
