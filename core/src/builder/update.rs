use super::Returning;
use crate::dialect::Dialect;
use crate::error::{BaseModelError, Result};
use crate::helpers;
use crate::sql::{SQL, Token};
use crate::value::{Row, Value};
use compact_str::CompactString;

#[derive(Debug, Clone, Default)]
pub struct UpdateQuery {
    pub table: CompactString,
    pub assignments: Vec<(CompactString, Value)>,
    pub filter: Option<SQL>,
    pub returning: Returning,
}

impl UpdateQuery {
    pub fn table(table: impl Into<CompactString>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn set(mut self, column: impl Into<CompactString>, value: Value) -> Self {
        self.assignments.push((column.into(), value));
        self
    }

    pub fn set_row(mut self, row: &Row) -> Self {
        self.assignments.extend(
            row.iter()
                .map(|(k, v)| (CompactString::from(k.as_str()), v.clone())),
        );
        self
    }

    pub fn filter(mut self, condition: SQL) -> Self {
        if !condition.is_empty() {
            self.filter = Some(match self.filter.take() {
                Some(existing) => helpers::and([existing, condition]),
                None => condition,
            });
        }
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> Result<SQL> {
        if self.assignments.is_empty() {
            return Err(BaseModelError::Statement(format!(
                "update of {} has nothing to set",
                self.table
            )));
        }
        let mut sql = SQL::token(Token::UPDATE)
            .append(SQL::ident(self.table.clone()))
            .push(Token::SET)
            .append(SQL::assignments(
                self.assignments
                    .iter()
                    .map(|(c, v)| (c.as_str(), v.clone())),
            ))
            .append(self.returning.output_clause(dialect));
        if let Some(filter) = &self.filter {
            sql.append_mut(helpers::where_clause(filter.clone()));
        }
        Ok(sql.append(self.returning.returning_clause(dialect)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_update() {
        let update = UpdateQuery::table("orders")
            .set("title", "b".into())
            .filter(helpers::eq(SQL::ident("id"), Value::Integer(1)))
            .returning(Returning::All);
        assert_eq!(
            update.to_sql(Dialect::PostgreSQL).unwrap().sql(Dialect::PostgreSQL),
            r#"UPDATE "orders" SET "title" = $1 WHERE "id" = $2 RETURNING *"#
        );
        assert_eq!(
            update.to_sql(Dialect::MsSql).unwrap().sql(Dialect::MsSql),
            "UPDATE [orders] SET [title] = @p1 OUTPUT INSERTED.* WHERE [id] = @p2"
        );
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UpdateQuery::table("t").to_sql(Dialect::SQLite).is_err());
    }
}
