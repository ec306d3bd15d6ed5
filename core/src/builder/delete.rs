use crate::helpers;
use crate::sql::{SQL, Token};
use compact_str::CompactString;

#[derive(Debug, Clone, Default)]
pub struct DeleteQuery {
    pub table: CompactString,
    pub filter: Option<SQL>,
}

impl DeleteQuery {
    pub fn from_table(table: impl Into<CompactString>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
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

    pub fn to_sql(&self) -> SQL {
        let sql = SQL::token(Token::DELETE_FROM).append(SQL::ident(self.table.clone()));
        match &self.filter {
            Some(filter) => sql.append(helpers::where_clause(filter.clone())),
            None => sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::value::Value;

    #[test]
    fn renders_delete() {
        let sql = DeleteQuery::from_table("orders")
            .filter(helpers::eq(SQL::ident("id"), Value::Integer(3)))
            .filter(helpers::eq(SQL::ident("tenant"), Value::from("x")))
            .to_sql();
        assert_eq!(
            sql.sql(Dialect::MySQL),
            "DELETE FROM `orders` WHERE (`id` = ?) AND (`tenant` = ?)"
        );
    }
}
