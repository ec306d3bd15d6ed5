//! Statement builders.
//!
//! Builders hold dialect-free [`SQL`] fragments and only decide dialect quirks
//! (pagination syntax, `RETURNING` vs `OUTPUT`, union branch wrapping) when
//! rendered with `to_sql(dialect)`.

mod delete;
mod insert;
mod select;
mod update;

pub use delete::DeleteQuery;
pub use insert::InsertQuery;
pub use select::SelectQuery;
pub use update::UpdateQuery;

use crate::dialect::Dialect;
use crate::sql::{SQL, SQLChunk, Token};
use compact_str::CompactString;

/// Columns echoed back by a write on dialects that support it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Returning {
    #[default]
    Nothing,
    All,
    Columns(Vec<CompactString>),
}

impl Returning {
    /// `RETURNING ...` tail for PostgreSQL; empty elsewhere.
    pub(crate) fn returning_clause(&self, dialect: Dialect) -> SQL {
        if dialect != Dialect::PostgreSQL {
            return SQL::empty();
        }
        match self {
            Returning::Nothing => SQL::empty(),
            Returning::All => SQL::token(Token::RETURNING).push(Token::STAR),
            Returning::Columns(columns) => SQL::token(Token::RETURNING).append(SQL::join(
                columns.iter().map(|c| SQL::ident(c.clone())),
                Token::COMMA,
            )),
        }
    }

    /// `OUTPUT INSERTED.*` clause for MSSQL; empty elsewhere.
    pub(crate) fn output_clause(&self, dialect: Dialect) -> SQL {
        if dialect != Dialect::MsSql {
            return SQL::empty();
        }
        let inserted = || SQL::raw("INSERTED").push(Token::DOT);
        match self {
            Returning::Nothing => SQL::empty(),
            Returning::All => SQL::token(Token::OUTPUT).append(inserted().push(Token::STAR)),
            Returning::Columns(columns) => SQL::token(Token::OUTPUT).append(SQL::join(
                columns
                    .iter()
                    .map(|c| inserted().push(SQLChunk::Ident(c.clone()))),
                Token::COMMA,
            )),
        }
    }
}

/// Combines SELECT statements with `UNION ALL`.
///
/// SQLite rejects ORDER BY/LIMIT inside a compound member, so each branch
/// becomes `SELECT * FROM (branch)`; MSSQL additionally requires a derived
/// table alias. PostgreSQL and MySQL accept parenthesized branches directly.
pub fn union_all<I>(branches: I, dialect: Dialect) -> SQL
where
    I: IntoIterator<Item = SQL>,
{
    let wrapped = branches.into_iter().map(|branch| match dialect {
        Dialect::SQLite => SQL::token(Token::SELECT)
            .push(Token::STAR)
            .push(Token::FROM)
            .append(branch.parens()),
        Dialect::MsSql => SQL::token(Token::SELECT)
            .push(Token::STAR)
            .push(Token::FROM)
            .append(branch.parens())
            .alias("t"),
        Dialect::PostgreSQL | Dialect::MySQL => branch.parens(),
    });
    SQL::join(wrapped, Token::UNION_ALL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_branches_wrap_per_dialect() {
        let branch = |id: i64| {
            SelectQuery::from_table("items")
                .filter(crate::helpers::eq(SQL::ident("order_id"), id.into()))
                .limit(1)
        };
        let sqlite = union_all(
            [1, 2].map(|id| branch(id).to_sql(Dialect::SQLite)),
            Dialect::SQLite,
        );
        assert_eq!(
            sqlite.sql(Dialect::SQLite),
            r#"SELECT * FROM (SELECT * FROM "items" WHERE "order_id" = ? LIMIT 1) UNION ALL SELECT * FROM (SELECT * FROM "items" WHERE "order_id" = ? LIMIT 1)"#
        );

        let pg = union_all(
            [1, 2].map(|id| branch(id).to_sql(Dialect::PostgreSQL)),
            Dialect::PostgreSQL,
        );
        assert_eq!(
            pg.sql(Dialect::PostgreSQL),
            r#"(SELECT * FROM "items" WHERE "order_id" = $1 LIMIT 1) UNION ALL (SELECT * FROM "items" WHERE "order_id" = $2 LIMIT 1)"#
        );
    }

    #[test]
    fn output_clause_only_on_mssql() {
        assert!(Returning::All.output_clause(Dialect::PostgreSQL).is_empty());
        assert_eq!(
            Returning::Columns(vec!["id".into()])
                .output_clause(Dialect::MsSql)
                .sql(Dialect::MsSql),
            "OUTPUT INSERTED.[id]"
        );
    }
}
