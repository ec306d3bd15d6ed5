use crate::dialect::Dialect;
use crate::sql::{SQL, SQLChunk, Token};
use crate::value::Value;

/// Sort direction of an ORDER BY item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    Asc,
    Desc,
}

impl OrderBy {
    pub const fn token(self) -> Token {
        match self {
            OrderBy::Asc => Token::ASC,
            OrderBy::Desc => Token::DESC,
        }
    }
}

/// Helper function to create a SELECT list; an empty list selects `*`
pub fn select<T>(columns: T, distinct: bool) -> SQL
where
    T: IntoIterator<Item = SQL>,
{
    let sql = if distinct {
        SQL::token(Token::SELECT).push(Token::DISTINCT)
    } else {
        SQL::token(Token::SELECT)
    };
    let list = SQL::join(columns, Token::COMMA);
    if list.is_empty() {
        sql.push(Token::STAR)
    } else {
        sql.append(list)
    }
}

/// Helper function to create a FROM clause
pub fn from(source: SQL) -> SQL {
    SQL::token(Token::FROM).append(source)
}

/// Helper function to create a WHERE clause; empty conditions render nothing
pub fn where_clause(condition: SQL) -> SQL {
    if condition.is_empty() {
        return SQL::empty();
    }
    SQL::token(Token::WHERE).append(condition)
}

/// Helper function to create a GROUP BY clause
pub fn group_by(expressions: Vec<SQL>) -> SQL {
    if expressions.is_empty() {
        return SQL::empty();
    }
    SQL::token(Token::GROUP_BY).append(SQL::join(expressions, Token::COMMA))
}

/// Helper function to create a HAVING clause
pub fn having(condition: SQL) -> SQL {
    if condition.is_empty() {
        return SQL::empty();
    }
    SQL::token(Token::HAVING).append(condition)
}

/// Helper function to create an ORDER BY clause
pub fn order_by<T>(expressions: T) -> SQL
where
    T: IntoIterator<Item = (SQL, OrderBy)>,
{
    let items = SQL::join(
        expressions
            .into_iter()
            .map(|(expr, direction)| expr.push(direction.token())),
        Token::COMMA,
    );
    if items.is_empty() {
        return SQL::empty();
    }
    SQL::token(Token::ORDER_BY).append(items)
}

/// Helper function to create the pagination tail for a dialect.
///
/// MSSQL uses `OFFSET m ROWS FETCH NEXT n ROWS ONLY`, which is only legal
/// after an ORDER BY; callers must have emitted one. SQLite and MySQL cannot
/// express an OFFSET without a LIMIT, so an unbounded limit is spelled out.
pub fn paginate(dialect: Dialect, limit: Option<usize>, offset: usize) -> SQL {
    match dialect {
        Dialect::MsSql => {
            if limit.is_none() && offset == 0 {
                return SQL::empty();
            }
            let sql = SQL::token(Token::OFFSET)
                .append(SQL::number(offset))
                .push(Token::ROWS);
            match limit {
                Some(n) => sql
                    .push(Token::FETCH_NEXT)
                    .append(SQL::number(n))
                    .push(Token::ROWS_ONLY),
                None => sql,
            }
        }
        _ => {
            let mut sql = match (limit, dialect) {
                (Some(n), _) => SQL::token(Token::LIMIT).append(SQL::number(n)),
                (None, _) if offset == 0 => return SQL::empty(),
                (None, Dialect::SQLite) => SQL::token(Token::LIMIT).append(SQL::raw("-1")),
                (None, Dialect::MySQL) => {
                    SQL::token(Token::LIMIT).append(SQL::raw("18446744073709551615"))
                }
                (None, _) => SQL::empty(),
            };
            if offset > 0 {
                sql.append_mut(SQL::token(Token::OFFSET).append(SQL::number(offset)));
            }
            sql
        }
    }
}

/// `lhs = ?`, or `lhs IS NULL` for a null value
pub fn eq(lhs: SQL, value: Value) -> SQL {
    if value.is_null() {
        lhs.push(Token::IS_NULL)
    } else {
        lhs.push(Token::EQ).push(SQLChunk::Param(value))
    }
}

/// `lhs IN (?, ?, ...)`; an empty list matches nothing
pub fn in_list<I>(lhs: SQL, values: I) -> SQL
where
    I: IntoIterator<Item = Value>,
{
    let list = SQL::param_list(values);
    if list.is_empty() {
        return SQL::raw("1 = 0");
    }
    lhs.push(Token::IN).append(list.parens())
}

/// Joins conditions with AND, parenthesizing each when there is more than one
pub fn and<I>(conditions: I) -> SQL
where
    I: IntoIterator<Item = SQL>,
{
    let parts: Vec<SQL> = conditions.into_iter().filter(|c| !c.is_empty()).collect();
    match parts.len() {
        0 => SQL::empty(),
        1 => parts.into_iter().next().unwrap_or_default(),
        _ => SQL::join(parts.into_iter().map(SQL::parens), Token::AND),
    }
}

/// `COUNT(*)`
pub fn count_star() -> SQL {
    SQL::raw("COUNT").push(Token::LPAREN).push(Token::STAR).push(Token::RPAREN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_per_dialect() {
        assert_eq!(
            paginate(Dialect::PostgreSQL, Some(10), 20).sql(Dialect::PostgreSQL),
            "LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            paginate(Dialect::MsSql, Some(10), 0).sql(Dialect::MsSql),
            "OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            paginate(Dialect::SQLite, None, 5).sql(Dialect::SQLite),
            "LIMIT -1 OFFSET 5"
        );
        assert!(paginate(Dialect::MySQL, None, 0).is_empty());
    }

    #[test]
    fn conditions() {
        let sql = and([
            eq(SQL::ident("a"), Value::Integer(1)),
            SQL::empty(),
            eq(SQL::ident("b"), Value::Null),
        ]);
        assert_eq!(sql.sql(Dialect::SQLite), r#"("a" = ?) AND ("b" IS NULL)"#);
        assert_eq!(
            in_list(SQL::ident("a"), Vec::new()).sql(Dialect::SQLite),
            "1 = 0"
        );
        assert_eq!(count_star().sql(Dialect::SQLite), "COUNT(*)");
    }
}
