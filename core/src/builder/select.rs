use crate::dialect::Dialect;
use crate::helpers::{self, OrderBy};
use crate::sql::{SQL, Token};
use compact_str::CompactString;

/// A SELECT statement under construction.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    /// Projection; empty selects `*`
    pub columns: Vec<SQL>,
    pub source: SQL,
    pub joins: Vec<SQL>,
    pub filter: Option<SQL>,
    pub group_by: Vec<SQL>,
    pub having: Option<SQL>,
    pub order_by: Vec<(SQL, OrderBy)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SelectQuery {
    /// `SELECT * FROM "table"`
    pub fn from_table(table: impl Into<CompactString>) -> Self {
        Self::from_source(SQL::ident(table))
    }

    /// `SELECT * FROM "table" AS "alias"`
    pub fn from_aliased(table: impl Into<CompactString>, alias: impl Into<CompactString>) -> Self {
        Self::from_source(SQL::ident(table).alias(alias))
    }

    /// Selects from an arbitrary source, such as a parenthesized subquery
    pub fn from_source(source: SQL) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = SQL>,
    {
        self.columns.extend(columns);
        self
    }

    pub fn column(mut self, column: SQL) -> Self {
        self.columns.push(column);
        self
    }

    pub fn join(mut self, join: SQL) -> Self {
        self.joins.push(join);
        self
    }

    /// `[INNER] JOIN "table" AS "alias" ON condition`
    pub fn inner_join(
        self,
        table: impl Into<CompactString>,
        alias: Option<&str>,
        on: SQL,
    ) -> Self {
        let target = match alias {
            Some(alias) => SQL::ident(table).alias(alias),
            None => SQL::ident(table),
        };
        self.join(
            SQL::token(Token::INNER_JOIN)
                .append(target)
                .push(Token::ON)
                .append(on),
        )
    }

    /// ANDs a condition onto the WHERE clause.
    pub fn filter(mut self, condition: SQL) -> Self {
        self.and_filter(condition);
        self
    }

    pub fn and_filter(&mut self, condition: SQL) {
        if condition.is_empty() {
            return;
        }
        self.filter = Some(match self.filter.take() {
            Some(existing) => helpers::and([existing, condition]),
            None => condition,
        });
    }

    pub fn group_by<I>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = SQL>,
    {
        self.group_by.extend(expressions);
        self
    }

    pub fn having(mut self, condition: SQL) -> Self {
        if !condition.is_empty() {
            self.having = Some(match self.having.take() {
                Some(existing) => helpers::and([existing, condition]),
                None => condition,
            });
        }
        self
    }

    pub fn order_by(mut self, expr: SQL, direction: OrderBy) -> Self {
        self.order_by.push((expr, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether the rendered statement would carry any pagination.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }

    /// Renders the statement for `dialect`.
    ///
    /// MSSQL only accepts OFFSET/FETCH after an ORDER BY; when the caller did
    /// not sort, `ORDER BY (SELECT NULL)` keeps the statement legal without
    /// imposing an order.
    pub fn to_sql(&self, dialect: Dialect) -> SQL {
        let mut sql = helpers::select(self.columns.iter().cloned(), self.distinct)
            .append(helpers::from(self.source.clone()));
        for join in &self.joins {
            sql.append_mut(join.clone());
        }
        if let Some(filter) = &self.filter {
            sql.append_mut(helpers::where_clause(filter.clone()));
        }
        sql.append_mut(helpers::group_by(self.group_by.clone()));
        if let Some(having) = &self.having {
            sql.append_mut(helpers::having(having.clone()));
        }

        if self.order_by.is_empty() {
            if dialect.requires_order_for_offset() && self.is_paginated() {
                sql.append_mut(
                    SQL::token(Token::ORDER_BY)
                        .append(SQL::token(Token::SELECT).push(Token::NULL).parens()),
                );
            }
        } else {
            sql.append_mut(helpers::order_by(self.order_by.iter().cloned()));
        }

        sql.append(helpers::paginate(dialect, self.limit, self.offset))
    }

    /// `SELECT COUNT(*) AS "count" FROM (...)` over this statement without
    /// its ordering and pagination.
    pub fn count_sql(&self, dialect: Dialect) -> SQL {
        let inner = SelectQuery {
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            ..self.clone()
        };
        SQL::token(Token::SELECT)
            .append(helpers::count_star().alias("count"))
            .push(Token::FROM)
            .append(inner.to_sql(dialect).parens().alias("t"))
    }
}
