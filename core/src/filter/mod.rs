//! Filter expressions.
//!
//! Both textual `where` strings and structured condition objects parse into
//! one [`FilterExpr`] tree. The tree is compiled into a parametrized [`SQL`]
//! fragment against a [`ColumnResolver`], which maps column names to
//! qualified physical references and reports unknown columns as errors.

mod condition;
mod xwhere;

pub use condition::parse_condition;
pub use xwhere::parse_where;

use crate::dialect::Dialect;
use crate::error::{BaseModelError, Result};
use crate::sql::{SQL, Token};
use crate::value::Value;
use basemodel_types::StorageClass;

/// Deepest group nesting either parser accepts.
pub(crate) const MAX_DEPTH: usize = 64;

/// Deepest tree `to_sql` compiles; a parsed group adds at most an OR, an AND
/// and a NOT level.
const MAX_TREE_DEPTH: usize = 3 * MAX_DEPTH;

/// Direction of one hop in a condition-graph column path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HopKind {
    HasMany,
    BelongsTo,
}

/// One relation traversed before reaching a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationHop {
    /// Related table name, as written in the condition graph
    pub table: String,
    pub kind: HopKind,
}

/// A column reference, optionally reached through relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub path: Vec<RelationHop>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
    NotBetween,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Value(Value),
    List(Vec<Value>),
    Range(Value, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: ColumnRef,
    pub op: CompareOp,
    pub operand: Operand,
}

/// Parsed boolean filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Comparison(Comparison),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

/// Column resolved for use in a filter.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub sql: SQL,
    pub class: StorageClass,
}

/// Maps filter column references to SQL.
///
/// Implementations decide which names are legal. A resolver that walks
/// relation paths keeps per-statement alias counters, hence `&mut`.
pub trait ColumnResolver {
    fn resolve(&mut self, column: &ColumnRef) -> Result<ResolvedColumn>;

    /// Wraps the compiled comparison on `column`. Resolvers for relation
    /// paths turn the predicate into a correlated subquery here.
    fn scope(&mut self, column: &ColumnRef, predicate: SQL) -> Result<SQL> {
        let _ = column;
        Ok(predicate)
    }
}

impl FilterExpr {
    /// Conjunction of two optional filters.
    pub fn and_opt(left: Option<FilterExpr>, right: Option<FilterExpr>) -> Option<FilterExpr> {
        match (left, right) {
            (Some(FilterExpr::And(mut items)), Some(r)) => {
                items.push(r);
                Some(FilterExpr::And(items))
            }
            (Some(l), Some(r)) => Some(FilterExpr::And(vec![l, r])),
            (l, None) => l,
            (None, r) => r,
        }
    }

    /// Every column referenced by this tree.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            FilterExpr::Comparison(cmp) => out.push(&cmp.column),
            FilterExpr::And(items) | FilterExpr::Or(items) => {
                items.iter().for_each(|item| item.collect_columns(out))
            }
            FilterExpr::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Compiles the tree into a parametrized fragment. Trees nested deeper
    /// than the parsers accept are rejected.
    pub fn to_sql(&self, resolver: &mut dyn ColumnResolver, dialect: Dialect) -> Result<SQL> {
        compile(self, resolver, dialect, 0)
    }
}

fn compile(
    expr: &FilterExpr,
    resolver: &mut dyn ColumnResolver,
    dialect: Dialect,
    depth: usize,
) -> Result<SQL> {
    if depth > MAX_TREE_DEPTH {
        return Err(BaseModelError::query("filter nested too deeply"));
    }
    match expr {
        FilterExpr::Comparison(cmp) => compile_comparison(cmp, resolver, dialect),
        FilterExpr::And(items) => compile_group(items, Token::AND, resolver, dialect, depth),
        FilterExpr::Or(items) => compile_group(items, Token::OR, resolver, dialect, depth),
        FilterExpr::Not(inner) => Ok(SQL::token(Token::NOT)
            .append(compile(inner, resolver, dialect, depth + 1)?.parens())),
    }
}

fn compile_group(
    items: &[FilterExpr],
    separator: Token,
    resolver: &mut dyn ColumnResolver,
    dialect: Dialect,
    depth: usize,
) -> Result<SQL> {
    let parts = items
        .iter()
        .map(|item| compile(item, resolver, dialect, depth + 1).map(SQL::parens))
        .collect::<Result<Vec<_>>>()?;
    Ok(match parts.len() {
        0 => SQL::empty(),
        1 => parts.into_iter().next().unwrap_or_default(),
        _ => SQL::join(parts, separator),
    })
}

fn compile_comparison(
    cmp: &Comparison,
    resolver: &mut dyn ColumnResolver,
    dialect: Dialect,
) -> Result<SQL> {
    let column = resolver.resolve(&cmp.column)?;
    let class = column.class;
    let lhs = column.sql;
    let coerce = |value: &Value| value.clone().coerce(class);

    let sql = match (&cmp.op, &cmp.operand) {
        (CompareOp::IsNull, _) | (CompareOp::Eq, Operand::Value(Value::Null)) => {
            lhs.push(Token::IS_NULL)
        }
        (CompareOp::IsNotNull, _) | (CompareOp::Ne, Operand::Value(Value::Null)) => {
            lhs.push(Token::IS_NOT_NULL)
        }
        (op @ (CompareOp::In | CompareOp::NotIn), Operand::List(values)) => {
            if values.is_empty() {
                // IN () is not valid SQL; an empty set matches nothing
                let always = if *op == CompareOp::In { "1 = 0" } else { "1 = 1" };
                SQL::raw(always)
            } else {
                let token = if *op == CompareOp::In {
                    Token::IN
                } else {
                    Token::NOT_IN
                };
                lhs.push(token)
                    .append(SQL::param_list(values.iter().map(coerce)).parens())
            }
        }
        (op @ (CompareOp::Between | CompareOp::NotBetween), Operand::Range(lo, hi)) => {
            let token = if *op == CompareOp::Between {
                Token::BETWEEN
            } else {
                Token::NOT_BETWEEN
            };
            lhs.push(token)
                .append(SQL::param(coerce(lo)))
                .push(Token::AND)
                .append(SQL::param(coerce(hi)))
        }
        (op, Operand::Value(value)) => {
            let token = match op {
                CompareOp::Eq => Token::EQ,
                CompareOp::Ne => Token::NE,
                CompareOp::Lt => Token::LT,
                CompareOp::Gt => Token::GT,
                CompareOp::Le => Token::LE,
                CompareOp::Ge => Token::GE,
                CompareOp::Like if dialect == Dialect::PostgreSQL => Token::ILIKE,
                CompareOp::Like => Token::LIKE,
                CompareOp::NotLike if dialect == Dialect::PostgreSQL => Token::NOT_ILIKE,
                CompareOp::NotLike => Token::NOT_LIKE,
                other => {
                    return Err(BaseModelError::query(format!(
                        "{other:?} : operator needs a list or range operand"
                    )));
                }
            };
            let value = match op {
                // patterns stay text whatever the column kind
                CompareOp::Like | CompareOp::NotLike => value.clone(),
                _ => coerce(value),
            };
            lhs.push(token).append(SQL::param(value))
        }
        (op, operand) => {
            return Err(BaseModelError::query(format!(
                "{op:?} : invalid operand {operand:?}"
            )));
        }
    };
    resolver.scope(&cmp.column, sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolves any name to a bare identifier; `qty` is numeric.
    struct Loose;

    impl ColumnResolver for Loose {
        fn resolve(&mut self, column: &ColumnRef) -> Result<ResolvedColumn> {
            let class = if column.name == "qty" {
                StorageClass::Integer
            } else {
                StorageClass::Text
            };
            Ok(ResolvedColumn {
                sql: SQL::ident(column.name.as_str()),
                class,
            })
        }
    }

    #[test]
    fn deep_trees_fail_to_compile() {
        let mut expr = parse_where("(qty,eq,1)").unwrap().unwrap();
        for _ in 0..1000 {
            expr = FilterExpr::Not(Box::new(expr));
        }
        let err = expr.to_sql(&mut Loose, Dialect::SQLite).unwrap_err();
        assert_eq!(err.to_string(), "filter nested too deeply");

        // the deepest accepted where string still compiles
        let groups = "(qty,eq,1)~or(".repeat(MAX_DEPTH);
        let text = format!("{groups}(qty,eq,2){}", ")".repeat(MAX_DEPTH));
        let expr = parse_where(&text).unwrap().unwrap();
        assert!(expr.to_sql(&mut Loose, Dialect::SQLite).is_ok());
    }

    #[test]
    fn compiles_nested_groups_with_coercion() {
        let expr = parse_where("(qty,gt,5)~or((name,eq,a)~and(qty,btw,1,3))")
            .unwrap()
            .unwrap();
        let sql = expr.to_sql(&mut Loose, Dialect::PostgreSQL).unwrap();
        let (text, params) = sql.build(Dialect::PostgreSQL);
        assert_eq!(
            text,
            r#"("qty" > $1) OR (("name" = $2) AND ("qty" BETWEEN $3 AND $4))"#
        );
        assert_eq!(params[0], &Value::Integer(5));
        assert_eq!(params[1], &Value::from("a"));
        assert_eq!(params[3], &Value::Integer(3));
    }

    #[test]
    fn like_is_case_insensitive_on_postgres() {
        let expr = parse_where("(name,like,%ab%)").unwrap().unwrap();
        assert_eq!(
            expr.to_sql(&mut Loose, Dialect::PostgreSQL)
                .unwrap()
                .sql(Dialect::PostgreSQL),
            r#""name" ILIKE $1"#
        );
        assert_eq!(
            expr.to_sql(&mut Loose, Dialect::SQLite)
                .unwrap()
                .sql(Dialect::SQLite),
            r#""name" LIKE ?"#
        );
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let expr = FilterExpr::Comparison(Comparison {
            column: ColumnRef::new("qty"),
            op: CompareOp::In,
            operand: Operand::List(vec![]),
        });
        assert_eq!(
            expr.to_sql(&mut Loose, Dialect::SQLite)
                .unwrap()
                .sql(Dialect::SQLite),
            "1 = 0"
        );
    }

    #[test]
    fn and_opt_flattens() {
        let a = parse_where("(a,eq,1)").unwrap();
        let b = parse_where("(b,eq,2)").unwrap();
        let c = parse_where("(c,eq,3)").unwrap();
        let combined = FilterExpr::and_opt(FilterExpr::and_opt(a, b), c).unwrap();
        match combined {
            FilterExpr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }
}
