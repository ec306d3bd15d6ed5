//! Grouping, aggregation and value distribution.
//!
//! Aggregate outputs (`count`, `sum`, ...) are resolvable by name in the
//! `having` and `sort` arguments of the same call.

use crate::args::{ListArgs, QueryArgs, split_list};
use crate::model::BaseModel;
use crate::resolve::TableResolver;
use crate::schema::Table;
use basemodel_core::helpers::and;
use basemodel_core::{
    BaseModelError, Connection, Dialect, Result, Row, SQL, SelectQuery, Token, Value, union_all,
};
use basemodel_types::StorageClass;

const INDEX: &str = "__index";

// ============================================================================
// Aggregate functions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    CountDistinct,
    Sum,
    SumDistinct,
    Avg,
    AvgDistinct,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name.trim() {
            "count" => Self::Count,
            "countDistinct" => Self::CountDistinct,
            "sum" => Self::Sum,
            "sumDistinct" => Self::SumDistinct,
            "avg" => Self::Avg,
            "avgDistinct" => Self::AvgDistinct,
            "min" => Self::Min,
            "max" => Self::Max,
            other => {
                return Err(BaseModelError::query(format!(
                    "{other} : unsupported aggregate function"
                )));
            }
        })
    }

    /// Output column name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDistinct => "countDistinct",
            Self::Sum => "sum",
            Self::SumDistinct => "sumDistinct",
            Self::Avg => "avg",
            Self::AvgDistinct => "avgDistinct",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    pub fn apply(self, column: SQL) -> SQL {
        let (func, distinct) = match self {
            Self::Count => ("COUNT", false),
            Self::CountDistinct => ("COUNT", true),
            Self::Sum => ("SUM", false),
            Self::SumDistinct => ("SUM", true),
            Self::Avg => ("AVG", false),
            Self::AvgDistinct => ("AVG", true),
            Self::Min => ("MIN", false),
            Self::Max => ("MAX", false),
        };
        if distinct {
            SQL::raw(func)
                .push(Token::LPAREN)
                .push(Token::DISTINCT)
                .append(column)
                .push(Token::RPAREN)
        } else {
            SQL::func(func, column)
        }
    }

    const fn class(self) -> StorageClass {
        match self {
            Self::Count | Self::CountDistinct => StorageClass::Integer,
            _ => StorageClass::Real,
        }
    }
}

fn parse_funcs(text: &str) -> Result<Vec<AggregateFunc>> {
    split_list(text, &[',']).iter().map(|f| AggregateFunc::parse(f)).collect()
}

/// Columns named (by alias or physical name) in `names`.
fn require_columns<'t>(table: &'t Table, names: &[String]) -> Result<Vec<&'t crate::schema::Column>> {
    names.iter().map(|name| table.require_column(name)).collect()
}

// ============================================================================
// Operations
// ============================================================================

impl BaseModel {
    /// Row count per distinct value of `column` (plus the `fields` columns),
    /// as `count`.
    pub async fn group_by(
        &self,
        column: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("group_by", async {
            let table = self.table();
            let mut names = vec![column.to_string()];
            for name in split_list(&args.text(&["fields", "f"]).unwrap_or_default(), &[',']) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            let grouped = require_columns(table, &names)?;
            let key = table
                .primary_key()
                .or_else(|| table.columns().first())
                .map(|c| SQL::qualified(table.name(), c.name.as_str()))
                .unwrap_or_else(|| SQL::raw("*"));
            let count = AggregateFunc::Count.apply(key);
            self.aggregate_query(
                grouped,
                vec![(AggregateFunc::Count, count)],
                args,
                tx,
            )
            .await
        })
        .await
    }

    /// `func` (comma separated: `sum,avg,...`) over `column`, grouped by the
    /// `fields` columns when given.
    pub async fn aggregate(
        &self,
        column: &str,
        func: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("aggregate", async {
            let table = self.table();
            let target = table.require_column(column)?;
            let names = split_list(&args.text(&["fields", "f"]).unwrap_or_default(), &[',']);
            let grouped = require_columns(table, &names)?;
            let aggregates = parse_funcs(func)?
                .into_iter()
                .map(|f| (f, f.apply(SQL::qualified(table.name(), target.name.as_str()))))
                .collect();
            self.aggregate_query(grouped, aggregates, args, tx).await
        })
        .await
    }

    async fn aggregate_query(
        &self,
        grouped: Vec<&crate::schema::Column>,
        aggregates: Vec<(AggregateFunc, SQL)>,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        let conn = self.conn(tx);
        let dialect = conn.dialect();
        let table = self.table();
        let list = ListArgs::parse(args, table, self.config())?;

        let mut resolver = aggregates.iter().fold(
            TableResolver::new(self.snapshot(), table, dialect),
            |resolver, (func, sql)| resolver.extra(func.name(), sql.clone(), func.class()),
        );

        let group: Vec<SQL> = grouped
            .iter()
            .map(|c| SQL::qualified(table.name(), c.name.as_str()))
            .collect();
        let mut query = SelectQuery::from_table(table.name())
            .columns(
                grouped
                    .iter()
                    .map(|c| SQL::qualified(table.name(), c.name.as_str()).alias(c.alias.as_str())),
            )
            .columns(aggregates.iter().map(|(f, sql)| sql.clone().alias(f.name())));
        if let Some(filter) = list.filters() {
            query.and_filter(filter.to_sql(&mut resolver, dialect)?);
        }
        if !group.is_empty() {
            query = query.group_by(group);
        }
        if let Some(having) = &list.having {
            query = query.having(having.to_sql(&mut resolver, dialect)?);
        }
        for (expr, direction) in resolver.order(&list.sort)? {
            query = query.order_by(expr, direction);
        }
        let query = query.limit(list.limit).offset(list.offset);
        conn.query(&query.to_sql(dialect)).await
    }

    /// Distinct values of `columns` (comma separated; every column when
    /// empty), filtered and paginated like [`BaseModel::list`].
    pub async fn distinct(
        &self,
        columns: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("distinct", async {
            let conn = self.conn(tx);
            let dialect = conn.dialect();
            let table = self.table();
            let list = ListArgs::parse(args, table, self.config())?;
            let names = split_list(columns, &[',']);
            let selected = if names.is_empty() {
                table.columns().iter().collect()
            } else {
                require_columns(table, &names)?
            };

            let mut resolver = TableResolver::new(self.snapshot(), table, dialect);
            let mut query = SelectQuery::from_table(table.name()).distinct().columns(
                selected
                    .iter()
                    .map(|c| SQL::qualified(table.name(), c.name.as_str()).alias(c.alias.as_str())),
            );
            if let Some(filter) = list.filters() {
                query.and_filter(filter.to_sql(&mut resolver, dialect)?);
            }
            for (expr, direction) in resolver.order(&list.sort)? {
                query = query.order_by(expr, direction);
            }
            if dialect == Dialect::MsSql
                && query.order_by.is_empty()
                && let Some(first) = selected.first()
            {
                query = query.order_by(
                    SQL::qualified(table.name(), first.name.as_str()),
                    basemodel_core::OrderBy::Asc,
                );
            }
            let query = query.limit(list.limit).offset(list.offset);
            conn.query(&query.to_sql(dialect)).await
        })
        .await
    }

    /// Aggregates of `column` per value range, one row per range labelled
    /// `range` (`"0-100"`).
    ///
    /// Ranges come from `steps` (ascending breakpoints), else from `min`,
    /// `max` and `step`, else from the column's own minimum, maximum and
    /// average. `func` defaults to `count`.
    ///
    /// Buckets assume integer values: each range after the first starts one
    /// past the previous end, so a fractional value between two ranges
    /// (`100.5` with steps `0,100,200`) is counted in none of them.
    pub async fn distribution(
        &self,
        column: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("distribution", async {
            let conn = self.conn(tx);
            let dialect = conn.dialect();
            let table = self.table();
            let target = table.require_column(column)?;
            let col = SQL::qualified(table.name(), target.name.as_str());
            let funcs = parse_funcs(&args.text(&["func"]).unwrap_or_else(|| "count".into()))?;

            let bounds = ["min", "max", "step"]
                .map(|key| args.raw_text(key))
                .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()));
            let steps = args.text(&["steps"]).unwrap_or_default();
            let ranges = match (bounds, steps.is_empty()) {
                ([Some(min), Some(max), Some(step)], _) => self.windows(min, max, step),
                (_, false) => breakpoints(&steps)?,
                _ => {
                    let query = SelectQuery::from_table(table.name())
                        .column(SQL::func("MIN", col.clone()).alias("min"))
                        .column(SQL::func("MAX", col.clone()).alias("max"))
                        .column(SQL::func("AVG", col.clone()).alias("step"));
                    let Some(row) = conn.query_one(&query.to_sql(dialect)).await? else {
                        return Ok(Vec::new());
                    };
                    let stat = |key: &str| row.get(key).and_then(Value::as_f64);
                    match (stat("min"), stat("max"), stat("step")) {
                        (Some(min), Some(max), Some(step)) => self.windows(min, max, step.round()),
                        _ => return Ok(Vec::new()),
                    }
                }
            };
            if ranges.is_empty() {
                return Ok(Vec::new());
            }

            let branches: Vec<SQL> = ranges
                .iter()
                .enumerate()
                .map(|(i, (start, end))| {
                    SelectQuery::from_table(table.name())
                        .column(SQL::number(i).alias(INDEX))
                        .columns(
                            funcs
                                .iter()
                                .map(|f| f.apply(col.clone()).alias(f.name())),
                        )
                        .filter(and([
                            col.clone().push(Token::GE).append(SQL::param(number(*start))),
                            col.clone().push(Token::LE).append(SQL::param(number(*end))),
                        ]))
                        .to_sql(dialect)
                })
                .collect();

            let mut rows = conn.query(&union_all(branches, dialect)).await?;
            for row in &mut rows {
                let index = row.shift_remove(INDEX).and_then(|v| v.as_i64());
                if let Some((start, end)) = index.and_then(|i| ranges.get(i as usize)) {
                    row.insert("range".into(), Value::Text(label(*start, *end)));
                }
            }
            rows.sort_by_key(|row| {
                row.get("range")
                    .and_then(Value::as_str)
                    .and_then(|r| ranges.iter().position(|(s, e)| label(*s, *e) == r))
            });
            Ok(rows)
        })
        .await
    }

    /// Equal-width ranges from `min` to `max`. The step is raised to
    /// `step_min`, and widened when it would produce more than `steps_max`
    /// ranges.
    fn windows(&self, min: f64, max: f64, step: f64) -> Vec<(f64, f64)> {
        let config = self.config();
        let span = max - min;
        if span < 0.0 {
            return Vec::new();
        }
        let mut step = step.max(config.step_min as f64);
        let steps_max = config.steps_max.max(1) as f64;
        if (span / step).ceil() > steps_max {
            step = (span / steps_max).ceil();
        }
        window_ranges(min, max, step)
    }
}

/// `[min, min + step], [min + step + 1, min + 2 * step], ...` capped at `max`.
fn window_ranges(min: f64, max: f64, step: f64) -> Vec<(f64, f64)> {
    let count = ((max - min) / step).ceil().max(1.0) as usize;
    (0..count)
        .map(|i| {
            let start = min + i as f64 * step + if i == 0 { 0.0 } else { 1.0 };
            let end = (min + (i + 1) as f64 * step).min(max);
            (start, end)
        })
        .collect()
}

/// `[b0, b1], [b1 + 1, b2], ...` from ascending breakpoints.
fn breakpoints(text: &str) -> Result<Vec<(f64, f64)>> {
    let points = text
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .map_err(|_| BaseModelError::query(format!("{p} : not a valid step")))
        })
        .collect::<Result<Vec<f64>>>()?;
    if points.windows(2).any(|w| w[1] < w[0]) {
        return Err(BaseModelError::query(format!(
            "{text} : steps must be ascending"
        )));
    }
    Ok(points
        .windows(2)
        .enumerate()
        .map(|(i, w)| (w[0] + if i == 0 { 0.0 } else { 1.0 }, w[1]))
        .collect())
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::Integer(value as i64)
    } else {
        Value::Real(value)
    }
}

fn label(start: f64, end: f64) -> String {
    format!("{}-{}", number(start), number(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ranges: &[(f64, f64)]) -> Vec<String> {
        ranges.iter().map(|(s, e)| label(*s, *e)).collect()
    }

    #[test]
    fn breakpoints_do_not_overlap() {
        let ranges = breakpoints("0,100,200,300").unwrap();
        assert_eq!(labels(&ranges), ["0-100", "101-200", "201-300"]);
        assert!(breakpoints("10,5").is_err());
        assert!(breakpoints("1,x").is_err());
    }

    #[test]
    fn windows_start_at_min() {
        assert_eq!(
            labels(&window_ranges(0.0, 300.0, 100.0)),
            ["0-100", "101-200", "201-300"]
        );
        assert_eq!(labels(&window_ranges(50.0, 120.0, 50.0)), ["50-100", "101-120"]);
        assert_eq!(labels(&window_ranges(7.0, 7.0, 5.0)), ["7-7"]);
    }

    #[test]
    fn fractions_between_ranges_fall_outside() {
        let covered =
            |ranges: &[(f64, f64)], v: f64| ranges.iter().any(|(s, e)| *s <= v && v <= *e);
        let ranges = breakpoints("0,100,200").unwrap();
        assert!(covered(&ranges, 100.0));
        assert!(covered(&ranges, 101.0));
        assert!(!covered(&ranges, 100.5));

        let ranges = window_ranges(0.0, 100.0, 50.0);
        assert!(!covered(&ranges, 50.25));
    }

    #[test]
    fn aggregate_names() {
        assert_eq!(AggregateFunc::parse("avg").unwrap(), AggregateFunc::Avg);
        assert!(AggregateFunc::parse("median").is_err());
        assert_eq!(
            AggregateFunc::CountDistinct
                .apply(SQL::ident("qty"))
                .sql(Dialect::SQLite),
            r#"COUNT(DISTINCT "qty")"#
        );
        assert_eq!(
            AggregateFunc::Sum.apply(SQL::ident("qty")).sql(Dialect::SQLite),
            r#"SUM("qty")"#
        );
    }
}
