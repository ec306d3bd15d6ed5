use super::{BaseModel, Resolved};
use crate::args::{ListArgs, QueryArgs, default_nested};
use crate::pk::pk_filter;
use basemodel_core::{Connection, Dialect, Result, Row, SQL, SelectQuery, Value};

/// How [`BaseModel::count_by_pk`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// Always `COUNT(...)`
    #[default]
    Exact,
    /// On PostgreSQL with no filters, trust the planner's row estimate when
    /// it exceeds `count_estimate_threshold`; the result may be off.
    Estimate,
}

impl BaseModel {
    /// Rows matching `args`, in alias form.
    pub async fn list(&self, args: &QueryArgs, tx: Option<&dyn Connection>) -> Result<Vec<Row>> {
        self.traced("list", async {
            let list = ListArgs::parse(args, &self.table, &self.config)?;
            self.cx(self.conn(tx)).list(&self.table, &list, None).await
        })
        .await
    }

    /// First row matching `args`, expanded with the default relations unless
    /// `args` names its own (`{"bt": ""}` switches belongs-to off).
    pub async fn find_one(
        &self,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Resolved<Option<Row>>> {
        self.traced("find_one", async {
            let args = args.over(&default_nested(&self.table));
            let mut list = ListArgs::parse(&args, &self.table, &self.config)?;
            list.limit = 1;
            self.relation_fields(&mut list, &args);

            let cx = self.cx(self.conn(tx));
            let mut rows = cx.list(&self.table, &list, None).await?;
            let diagnostics = cx.resolve_relations(&self.table, &mut rows, &args).await?;
            Ok(Resolved {
                data: rows.into_iter().next(),
                diagnostics,
            })
        })
        .await
    }

    /// Row with primary key `id`, or an empty row. `args` may narrow the
    /// fields and add a `conditionGraph`.
    pub async fn read_by_pk(
        &self,
        id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        self.traced("read_by_pk", self.read_one(id, args, tx)).await
    }

    pub(crate) async fn read_one(
        &self,
        id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        let parsed = ListArgs::parse(args, &self.table, &self.config)?;
        let list = ListArgs {
            fields: parsed.fields,
            condition_graph: parsed.condition_graph,
            limit: 1,
            ..Default::default()
        };
        let scope = pk_filter(&self.table, Some(self.table.name()), id)?;
        let rows = self
            .cx(self.conn(tx))
            .list(&self.table, &list, Some(scope))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Whether a row with primary key `id` exists.
    pub async fn exists(&self, id: &str, tx: Option<&dyn Connection>) -> Result<bool> {
        self.traced("exists", async {
            Ok(!self.read_one(id, &QueryArgs::new(), tx).await?.is_empty())
        })
        .await
    }

    /// Number of rows matching `args`.
    pub async fn count_by_pk(
        &self,
        args: &QueryArgs,
        mode: CountMode,
        tx: Option<&dyn Connection>,
    ) -> Result<i64> {
        self.traced("count_by_pk", async {
            let conn = self.conn(tx);
            let list = ListArgs::parse(args, &self.table, &self.config)?;
            let unfiltered = list.filters().is_none() && list.having.is_none();

            if mode == CountMode::Estimate && unfiltered && conn.dialect() == Dialect::PostgreSQL {
                let estimate = conn
                    .query_one(&estimate_sql(self.table.name()))
                    .await?
                    .and_then(|row| row.get("count").and_then(Value::as_i64));
                match estimate {
                    Some(n) if n > self.config.count_estimate_threshold => {
                        tracing::debug!(table = self.table.name(), estimate = n, "basemodel.count.estimate");
                        return Ok(n);
                    }
                    _ => {}
                }
            }
            self.count_where(conn, &list, None).await
        })
        .await
    }

    /// `COUNT(<pk or first column>)` under `list`'s filters and `scope`.
    pub(crate) async fn count_where(
        &self,
        conn: &dyn Connection,
        list: &ListArgs,
        scope: Option<SQL>,
    ) -> Result<i64> {
        let dialect = conn.dialect();
        let key = self
            .table
            .primary_key()
            .or_else(|| self.table.columns().first())
            .map(|c| SQL::qualified(self.table.name(), c.name.as_str()))
            .unwrap_or_else(|| SQL::raw("*"));
        let mut resolver = self.cx(conn).resolver(&self.table);
        let mut query = SelectQuery::from_table(self.table.name())
            .column(SQL::func("COUNT", key).alias("count"));
        if let Some(scope) = scope {
            query.and_filter(scope);
        }
        if let Some(filter) = list.filters() {
            query.and_filter(filter.to_sql(&mut resolver, dialect)?);
        }
        if let Some(having) = &list.having {
            query = query.having(having.to_sql(&mut resolver, dialect)?);
        }
        let row = conn.query_one(&query.to_sql(dialect)).await?;
        Ok(row
            .and_then(|r| r.get("count").and_then(Value::as_i64))
            .unwrap_or(0))
    }
}

/// Planner row estimate of a table in the `public` schema.
fn estimate_sql(table: &str) -> SQL {
    SQL::raw(
        "SELECT reltuples::int8 AS count FROM pg_class c \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace WHERE nspname =",
    )
    .append(SQL::param("public"))
    .append(SQL::raw("AND relname ="))
    .append(SQL::param(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_parametrized() {
        let sql = estimate_sql("orders");
        let (text, params) = sql.build(Dialect::PostgreSQL);
        assert!(text.ends_with("WHERE nspname = $1 AND relname = $2"));
        assert_eq!(params[1], &Value::from("orders"));
    }
}
