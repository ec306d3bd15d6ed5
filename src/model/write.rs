use super::BaseModel;
use crate::alias::{to_alias, to_physical};
use crate::args::{ListArgs, QueryArgs, default_nested_bt};
use crate::hooks::BulkOp;
use crate::pk::{extract_pk_values, pk_filter, where_pk};
use crate::schema::{RelationKind, Table, TableRelation};
use crate::validate::validate_row;
use basemodel_core::helpers::{and, eq};
use basemodel_core::{
    BaseModelError, Connection, DeleteQuery, ExecuteOutcome, InsertQuery, Result, Returning, Row,
    SQL, SQLChunk, UpdateQuery, Value,
};

// ============================================================================
// Single-row writes
// ============================================================================

impl BaseModel {
    /// Inserts `data` (keyed by alias) and returns the stored row with its
    /// belongs-to parents.
    pub async fn insert(&self, data: &Row, tx: Option<&dyn Connection>) -> Result<Row> {
        self.traced("insert", async {
            let physical = to_physical(&self.table, data);
            self.insert_linked(physical, Vec::new(), self.conn(tx)).await
        })
        .await
    }

    /// Inserts `data` together with its nested relation payloads, in one
    /// transaction. A `<Parent>Read` object sets the foreign key before the
    /// insert; `<Child>List` and `<Related>MMList` rows are linked to the new
    /// row afterwards.
    pub async fn nested_insert(&self, data: &Row, tx: Option<&dyn Connection>) -> Result<Row> {
        self.traced("nested_insert", async {
            let mut physical = to_physical(&self.table, data);
            let links = self.nested_payload(data, &mut physical)?;
            let scope = self.scope(tx).await?;
            let result = self.insert_linked(physical, links, scope.conn()).await;
            scope.finish(result).await
        })
        .await
    }

    fn nested_payload<'t>(
        &'t self,
        data: &Row,
        physical: &mut Row,
    ) -> Result<Vec<(&'t TableRelation, String)>> {
        let mut links = Vec::new();
        for relation in self.table.relations() {
            let Some(payload) = data.get(&relation.property) else {
                continue;
            };
            let related: &Table = self.snapshot.require(&relation.related)?;
            match (relation.kind, payload) {
                (RelationKind::BelongsTo, Value::Object(parent)) => {
                    let target = related.require_column(&relation.related_column)?;
                    let value = parent
                        .get(&target.alias)
                        .or_else(|| parent.get(&target.name))
                        .cloned()
                        .unwrap_or_default();
                    physical.insert(relation.column.clone(), value);
                }
                (RelationKind::BelongsTo, Value::Null) => {
                    physical.insert(relation.column.clone(), Value::Null);
                }
                (RelationKind::HasMany | RelationKind::ManyToMany, Value::List(rows)) => {
                    for row in rows {
                        let id = extract_pk_values(related, row).ok_or_else(|| {
                            BaseModelError::query(format!(
                                "{} : nested row without primary key",
                                relation.property
                            ))
                        })?;
                        links.push((relation, id));
                    }
                }
                (_, Value::Array(items)) if items.is_empty() => {}
                _ => {
                    return Err(BaseModelError::query(format!(
                        "{} : unexpected nested payload",
                        relation.property
                    )));
                }
            }
        }
        Ok(links)
    }

    async fn insert_linked(
        &self,
        mut physical: Row,
        links: Vec<(&TableRelation, String)>,
        conn: &dyn Connection,
    ) -> Result<Row> {
        let ctx = self.hook_context(conn);
        let result = async {
            self.hooks.before_insert(&ctx, &mut physical).await?;
            validate_row(&self.table, &physical).await?;
            let row = match self.insert_row(conn, &physical).await? {
                Some(id) => {
                    for (relation, child) in &links {
                        self.relink(&relation.property, &id, child, true, conn)
                            .await?;
                    }
                    self.read_nested(&id, &default_nested_bt(&self.table), conn)
                        .await?
                        .into_inner()
                }
                None if links.is_empty() => to_alias(&self.table, physical.clone()),
                None => {
                    return Err(BaseModelError::Statement(format!(
                        "cannot link nested rows to {} without a primary key",
                        self.table.alias()
                    )));
                }
            };
            self.hooks.after_insert(&ctx, &row).await?;
            Ok(row)
        }
        .await;
        if let Err(error) = &result {
            self.hooks.error_insert(&ctx, error, &physical).await;
        }
        result
    }

    /// Runs the INSERT and returns the new row's key string, when the table
    /// has one.
    async fn insert_row(&self, conn: &dyn Connection, physical: &Row) -> Result<Option<String>> {
        let dialect = conn.dialect();
        let query = InsertQuery::into_table(self.table.name()).row(physical)?;
        if dialect.supports_returning() {
            let returned = conn
                .query_one(&query.returning(Returning::All).to_sql(dialect)?)
                .await?;
            return Ok(returned.and_then(|row| extract_pk_values(&self.table, &row)));
        }
        let outcome = conn.execute(&query.to_sql(dialect)?).await?;
        Ok(self.inserted_id(physical, outcome))
    }

    /// Key of a row inserted without `RETURNING`: the key values the row
    /// carried, else the generated id of a single auto-increment key.
    fn inserted_id(&self, physical: &Row, outcome: ExecuteOutcome) -> Option<String> {
        if let Some(id) = extract_pk_values(&self.table, physical) {
            return Some(id);
        }
        let mut keys = self.table.primary_keys();
        match (keys.next(), keys.next(), outcome.last_insert_id) {
            (Some(pk), None, Some(id)) if pk.auto_increment => Some(id.to_string()),
            _ => None,
        }
    }

    /// Updates row `id` and returns it re-read with its belongs-to parents;
    /// empty when no row has that key.
    pub async fn update_by_pk(
        &self,
        id: &str,
        data: &Row,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        self.traced("update_by_pk", self.update_scoped(id, data, None, self.conn(tx)))
            .await
    }

    async fn update_scoped(
        &self,
        id: &str,
        data: &Row,
        scope: Option<SQL>,
        conn: &dyn Connection,
    ) -> Result<Row> {
        let ctx = self.hook_context(conn);
        let mut physical = to_physical(&self.table, data);
        let result = async {
            self.hooks.before_update(&ctx, id, &mut physical).await?;
            validate_row(&self.table, &physical).await?;
            if !physical.is_empty() {
                let mut filter = pk_filter(&self.table, None, id)?;
                if let Some(scope) = scope {
                    filter = and([filter, scope]);
                }
                let sql = UpdateQuery::table(self.table.name())
                    .set_row(&physical)
                    .filter(filter)
                    .to_sql(conn.dialect())?;
                conn.execute(&sql).await?;
            }
            let id = self.updated_id(id, &physical)?;
            let row = self
                .read_nested(&id, &default_nested_bt(&self.table), conn)
                .await?
                .into_inner();
            self.hooks.after_update(&ctx, &row).await?;
            Ok(row)
        }
        .await;
        if let Err(error) = &result {
            self.hooks.error_update(&ctx, error, &physical).await;
        }
        result
    }

    /// Key string after an update that may have rewritten key columns.
    fn updated_id(&self, id: &str, physical: &Row) -> Result<String> {
        let mut key = where_pk(&self.table, id)?;
        for column in self.table.primary_keys() {
            if let Some(value) = physical.get(&column.name) {
                key.insert(column.name.clone(), value.clone());
            }
        }
        Ok(extract_pk_values(&self.table, &key).unwrap_or_else(|| id.to_string()))
    }

    /// Deletes row `id`; returns the number of rows removed.
    pub async fn del_by_pk(&self, id: &str, tx: Option<&dyn Connection>) -> Result<u64> {
        self.traced("del_by_pk", self.delete_scoped(id, None, self.conn(tx)))
            .await
    }

    async fn delete_scoped(
        &self,
        id: &str,
        scope: Option<SQL>,
        conn: &dyn Connection,
    ) -> Result<u64> {
        let ctx = self.hook_context(conn);
        let result = async {
            self.hooks.before_delete(&ctx, id).await?;
            let mut filter = pk_filter(&self.table, None, id)?;
            if let Some(scope) = scope {
                filter = and([filter, scope]);
            }
            let sql = DeleteQuery::from_table(self.table.name())
                .filter(filter)
                .to_sql();
            let affected = conn.execute(&sql).await?.rows_affected;
            self.hooks.after_delete(&ctx, id).await?;
            Ok(affected)
        }
        .await;
        if let Err(error) = &result {
            self.hooks.error_delete(&ctx, error, id).await;
        }
        result
    }
}

// ============================================================================
// Foreign-key scoped operations
// ============================================================================

impl BaseModel {
    /// `<fk> = parent_id` for the belongs-to relation to `parent`.
    fn fk_scope(&self, parent: &str, parent_id: &str, qualified: bool) -> Result<(String, SQL)> {
        let relation = self.require_relation(RelationKind::BelongsTo, parent)?;
        let column = self.table.require_column(&relation.column)?;
        let lhs = if qualified {
            SQL::qualified(self.table.name(), column.name.as_str())
        } else {
            SQL::ident(column.name.as_str())
        };
        let value = Value::from(parent_id).coerce(column.class());
        Ok((column.alias.clone(), eq(lhs, value)))
    }

    /// Inserts `data` as a child of row `parent_id` of `parent`.
    pub async fn insert_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        data: &Row,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        self.traced("insert_by_fk", async {
            let relation = self.require_relation(RelationKind::BelongsTo, parent)?;
            let column = self.table.require_column(&relation.column)?;
            let mut data = data.clone();
            data.shift_remove(&column.name);
            data.insert(
                column.alias.clone(),
                Value::from(parent_id).coerce(column.class()),
            );
            let physical = to_physical(&self.table, &data);
            self.insert_linked(physical, Vec::new(), self.conn(tx)).await
        })
        .await
    }

    pub async fn update_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        id: &str,
        data: &Row,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        self.traced("update_by_fk", async {
            let (_, scope) = self.fk_scope(parent, parent_id, false)?;
            self.update_scoped(id, data, Some(scope), self.conn(tx)).await
        })
        .await
    }

    pub async fn del_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        id: &str,
        tx: Option<&dyn Connection>,
    ) -> Result<u64> {
        self.traced("del_by_fk", async {
            let (_, scope) = self.fk_scope(parent, parent_id, false)?;
            self.delete_scoped(id, Some(scope), self.conn(tx)).await
        })
        .await
    }

    /// Row `id` if it belongs to `parent_id`, else an empty row.
    pub async fn read_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Row> {
        self.traced("read_by_fk", async {
            let (_, scope) = self.fk_scope(parent, parent_id, true)?;
            let parsed = ListArgs::parse(args, &self.table, &self.config)?;
            let list = ListArgs {
                fields: parsed.fields,
                limit: 1,
                ..Default::default()
            };
            let key = pk_filter(&self.table, Some(self.table.name()), id)?;
            let rows = self
                .cx(self.conn(tx))
                .list(&self.table, &list, Some(and([key, scope])))
                .await?;
            Ok(rows.into_iter().next().unwrap_or_default())
        })
        .await
    }

    /// First child of `parent_id` matching `args`.
    pub async fn find_one_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<Option<Row>> {
        self.traced("find_one_by_fk", async {
            let (_, scope) = self.fk_scope(parent, parent_id, true)?;
            let mut list = ListArgs::parse(args, &self.table, &self.config)?;
            list.limit = 1;
            let rows = self
                .cx(self.conn(tx))
                .list(&self.table, &list, Some(scope))
                .await?;
            Ok(rows.into_iter().next())
        })
        .await
    }

    pub async fn count_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<i64> {
        self.traced("count_by_fk", async {
            let (_, scope) = self.fk_scope(parent, parent_id, true)?;
            let list = ListArgs::parse(args, &self.table, &self.config)?;
            self.count_where(self.conn(tx), &list, Some(scope)).await
        })
        .await
    }

    pub async fn exists_by_fk(
        &self,
        parent: &str,
        parent_id: &str,
        id: &str,
        tx: Option<&dyn Connection>,
    ) -> Result<bool> {
        let row = self
            .read_by_fk(parent, parent_id, id, &QueryArgs::new(), tx)
            .await?;
        Ok(!row.is_empty())
    }
}

// ============================================================================
// Where-scoped and bulk writes
// ============================================================================

impl BaseModel {
    /// WHERE clause from `where`/`condition`/`conditionGraph`; `None` means
    /// every row.
    fn write_filter(&self, args: &QueryArgs, dialect: basemodel_core::Dialect) -> Result<Option<SQL>> {
        let list = ListArgs::parse(args, &self.table, &self.config)?;
        match list.filters() {
            Some(filter) => {
                let mut resolver = crate::resolve::TableResolver::new(&self.snapshot, &self.table, dialect);
                Ok(Some(filter.to_sql(&mut resolver, dialect)?))
            }
            None => Ok(None),
        }
    }

    /// Applies `data` to every row matching `args`; returns the number of
    /// rows changed.
    pub async fn update_where(
        &self,
        data: &Row,
        args: &QueryArgs,
        tx: Option<&dyn Connection>,
    ) -> Result<u64> {
        self.traced("update_where", async {
            let conn = self.conn(tx);
            let dialect = conn.dialect();
            let physical = to_physical(&self.table, data);
            validate_row(&self.table, &physical).await?;
            let mut query = UpdateQuery::table(self.table.name()).set_row(&physical);
            if let Some(filter) = self.write_filter(args, dialect)? {
                query = query.filter(filter);
            }
            Ok(conn.execute(&query.to_sql(dialect)?).await?.rows_affected)
        })
        .await
    }

    /// Deletes every row matching `args`.
    pub async fn del_where(&self, args: &QueryArgs, tx: Option<&dyn Connection>) -> Result<u64> {
        self.traced("del_where", async {
            let conn = self.conn(tx);
            let mut query = DeleteQuery::from_table(self.table.name());
            if let Some(filter) = self.write_filter(args, conn.dialect())? {
                query = query.filter(filter);
            }
            Ok(conn.execute(&query.to_sql()).await?.rows_affected)
        })
        .await
    }

    fn check_bulk(&self, op: BulkOp, len: usize) -> Result<()> {
        if len > self.config.bulk_length_max {
            return Err(BaseModelError::query(format!(
                "{op:?} of {len} rows exceeds the bulk limit of {}",
                self.config.bulk_length_max
            )));
        }
        Ok(())
    }

    /// Inserts `data` in statements of `chunk_size` rows, in one transaction.
    pub async fn insert_bulk(&self, data: &[Row], tx: Option<&dyn Connection>) -> Result<u64> {
        self.traced("insert_bulk", async {
            self.check_bulk(BulkOp::Insert, data.len())?;
            let rows = data.iter().map(|row| to_physical(&self.table, row)).collect();
            self.bulk(BulkOp::Insert, rows, tx).await
        })
        .await
    }

    /// Updates every row of `data` by its primary key, all or nothing.
    pub async fn update_bulk(&self, data: &[Row], tx: Option<&dyn Connection>) -> Result<u64> {
        self.traced("update_bulk", async {
            self.check_bulk(BulkOp::Update, data.len())?;
            let rows = data.iter().map(|row| to_physical(&self.table, row)).collect();
            self.bulk(BulkOp::Update, rows, tx).await
        })
        .await
    }

    /// Deletes every row of `data` by its primary key, all or nothing.
    pub async fn delete_bulk(&self, data: &[Row], tx: Option<&dyn Connection>) -> Result<u64> {
        self.traced("delete_bulk", async {
            self.check_bulk(BulkOp::Delete, data.len())?;
            let rows = data.iter().map(|row| to_physical(&self.table, row)).collect();
            self.bulk(BulkOp::Delete, rows, tx).await
        })
        .await
    }

    async fn bulk(&self, op: BulkOp, mut rows: Vec<Row>, tx: Option<&dyn Connection>) -> Result<u64> {
        let scope = self.scope(tx).await?;
        let conn = scope.conn();
        let ctx = self.hook_context(conn);
        let result = async {
            self.hooks.before_bulk(&ctx, op, &mut rows).await?;
            let affected = match op {
                BulkOp::Insert => self.run_bulk_insert(conn, &rows).await?,
                BulkOp::Update | BulkOp::Delete => self.run_bulk_by_pk(conn, op, &rows).await?,
            };
            self.hooks.after_bulk(&ctx, op, affected).await?;
            Ok(affected)
        }
        .await;
        if let Err(error) = &result {
            self.hooks.error_bulk(&ctx, op, error).await;
        }
        scope.finish(result).await
    }

    async fn run_bulk_insert(&self, conn: &dyn Connection, rows: &[Row]) -> Result<u64> {
        for row in rows {
            validate_row(&self.table, row).await?;
        }
        let dialect = conn.dialect();
        let mut affected = 0;
        for chunk in rows.chunks(self.config.chunk_size.max(1)) {
            for batch in InsertQuery::batches(self.table.name(), chunk)? {
                affected += conn.execute(&batch.to_sql(dialect)?).await?.rows_affected;
            }
        }
        Ok(affected)
    }

    async fn run_bulk_by_pk(&self, conn: &dyn Connection, op: BulkOp, rows: &[Row]) -> Result<u64> {
        let dialect = conn.dialect();
        let mut affected = 0;
        for row in rows {
            let id = extract_pk_values(&self.table, row).ok_or_else(|| {
                BaseModelError::query(format!(
                    "{op:?} row of {} is missing its primary key",
                    self.table.alias()
                ))
            })?;
            let filter = pk_filter(&self.table, None, &id)?;
            let sql = if op == BulkOp::Delete {
                DeleteQuery::from_table(self.table.name())
                    .filter(filter)
                    .to_sql()
            } else {
                validate_row(&self.table, row).await?;
                let mut values = row.clone();
                for pk in self.table.primary_keys() {
                    values.shift_remove(&pk.name);
                }
                if values.is_empty() {
                    continue;
                }
                UpdateQuery::table(self.table.name())
                    .set_row(&values)
                    .filter(filter)
                    .to_sql(dialect)?
            };
            affected += conn.execute(&sql).await?.rows_affected;
        }
        Ok(affected)
    }
}

// ============================================================================
// Raw statements
// ============================================================================

impl BaseModel {
    /// Runs `sql` with `?` placeholders bound to `params` in order.
    pub async fn raw(
        &self,
        sql: &str,
        params: Vec<Value>,
        tx: Option<&dyn Connection>,
    ) -> Result<Vec<Row>> {
        self.traced("raw", async {
            let statement = bind_raw(sql, params)?;
            self.conn(tx).query(&statement).await
        })
        .await
    }
}

/// Splits `sql` at every `?` and binds one parameter per placeholder.
fn bind_raw(sql: &str, params: Vec<Value>) -> Result<SQL> {
    let pieces: Vec<&str> = sql.split('?').collect();
    if pieces.len() - 1 != params.len() {
        return Err(BaseModelError::Parameter(format!(
            "statement has {} placeholders but {} parameters were given",
            pieces.len() - 1,
            params.len()
        )));
    }
    let mut statement = SQL::empty();
    let mut params = params.into_iter();
    for (i, piece) in pieces.iter().enumerate() {
        if !piece.is_empty() {
            statement = statement.push(SQLChunk::raw(*piece));
        }
        if i + 1 < pieces.len()
            && let Some(value) = params.next()
        {
            statement = statement.push(SQLChunk::Param(value));
        }
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basemodel_core::Dialect;

    #[test]
    fn raw_binds_in_order() {
        let sql = bind_raw("SELECT * FROM t WHERE a = ? AND b = ?", vec![1.into(), "x".into()]).unwrap();
        let (text, params) = sql.build(Dialect::PostgreSQL);
        assert_eq!(text, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], &Value::from("x"));
    }

    #[test]
    fn raw_rejects_param_mismatch() {
        let err = bind_raw("SELECT ?", vec![]).unwrap_err();
        assert!(matches!(err, BaseModelError::Parameter(_)));
    }
}
