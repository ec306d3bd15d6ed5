#![cfg(feature = "rusqlite")]
#![allow(dead_code)]

use basemodel::core::{Row, Value};
use basemodel::schema::{RelationRef, RollupFunc, VirtualColumn};
use basemodel::sqlite::SqliteDriver;
use basemodel::{
    Column, ColumnType, Junction, ModelContext, QueryConfig, Relation, RelationKind,
    ResolutionMode, SchemaRegistry, TableMeta,
};
use std::sync::{Arc, Once};

pub const DDL: &str = "
CREATE TABLE customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    email TEXT
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    status TEXT,
    total REAL,
    customer_id INTEGER REFERENCES customers(id)
);
CREATE TABLE items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER REFERENCES orders(id),
    product TEXT,
    qty INTEGER
);
CREATE TABLE tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT
);
CREATE TABLE order_tags (
    order_id INTEGER NOT NULL REFERENCES orders(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id)
);
CREATE TABLE stock (
    warehouse TEXT NOT NULL,
    sku TEXT NOT NULL,
    qty INTEGER,
    PRIMARY KEY (warehouse, sku)
);
";

pub const SEED: &str = "
INSERT INTO customers (id, name, email) VALUES (1, 'Ada', 'ada@example.com'), (2, 'Bob', 'bob@example.com');
INSERT INTO orders (id, title, status, total, customer_id) VALUES
    (1, 'Order 1', 'open', 10, 1),
    (2, 'Order 2', 'open', 25, 2),
    (3, 'Order 3', 'closed', 40, 1),
    (4, 'Order 4', 'closed', 55, NULL),
    (5, 'Order 5', 'open', 70, 2);
INSERT INTO items (id, order_id, product, qty) VALUES
    (1, 1, 'pen', 2),
    (2, 1, 'ink', 1),
    (3, 1, 'pad', 5),
    (4, 2, 'pen', 3),
    (5, 5, 'cap', 1);
INSERT INTO tags (id, label) VALUES (1, 'urgent'), (2, 'gift'), (3, 'bulk');
INSERT INTO order_tags (order_id, tag_id) VALUES (1, 1), (1, 2), (2, 1);
INSERT INTO stock (warehouse, sku, qty) VALUES ('north', 'A-1', 4), ('south', 'A-1', 9);
";

pub fn tables() -> Vec<TableMeta> {
    vec![
        TableMeta::new("customers")
            .alias("Customers")
            .column(Column::id("id").alias("Id"))
            .column(
                Column::new("name", ColumnType::SingleLineText)
                    .alias("Name")
                    .primary_value(),
            )
            .column(Column::new("email", ColumnType::Email).alias("Email")),
        TableMeta::new("orders")
            .alias("Orders")
            .column(Column::id("id").alias("Id"))
            .column(
                Column::new("title", ColumnType::SingleLineText)
                    .alias("Title")
                    .primary_value(),
            )
            .column(Column::new("status", ColumnType::SingleSelect).alias("Status"))
            .column(Column::new("total", ColumnType::Decimal).alias("Total"))
            .column(Column::new("customer_id", ColumnType::ForeignKey).alias("CustomerId"))
            .relation(Relation::belongs_to("customers", "customer_id", "id"))
            .relation(Relation::has_many("items", "id", "order_id"))
            .relation(Relation::many_to_many(
                "tags",
                "id",
                "id",
                Junction {
                    table: "order_tags".into(),
                    column: "order_id".into(),
                    related_column: "tag_id".into(),
                },
            ))
            .virtual_column(VirtualColumn::Lookup {
                alias: "CustomerEmail".into(),
                relation: RelationRef::new(RelationKind::BelongsTo, "customers"),
                column: "email".into(),
            })
            .virtual_column(VirtualColumn::Rollup {
                alias: "ItemCount".into(),
                relation: RelationRef::new(RelationKind::HasMany, "items"),
                column: "id".into(),
                func: RollupFunc::Count,
            }),
        TableMeta::new("items")
            .alias("Items")
            .column(Column::id("id").alias("Id"))
            .column(Column::new("order_id", ColumnType::ForeignKey).alias("OrderId"))
            .column(
                Column::new("product", ColumnType::SingleLineText)
                    .alias("Product")
                    .primary_value(),
            )
            .column(Column::new("qty", ColumnType::Number).alias("Qty")),
        TableMeta::new("tags")
            .alias("Tags")
            .column(Column::id("id").alias("Id"))
            .column(
                Column::new("label", ColumnType::SingleLineText)
                    .alias("Label")
                    .primary_value(),
            ),
        TableMeta::new("stock")
            .alias("Stock")
            .column(
                Column::new("warehouse", ColumnType::SingleLineText)
                    .alias("Warehouse")
                    .primary_key(),
            )
            .column(
                Column::new("sku", ColumnType::SingleLineText)
                    .alias("Sku")
                    .primary_key(),
            )
            .column(Column::new("qty", ColumnType::Number).alias("Qty")),
    ]
}

pub struct Fixture {
    pub driver: Arc<SqliteDriver>,
    pub context: Arc<ModelContext>,
}

pub async fn setup() -> Fixture {
    setup_with(QueryConfig::default(), tables()).await
}

/// Routes `tracing` output through the test harness; `RUST_LOG=basemodel=debug`
/// shows the generated statements.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn setup_with(config: QueryConfig, metas: Vec<TableMeta>) -> Fixture {
    init_tracing();
    let driver = Arc::new(SqliteDriver::open_in_memory().expect("open sqlite"));
    driver.execute_batch(DDL).await.expect("create tables");
    driver.execute_batch(SEED).await.expect("seed rows");
    let registry = SchemaRegistry::from_tables(metas, ResolutionMode::Lenient)
        .await
        .expect("build schema");
    let context = ModelContext::new(driver.clone(), Arc::new(registry), config);
    Fixture {
        driver,
        context: Arc::new(context),
    }
}

/// Row from `(alias, value)` pairs.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|r| r.get("Id").and_then(Value::as_i64))
        .collect()
}

pub fn list<'r>(row: &'r Row, property: &str) -> &'r [Row] {
    row.get(property)
        .and_then(Value::as_rows)
        .unwrap_or_else(|| panic!("{property} is not a row list: {:?}", row.get(property)))
}
