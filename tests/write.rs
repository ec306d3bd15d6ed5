#![cfg(feature = "rusqlite")]

use async_trait::async_trait;
use basemodel::core::{Row, Value};
use basemodel::error::BaseModelError;
use basemodel::validate::{NamedRule, Validator};
use basemodel::{
    Column, ColumnType, CountMode, HookContext, ModelContext, ModelHooks, QueryArgs, QueryConfig,
    Result, TableMeta,
};
use common::{ids, list, row, setup, setup_with, tables};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mod common;

#[tokio::test]
async fn insert_round_trips_aliases() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let data = row([
        ("Title", "Order 6".into()),
        ("Status", "open".into()),
        ("Total", Value::Real(12.5)),
        ("CustomerId", 2.into()),
    ]);
    let stored = orders.insert(&data, None).await.unwrap();

    assert_eq!(stored["Id"], Value::from(6));
    assert_eq!(stored["Title"], Value::from("Order 6"));
    assert_eq!(stored["Total"], Value::Real(12.5));
    assert!(!stored.contains_key("title"));
    // writes come back with their belongs-to parents
    assert_eq!(stored["CustomersRead"].as_row().unwrap()["Name"], Value::from("Bob"));
    assert!(!stored.contains_key("ItemsList"));

    let read = orders.read_by_pk("6", &QueryArgs::new(), None).await.unwrap();
    for (key, value) in &data {
        assert_eq!(&read[key.as_str()], value, "{key}");
    }
}

#[tokio::test]
async fn composite_keys_round_trip() {
    let fx = setup().await;
    let stock = fx.context.model("stock").unwrap();
    let none = QueryArgs::new();

    let stored = stock
        .insert(
            &row([("Warehouse", "east".into()), ("Sku", "B-2".into()), ("Qty", 1.into())]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(stored["Qty"], Value::from(1));

    let id = basemodel::pk::extract_pk_values(stock.table(), &stored).unwrap();
    assert_eq!(id, "east___B-2");
    assert_eq!(stock.read_by_pk(&id, &none, None).await.unwrap()["Sku"], Value::from("B-2"));

    let updated = stock
        .update_by_pk("south___A-1", &row([("Qty", 10.into())]), None)
        .await
        .unwrap();
    assert_eq!(updated["Qty"], Value::from(10));
    assert_eq!(
        stock.read_by_pk("north___A-1", &none, None).await.unwrap()["Qty"],
        Value::from(4)
    );

    assert_eq!(stock.del_by_pk(&id, None).await.unwrap(), 1);
    assert!(!stock.exists(&id, None).await.unwrap());

    let err = stock.read_by_pk("north", &none, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Query(_)), "{err:?}");
}

#[tokio::test]
async fn update_can_rewrite_the_key() {
    let fx = setup().await;
    let stock = fx.context.model("stock").unwrap();

    let moved = stock
        .update_by_pk("north___A-1", &row([("Warehouse", "west".into())]), None)
        .await
        .unwrap();
    assert_eq!(moved["Warehouse"], Value::from("west"));
    assert_eq!(moved["Qty"], Value::from(4));
}

#[tokio::test]
async fn nested_insert_links_in_one_transaction() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();
    let items = fx.context.model("items").unwrap();

    let data = row([
        ("Title", "Order 6".into()),
        ("CustomersRead", Value::Object(Box::new(row([("Id", 2.into())])))),
        ("ItemsList", Value::List(vec![row([("Id", 5.into())])])),
        ("TagsMMList", Value::List(vec![row([("Id", 3.into())])])),
    ]);
    let stored = orders.nested_insert(&data, None).await.unwrap();
    assert_eq!(stored["Id"], Value::from(6));
    assert_eq!(stored["CustomerId"], Value::from(2));

    let row = orders.nested_read("6", &QueryArgs::new(), None).await.unwrap();
    assert_eq!(ids(list(&row, "ItemsList")), vec![5]);
    assert_eq!(ids(list(&row, "TagsMMList")), vec![3]);
    assert_eq!(
        items.read_by_pk("5", &QueryArgs::new(), None).await.unwrap()["OrderId"],
        Value::from(6)
    );
}

#[tokio::test]
async fn failed_nested_insert_leaves_nothing_behind() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();
    let items = fx.context.model("items").unwrap();

    let data = row([
        ("Title", "Doomed".into()),
        ("ItemsList", Value::List(vec![row([("Id", 1.into())])])),
        ("TagsMMList", Value::List(vec![row([("Id", 99.into())])])),
    ]);
    let err = orders.nested_insert(&data, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::NotFound), "{err:?}");

    let none = QueryArgs::new();
    assert_eq!(orders.count_by_pk(&none, CountMode::Exact, None).await.unwrap(), 5);
    assert_eq!(
        items.read_by_pk("1", &none, None).await.unwrap()["OrderId"],
        Value::from(1)
    );

    let bad = row([("Title", "Odd".into()), ("ItemsList", "text".into())]);
    let err = orders.nested_insert(&bad, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Query(_)), "{err:?}");
}

#[tokio::test]
async fn foreign_key_scoped_operations() {
    let fx = setup().await;
    let items = fx.context.model("items").unwrap();
    let none = QueryArgs::new();

    let bag = items
        .insert_by_fk("orders", "3", &row([("Product", "bag".into()), ("Qty", 2.into())]), None)
        .await
        .unwrap();
    assert_eq!(bag["OrderId"], Value::from(3));
    assert_eq!(bag["OrdersRead"].as_row().unwrap()["Title"], Value::from("Order 3"));

    assert_eq!(items.count_by_fk("orders", "1", &none, None).await.unwrap(), 3);
    assert!(items.exists_by_fk("orders", "1", "1", None).await.unwrap());
    assert!(!items.exists_by_fk("orders", "2", "1", None).await.unwrap());
    assert!(items.read_by_fk("orders", "2", "1", &none, None).await.unwrap().is_empty());

    let top = items
        .find_one_by_fk("orders", "1", &QueryArgs::new().with("sort", "-Qty"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(top["Product"], Value::from("pad"));

    // the wrong parent leaves the row untouched
    items
        .update_by_fk("orders", "2", "1", &row([("Qty", 9.into())]), None)
        .await
        .unwrap();
    assert_eq!(items.read_by_pk("1", &none, None).await.unwrap()["Qty"], Value::from(2));
    let updated = items
        .update_by_fk("orders", "1", "1", &row([("Qty", 9.into())]), None)
        .await
        .unwrap();
    assert_eq!(updated["Qty"], Value::from(9));

    assert_eq!(items.del_by_fk("orders", "2", "1", None).await.unwrap(), 0);
    assert_eq!(items.del_by_fk("orders", "1", "1", None).await.unwrap(), 1);
}

#[tokio::test]
async fn where_scoped_writes() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let closed = QueryArgs::new().with("where", "(Status,eq,closed)");
    let changed = orders
        .update_where(&row([("Status", "archived".into())]), &closed, None)
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let archived = QueryArgs::new().with("where", "(Status,eq,archived)");
    assert_eq!(orders.del_where(&archived, None).await.unwrap(), 2);
    let rows = orders.list(&QueryArgs::new().with("sort", "Id"), None).await.unwrap();
    assert_eq!(ids(&rows), vec![1, 2, 5]);
}

#[tokio::test]
async fn bulk_writes_respect_the_configured_limits() {
    let config = QueryConfig {
        bulk_length_max: 4,
        chunk_size: 2,
        ..Default::default()
    };
    let fx = setup_with(config, tables()).await;
    let tags = fx.context.model("tags").unwrap();
    let none = QueryArgs::new();

    let labels = ["a", "b", "c"].map(|l| row([("Label", l.into())]));
    assert_eq!(tags.insert_bulk(&labels, None).await.unwrap(), 3);
    assert_eq!(tags.count_by_pk(&none, CountMode::Exact, None).await.unwrap(), 6);

    let too_many = ["d", "e", "f", "g", "h"].map(|l| row([("Label", l.into())]));
    let err = tags.insert_bulk(&too_many, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Query(_)), "{err:?}");
    assert_eq!(tags.count_by_pk(&none, CountMode::Exact, None).await.unwrap(), 6);

    let renamed = [row([("Id", 1.into()), ("Label", "URGENT".into())])];
    assert_eq!(tags.update_bulk(&renamed, None).await.unwrap(), 1);
    assert_eq!(tags.read_by_pk("1", &none, None).await.unwrap()["Label"], Value::from("URGENT"));

    let gone = [row([("Id", 3.into())]), row([("Id", 4.into())])];
    assert_eq!(tags.delete_bulk(&gone, None).await.unwrap(), 2);

    let keyless = [row([("Label", "x".into())])];
    let err = tags.delete_bulk(&keyless, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Query(_)), "{err:?}");
}

#[tokio::test]
async fn bulk_insert_keeps_defaults_for_omitted_columns() {
    let mut metas = tables();
    metas.push(
        TableMeta::new("notes")
            .alias("Notes")
            .column(Column::id("id").alias("Id"))
            .column(Column::new("body", ColumnType::LongText).alias("Body"))
            .column(Column::new("priority", ColumnType::Number).alias("Priority")),
    );
    let fx = setup_with(QueryConfig::default(), metas).await;
    fx.driver
        .execute_batch(
            "CREATE TABLE notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT,
                priority INTEGER NOT NULL DEFAULT 3
            )",
        )
        .await
        .unwrap();
    let notes = fx.context.model("notes").unwrap();

    let data = [
        row([("Body", "first".into()), ("Priority", 1.into())]),
        row([("Body", "second".into())]),
        row([("Priority", 5.into()), ("Body", "third".into())]),
        row([]),
    ];
    assert_eq!(notes.insert_bulk(&data, None).await.unwrap(), 4);

    let rows = notes
        .list(&QueryArgs::new().with("sort", "Id"), None)
        .await
        .unwrap();
    let priorities: Vec<Value> = rows.iter().map(|r| r["Priority"].clone()).collect();
    assert_eq!(
        priorities,
        vec![Value::from(1), Value::from(3), Value::from(5), Value::from(3)]
    );
    let bodies: Vec<Value> = rows.iter().map(|r| r["Body"].clone()).collect();
    assert_eq!(
        bodies,
        vec![Value::from("first"), Value::from("second"), Value::from("third"), Value::Null]
    );
}

#[tokio::test]
async fn first_failing_validator_stops_the_write() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut metas = tables();
    let customers = metas.iter_mut().find(|m| m.name == "customers").unwrap();
    customers.columns.retain(|c| c.name != "email");
    customers.columns.push(
        Column::new("email", ColumnType::Email)
            .alias("Email")
            .validator(Validator::named(
                NamedRule::IsEmail,
                "{VALUE} is not a valid {cn}",
            ))
            .validator(Validator::sync(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                },
                "unreachable",
            )),
    );
    let fx = setup_with(QueryConfig::default(), metas).await;
    let customers = fx.context.model("customers").unwrap();

    let err = customers
        .insert(&row([("Name", "Cy".into()), ("Email", "nope".into())]), None)
        .await
        .unwrap_err();
    match err {
        BaseModelError::Validation { column, message } => {
            assert_eq!(column, "Email");
            assert_eq!(message, "nope is not a valid Email");
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        customers
            .count_by_pk(&QueryArgs::new(), CountMode::Exact, None)
            .await
            .unwrap(),
        2
    );

    // blank values are not validated
    customers
        .insert(&row([("Name", "Di".into()), ("Email", "".into())]), None)
        .await
        .unwrap();
    customers
        .insert(&row([("Name", "Ed".into()), ("Email", "ed@example.com".into())]), None)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelHooks for Recorder {
    async fn before_insert(&self, _ctx: &HookContext<'_>, data: &mut Row) -> Result<()> {
        self.push("before_insert");
        data.entry("status".to_string()).or_insert_with(|| "new".into());
        Ok(())
    }

    async fn after_insert(&self, ctx: &HookContext<'_>, row: &Row) -> Result<()> {
        self.push(format!("after_insert {} {}", ctx.table, row["Id"]));
        Ok(())
    }

    async fn before_delete(&self, _ctx: &HookContext<'_>, id: &str) -> Result<()> {
        if id == "1" {
            return Err(BaseModelError::Hook("order 1 is protected".into()));
        }
        Ok(())
    }

    async fn error_delete(&self, _ctx: &HookContext<'_>, error: &BaseModelError, id: &str) {
        self.push(format!("error_delete {id}: {error}"));
    }
}

#[tokio::test]
async fn hooks_wrap_writes() {
    let fx = setup().await;
    let recorder = Arc::new(Recorder::default());
    let context = ModelContext::new(
        fx.driver.clone(),
        fx.context.registry().clone(),
        QueryConfig::default(),
    )
    .with_hooks("Orders", recorder.clone());
    let orders = context.model("orders").unwrap();

    let stored = orders.insert(&row([("Title", "Hooked".into())]), None).await.unwrap();
    assert_eq!(stored["Status"], Value::from("new"));

    let err = orders.del_by_pk("1", None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Hook(_)), "{err:?}");
    assert!(orders.exists("1", None).await.unwrap());
    assert_eq!(orders.del_by_pk("6", None).await.unwrap(), 1);

    assert_eq!(
        recorder.events(),
        vec![
            "before_insert".to_string(),
            "after_insert orders 6".to_string(),
            "error_delete 1: Hook error: order 1 is protected".to_string(),
        ]
    );

    // other tables keep the default hooks
    let tags = context.model("tags").unwrap();
    let tag = tags.insert(&row([("Label", "plain".into())]), None).await.unwrap();
    assert!(!tag.contains_key("status"));
}

#[tokio::test]
async fn raw_statements_bind_in_order() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let rows = orders
        .raw(
            "SELECT title FROM orders WHERE total > ? AND status = ? ORDER BY id",
            vec![30.into(), "open".into()],
            None,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], Value::from("Order 5"));

    let err = orders.raw("SELECT ?", vec![], None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Parameter(_)));
}
