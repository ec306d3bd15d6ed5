#![cfg(feature = "rusqlite")]

use basemodel::core::Value;
use basemodel::error::BaseModelError;
use basemodel::{QueryArgs, QueryConfig, ResolutionMode};
use common::{ids, list, setup, setup_with, tables};

mod common;

fn only_items() -> QueryArgs {
    QueryArgs::new()
        .with("sort", "Id")
        .with("hm", "items")
        .with("bt", "")
        .with("mm", "")
}

#[tokio::test]
async fn has_many_children_are_limited_per_parent() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let rows = orders
        .nested_list(&only_items().with("hlimit1", 1), None)
        .await
        .unwrap();

    assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);
    let children: Vec<Vec<i64>> = rows.iter().map(|r| ids(list(r, "ItemsList"))).collect();
    assert_eq!(children, vec![vec![1], vec![4], vec![], vec![], vec![5]]);
    assert!(!rows[0].contains_key("CustomersRead"));
    assert!(!rows[0].contains_key("TagsMMList"));
}

#[tokio::test]
async fn child_arguments_filter_and_project() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let args = only_items()
        .with("hwhere1", "(Qty,gt,1)")
        .with("hfields1", "Qty")
        .with("hsort1", "-Qty");
    let rows = orders.nested_list(&args, None).await.unwrap();

    let first = list(&rows[0], "ItemsList");
    assert_eq!(ids(first), vec![3, 1]);
    let child = &first[0];
    assert_eq!(child["Qty"], Value::from(5));
    assert_eq!(child["Product"], Value::from("pad"));
    assert_eq!(child["OrderId"], Value::from(1));
    assert_eq!(ids(list(&rows[1], "ItemsList")), vec![4]);
}

#[tokio::test]
async fn nested_read_attaches_every_relation() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let row = orders.nested_read("1", &QueryArgs::new(), None).await.unwrap();
    assert_eq!(ids(list(&row, "ItemsList")), vec![1, 2, 3]);
    let labels: Vec<_> = list(&row, "TagsMMList")
        .iter()
        .map(|t| t["Label"].clone())
        .collect();
    assert_eq!(labels, vec![Value::from("urgent"), Value::from("gift")]);
    assert_eq!(row["CustomersRead"].as_row().unwrap()["Name"], Value::from("Ada"));

    let orphan = orders.nested_read("4", &QueryArgs::new(), None).await.unwrap();
    assert_eq!(orphan["CustomersRead"], Value::Null);
    assert!(list(&orphan, "ItemsList").is_empty());

    let missing = orders.nested_read("42", &QueryArgs::new(), None).await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn belongs_to_from_the_child_side() {
    let fx = setup().await;
    let items = fx.context.model("items").unwrap();

    let rows = items
        .belongs_to(&QueryArgs::new().with("bt", "orders").with("sort", "Id"), None)
        .await
        .unwrap();
    let parents: Vec<_> = rows
        .iter()
        .map(|r| r["OrdersRead"].as_row().unwrap()["Title"].clone())
        .collect();
    assert_eq!(
        parents,
        vec![
            Value::from("Order 1"),
            Value::from("Order 1"),
            Value::from("Order 1"),
            Value::from("Order 2"),
            Value::from("Order 5"),
        ]
    );
}

#[tokio::test]
async fn unknown_relations_follow_the_resolution_mode() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();
    let args = QueryArgs::new().with("hm", "ghosts");

    let lenient = orders.nested_list(&args, None).await.unwrap();
    assert_eq!(lenient.len(), 5);
    assert_eq!(lenient.diagnostics.len(), 1);
    assert_eq!(lenient.diagnostics[0].target, "ghosts");

    let strict = QueryConfig {
        resolution: ResolutionMode::Strict,
        ..Default::default()
    };
    let fx = setup_with(strict, tables()).await;
    let orders = fx.context.model("orders").unwrap();
    let err = orders.nested_list(&args, None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::Schema(_)), "{err:?}");
}

#[tokio::test]
async fn has_many_children_and_batches() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();

    let children = orders
        .has_many_children("items", "1", &QueryArgs::new().with("sort", "-Id"), None)
        .await
        .unwrap();
    assert_eq!(ids(&children), vec![3, 2, 1]);

    let keys = ["1".to_string(), "3".to_string(), "9".to_string()];
    let pages = orders
        .has_many_list_gql("items", &keys, &QueryArgs::new().with("limit", 2), None)
        .await
        .unwrap();
    assert_eq!(pages.keys().collect::<Vec<_>>(), vec!["1", "3", "9"]);
    assert_eq!(ids(&pages["1"]), vec![1, 2]);
    assert!(pages["3"].is_empty());
    assert!(pages["9"].is_empty());

    let keys = ["1".to_string(), "2".to_string(), "3".to_string()];
    let counts = orders
        .has_many_list_count("items", &keys, &QueryArgs::new(), None)
        .await
        .unwrap();
    assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![3, 1, 0]);

    let pens = QueryArgs::new().with("where", "(Product,eq,pen)");
    let counts = orders
        .has_many_list_count("items", &keys, &pens, None)
        .await
        .unwrap();
    assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![1, 1, 0]);

    let err = orders
        .has_many_children("tags", "1", &QueryArgs::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BaseModelError::Query(_)));
}

#[tokio::test]
async fn many_to_many_candidates_exclude_linked_rows() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();
    let sorted = QueryArgs::new().with("sort", "Id");

    let free = orders.m2m_not_children("tags", "1", &sorted, None).await.unwrap();
    assert_eq!(ids(&free), vec![3]);
    let free = orders.m2m_not_children("tags", "2", &sorted, None).await.unwrap();
    assert_eq!(ids(&free), vec![2, 3]);
    let free = orders.m2m_not_children("tags", "4", &sorted, None).await.unwrap();
    assert_eq!(ids(&free), vec![1, 2, 3]);

    assert_eq!(
        orders
            .m2m_not_children_count("tags", "2", &QueryArgs::new(), None)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn link_and_unlink_each_relation_kind() {
    let fx = setup().await;
    let orders = fx.context.model("orders").unwrap();
    let items = fx.context.model("items").unwrap();
    let none = QueryArgs::new();

    // many-to-many through the junction
    orders.link("TagsMMList", "3", "2", None).await.unwrap();
    let row = orders.nested_read("3", &none, None).await.unwrap();
    assert_eq!(ids(list(&row, "TagsMMList")), vec![2]);
    orders.unlink("tags", "3", "2", None).await.unwrap();
    let row = orders.nested_read("3", &none, None).await.unwrap();
    assert!(list(&row, "TagsMMList").is_empty());

    // has-many moves the child's foreign key
    orders.link("items", "3", "5", None).await.unwrap();
    assert_eq!(items.read_by_pk("5", &none, None).await.unwrap()["OrderId"], Value::from(3));
    orders.unlink("ItemsList", "3", "5", None).await.unwrap();
    assert_eq!(items.read_by_pk("5", &none, None).await.unwrap()["OrderId"], Value::Null);

    // belongs-to sets the owner's own foreign key
    items.link("orders", "5", "4", None).await.unwrap();
    assert_eq!(items.read_by_pk("5", &none, None).await.unwrap()["OrderId"], Value::from(4));
    items.unlink("OrdersRead", "5", "4", None).await.unwrap();
    assert_eq!(items.read_by_pk("5", &none, None).await.unwrap()["OrderId"], Value::Null);

    let err = orders.link("tags", "3", "99", None).await.unwrap_err();
    assert!(matches!(err, BaseModelError::NotFound), "{err:?}");
}
