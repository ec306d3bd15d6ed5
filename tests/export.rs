#![cfg(feature = "rusqlite")]

use basemodel::core::Value;
use basemodel::{QueryArgs, QueryConfig};
use common::{row, setup_with, tables};

mod common;

fn config() -> QueryConfig {
    QueryConfig {
        export_page_size: 2,
        export_timeout_ms: 60_000,
        ..Default::default()
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn export_flattens_relations_to_their_titles() {
    let fx = setup_with(config(), tables()).await;
    let orders = fx.context.model("orders").unwrap();

    let wanted = fields(&[
        "Title",
        "Status",
        "CustomersRead",
        "ItemsList",
        "TagsMMList",
        "CustomerEmail",
        "ItemCount",
        "NotAColumn",
    ]);
    let export = orders
        .export_csv(&QueryArgs::new(), Some(&wanted), None)
        .await
        .unwrap();
    assert_eq!(export.offset, None);

    let lines: Vec<&str> = export.data.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Title,Status,CustomersRead,ItemsList,TagsMMList,CustomerEmail,ItemCount",
            "Order 1,open,Ada,\"pen,ink,pad\",\"urgent,gift\",ada@example.com,3",
            "Order 2,open,Bob,pen,urgent,bob@example.com,1",
            "Order 3,closed,Ada,,,ada@example.com,0",
            "Order 4,closed,,,,,0",
            "Order 5,open,Bob,cap,,bob@example.com,1",
        ]
    );
}

#[tokio::test]
async fn export_resumes_from_the_returned_offset() {
    let fx = setup_with(config(), tables()).await;
    let orders = fx.context.model("orders").unwrap();
    let wanted = fields(&["Id", "Title"]);

    let full = orders
        .export_csv(&QueryArgs::new(), Some(&wanted), None)
        .await
        .unwrap();
    let full_lines: Vec<&str> = full.data.lines().collect();
    assert_eq!(full_lines.len(), 6);

    let tail = orders
        .export_csv(&QueryArgs::new().with("offset", 3), Some(&wanted), None)
        .await
        .unwrap();
    assert_eq!(tail.offset, None);
    let tail_lines: Vec<&str> = tail.data.lines().collect();
    assert_eq!(tail_lines[0], "Id,Title");
    assert_eq!(tail_lines[1..], full_lines[4..]);

    // a spent budget returns the same offset to retry from
    let stalled = QueryConfig {
        export_timeout_ms: 0,
        ..config()
    };
    let fx = setup_with(stalled, tables()).await;
    let orders = fx.context.model("orders").unwrap();
    let none = orders
        .export_csv(&QueryArgs::new().with("offset", 2), Some(&wanted), None)
        .await
        .unwrap();
    assert_eq!(none.offset, Some(2));
    assert_eq!(none.data.lines().collect::<Vec<_>>(), vec!["Id,Title"]);
}

#[tokio::test]
async fn export_honours_filters_and_escapes_formulas() {
    let fx = setup_with(config(), tables()).await;
    let orders = fx.context.model("orders").unwrap();
    orders
        .insert(&row([("Title", Value::from("=SUM(A1)")), ("Status", Value::from("open"))]), None)
        .await
        .unwrap();

    let args = QueryArgs::new()
        .with("where", "(Status,eq,open)")
        .with("sort", "-Id");
    let export = orders
        .export_csv(&args, Some(&fields(&["Title"])), None)
        .await
        .unwrap();
    let lines: Vec<&str> = export.data.lines().collect();
    assert_eq!(
        lines,
        vec!["Title", "'=SUM(A1)", "Order 5", "Order 2", "Order 1"]
    );
}
