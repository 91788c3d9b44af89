//! End-to-end tests against the live Anthropic API.
//!
//! Gated behind `E2E_ENABLED` so they never run in CI unless asked for.
//! `ANTHROPIC_API_KEY` must be set as well.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use base64::{engine::general_purpose::STANDARD, Engine as _};
use docsheet::{
    chat, extract, extract_table, ChatContext, Column, ColumnType, Document, ExtractionConfig,
    ReviewStatus,
};

const INVOICE: &str = "\
ACME Tooling Ltd.
Invoice number: INV-2024-0117
Invoice date: 14 March 2024

Bill to: Northwind Traders, 12 Harbour Road, Leith

  Item                      Qty   Unit     Amount
  Torque wrench (large)       2   85.00    170.00
  Calibration service         1   45.50     45.50

Total due: 215.50 EUR
Payment terms: 30 days net.
";

/// Route library logs to the test output; `RUST_LOG` overrides the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsheet=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Skip unless E2E_ENABLED and an API key are both present.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
        let config = ExtractionConfig::from_env();
        if config.api_key.is_none() {
            println!("SKIP: ANTHROPIC_API_KEY is not set");
            return;
        }
        config
    }};
}

fn invoice() -> Document {
    Document::inline("invoice.txt", "text/plain", STANDARD.encode(INVOICE)).with_id("inv")
}

#[tokio::test]
async fn test_extract_invoice_total() {
    let config = e2e_skip_unless_ready!();
    let column = Column::new("Total", ColumnType::Number, "The total amount due.");

    let cell = extract(&invoice(), &column, &config)
        .await
        .expect("extraction should succeed");

    println!("{cell:?}");
    assert!(cell.value.contains("215.5"), "unexpected value: {}", cell.value);
    assert_eq!(cell.status, ReviewStatus::NeedsReview);
    assert!(cell.page >= 1);
}

#[tokio::test]
async fn test_table_then_chat() {
    let config = e2e_skip_unless_ready!();
    let documents = vec![invoice()];
    let columns = vec![
        Column::new("Vendor", ColumnType::Text, "Who issued the invoice?").with_id("vendor"),
        Column::new("Date", ColumnType::Date, "The invoice date.").with_id("date"),
    ];

    let output = extract_table(&documents, &columns, &config)
        .await
        .expect("table extraction should start");
    assert!(output.is_complete(), "failures: {:?}", output.failures);

    let vendor = output.results.get("inv", "vendor").expect("vendor cell");
    assert!(vendor.value.to_lowercase().contains("acme"));

    let context = ChatContext {
        documents: &documents,
        columns: &columns,
        results: &output.results,
    };
    let answer = chat("Which company issued the invoice?", &context, &[], &config).await;
    println!("{answer}");
    assert!(answer.to_lowercase().contains("acme"));
}
