//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `docstore_core` linkage by running a small CRUD scenario.
//! - Keep output deterministic apart from generated ids.
//!
//! Usage: `docstore_cli [data_dir]`. Without `data_dir` the store is in memory.
//! Set `DOCSTORE_LOG_DIR` (absolute) to write core logs there.

use docstore_core::{
    core_version, default_log_level, init_logging, row, ConnectOptions, Filters, FindParams,
    ServiceSchema, Sort, SqliteDocumentAdapter, StoreAdapter, StoreService,
};
use serde_json::{json, Value};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("DOCSTORE_LOG_DIR") {
        init_logging(default_log_level(), log_dir)?;
    }
    let opts = match std::env::args().nth(1) {
        Some(data_dir) => ConnectOptions::with_data_dir(data_dir),
        None => ConnectOptions::in_memory(),
    };
    println!("docstore_core version={}", core_version());

    let schema = ServiceSchema::new("posts", "smoke", "posts");
    let mut service = StoreService::new(schema, SqliteDocumentAdapter::new(opts));
    service.start()?;
    service.clear()?;

    for (title, votes, status) in [("Hello", 2, true), ("Second", 0, false), ("Third", 5, true)] {
        let created = service.create(as_document(json!({
            "title": title,
            "votes": votes,
            "status": status,
        }))?)?;
        println!("created={created}");
    }

    let by_votes = FindParams::new(Filters::new().sort(Sort::desc("votes")).limit(2))
        .fields(["title", "votes"]);
    println!("top={}", Value::Array(service.find(&by_votes)?));

    let popular = service
        .adapter()
        .count(&Filters::new().query(row("votes").gt(1)))?;
    println!("popular={popular}");

    let first = service
        .adapter()
        .find_one(&as_document(json!({"title": "Hello"}))?.into())?
        .and_then(|doc| doc.get("id").cloned())
        .ok_or("smoke document `Hello` is missing")?;
    let updated = service.update(&first, as_document(json!({"votes": 3}))?)?;
    println!("updated={updated}");

    println!("removed={}", service.remove(&first)?);
    println!("remaining={}", service.count(&FindParams::default())?);

    service.stop()?;
    Ok(())
}

fn as_document(value: Value) -> Result<docstore_core::Document, Box<dyn Error>> {
    match value {
        Value::Object(doc) => Ok(doc),
        other => Err(format!("expected a JSON object, got {other}").into()),
    }
}
