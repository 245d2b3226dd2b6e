use docstore_core::{
    row, AdapterError, ConnectOptions, DocId, Document, Filters, Query, ServiceSchema, Sort,
    SqliteDocumentAdapter, StoreAdapter, Update,
};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn connected() -> SqliteDocumentAdapter {
    let mut adapter = SqliteDocumentAdapter::new(ConnectOptions::in_memory());
    adapter
        .init(&ServiceSchema::new("posts", "blog", "posts"))
        .unwrap();
    adapter.connect().unwrap();
    adapter
}

fn seed(adapter: &SqliteDocumentAdapter) -> Vec<Document> {
    adapter
        .insert_many(vec![
            doc(json!({"title": "Hello", "content": "Post content", "votes": 3, "status": true})),
            doc(json!({"title": "Second post", "content": "Waiting for the next", "votes": 0, "status": false})),
            doc(json!({"title": "Third", "content": "Lorem ipsum", "votes": 5, "status": true, "author": {"name": "Ada Lovelace"}})),
        ])
        .unwrap()
}

fn titles(docs: &[Document]) -> Vec<&str> {
    docs.iter()
        .map(|doc| doc["title"].as_str().unwrap())
        .collect()
}

fn id_of(doc: &Document) -> DocId {
    doc["id"].clone()
}

#[test]
fn empty_table_counts_zero() {
    let adapter = connected();
    assert_eq!(adapter.count(&Filters::new()).unwrap(), 0);
    assert!(adapter.find(&Filters::new()).unwrap().is_empty());
}

#[test]
fn insert_generates_id_and_returns_stored_document() {
    let adapter = connected();

    let saved = adapter
        .insert(doc(json!({"title": "Hello", "votes": 1})))
        .unwrap();
    let id = saved["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(saved["title"], json!("Hello"));

    let loaded = adapter.find_by_id(&json!(id)).unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn insert_keeps_caller_id_and_rejects_duplicates() {
    let adapter = connected();

    let saved = adapter.insert(doc(json!({"id": 5, "title": "five"}))).unwrap();
    assert_eq!(saved["id"], json!(5));

    let err = adapter
        .insert(doc(json!({"id": 5, "title": "again"})))
        .unwrap_err();
    assert!(matches!(err, AdapterError::Write(_)));

    adapter.insert(doc(json!({"id": "5", "title": "string key"}))).unwrap();
    assert_eq!(adapter.count(&Filters::new()).unwrap(), 2);
    assert_eq!(
        adapter.find_by_id(&json!("5")).unwrap().unwrap()["title"],
        json!("string key")
    );
}

#[test]
fn insert_many_is_all_or_nothing() {
    let adapter = connected();
    adapter.insert(doc(json!({"id": "taken"}))).unwrap();

    let err = adapter
        .insert_many(vec![
            doc(json!({"id": "fresh"})),
            doc(json!({"id": "taken"})),
        ])
        .unwrap_err();
    assert!(matches!(err, AdapterError::Write(_)));
    assert!(adapter.find_by_id(&json!("fresh")).unwrap().is_none());
    assert_eq!(adapter.count(&Filters::new()).unwrap(), 1);
}

#[test]
fn find_returns_insertion_order_without_sort() {
    let adapter = connected();
    let seeded = seed(&adapter);

    assert_eq!(titles(&seeded), ["Hello", "Second post", "Third"]);
    assert_eq!(
        titles(&adapter.find(&Filters::new()).unwrap()),
        ["Hello", "Second post", "Third"]
    );
}

#[test]
fn find_sorts_and_paginates() {
    let adapter = connected();
    seed(&adapter);

    let by_votes = adapter
        .find(&Filters::new().sort(Sort::desc("votes")))
        .unwrap();
    assert_eq!(titles(&by_votes), ["Third", "Hello", "Second post"]);

    let page = adapter
        .find(&Filters::new().sort(Sort::asc("title")).limit(1).offset(1))
        .unwrap();
    assert_eq!(titles(&page), ["Second post"]);

    let skipped = adapter.find(&Filters::new().offset(2)).unwrap();
    assert_eq!(titles(&skipped), ["Third"]);

    let zero_limit = adapter.find(&Filters::new().limit(0)).unwrap();
    assert_eq!(zero_limit.len(), 3);
}

#[test]
fn find_matches_objects_and_predicates() {
    let adapter = connected();
    seed(&adapter);

    let published = adapter
        .find(&Filters::new().query(doc(json!({"status": true}))))
        .unwrap();
    assert_eq!(titles(&published), ["Hello", "Third"]);

    let nested = adapter
        .find(&Filters::new().query(doc(json!({"author": {"name": "Ada Lovelace"}}))))
        .unwrap();
    assert_eq!(titles(&nested), ["Third"]);

    let popular = adapter
        .find(&Filters::new().query(row("votes").gt(2)))
        .unwrap();
    assert_eq!(titles(&popular), ["Hello", "Third"]);

    let either = adapter
        .find(&Filters::new().query(row("votes").eq(0) | row("author.name").eq("Ada Lovelace")))
        .unwrap();
    assert_eq!(titles(&either), ["Second post", "Third"]);

    let without_author = adapter
        .find(&Filters::new().query(!row("author").has_field()))
        .unwrap();
    assert_eq!(titles(&without_author), ["Hello", "Second post"]);
}

#[test]
fn comparisons_are_type_exact() {
    let adapter = connected();
    seed(&adapter);

    let as_text = adapter
        .count(&Filters::new().query(doc(json!({"votes": "3"}))))
        .unwrap();
    assert_eq!(as_text, 0);

    let missing = adapter
        .count(&Filters::new().query(row("rating").ne(1)))
        .unwrap();
    assert_eq!(missing, 0);

    let err = adapter
        .find(&Filters::new().query(row("votes").gt(Value::Null)))
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidQuery(_)));
}

#[test]
fn search_scans_strings_case_insensitively() {
    let adapter = connected();
    seed(&adapter);

    let anywhere = adapter
        .find(&Filters::new().search("POST", Vec::<String>::new()))
        .unwrap();
    assert_eq!(titles(&anywhere), ["Hello", "Second post"]);

    let in_title = adapter
        .find(&Filters::new().search("post", ["title"]))
        .unwrap();
    assert_eq!(titles(&in_title), ["Second post"]);

    let nested = adapter
        .count(&Filters::new().search("LOVELACE", Vec::<String>::new()))
        .unwrap();
    assert_eq!(nested, 1);

    let literal_percent = adapter
        .count(&Filters::new().search("%", Vec::<String>::new()))
        .unwrap();
    assert_eq!(literal_percent, 0);
}

#[test]
fn search_keeps_leading_space_in_text() {
    let adapter = connected();
    adapter
        .insert_many(vec![
            doc(json!({"title": "repost"})),
            doc(json!({"title": "a post"})),
        ])
        .unwrap();

    let found = adapter
        .find(&Filters::new().search(" post", ["title"]))
        .unwrap();
    assert_eq!(titles(&found), ["a post"]);
}

#[test]
fn count_ignores_pagination() {
    let adapter = connected();
    seed(&adapter);

    let filters = Filters::new()
        .query(row("votes").ge(0))
        .sort(Sort::desc("votes"))
        .limit(1)
        .offset(1);
    assert_eq!(adapter.count(&filters).unwrap(), 3);
}

#[test]
fn find_one_and_find_by_ids() {
    let adapter = connected();
    let seeded = seed(&adapter);

    let found = adapter
        .find_one(&Query::from(doc(json!({"votes": 5}))))
        .unwrap()
        .unwrap();
    assert_eq!(found["title"], json!("Third"));
    assert!(adapter
        .find_one(&Query::from(doc(json!({"votes": 42}))))
        .unwrap()
        .is_none());

    let ids = vec![
        id_of(&seeded[2]),
        json!("missing"),
        id_of(&seeded[0]),
        id_of(&seeded[2]),
    ];
    let by_ids = adapter.find_by_ids(&ids).unwrap();
    assert_eq!(titles(&by_ids), ["Third", "Hello"]);
}

#[test]
fn update_by_id_merges_and_rereads() {
    let adapter = connected();
    let seeded = seed(&adapter);
    let id = id_of(&seeded[2]);

    let updated = adapter
        .update_by_id(
            &id,
            Update::try_from(doc(json!({"$set": {"title": "Third v2", "author": {"age": 36}}})))
                .unwrap(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(updated["title"], json!("Third v2"));
    assert_eq!(updated["author"], json!({"name": "Ada Lovelace", "age": 36}));
    assert_eq!(updated["votes"], json!(5));

    let voted = adapter
        .update_by_id(&id, Update::new().increment("votes", 1))
        .unwrap()
        .unwrap();
    assert_eq!(voted["votes"], json!(6));

    assert!(adapter
        .update_by_id(&json!("missing"), Update::new().set("title", "x"))
        .unwrap()
        .is_none());
}

#[test]
fn update_payload_keys_with_dots_are_literal() {
    let adapter = connected();
    let saved = adapter
        .insert(doc(json!({"title": "Dotted", "a.b": 1})))
        .unwrap();
    let id = id_of(&saved);

    let update = Update::try_from(doc(json!({"$set": {"a.b": 2}}))).unwrap();
    let updated = adapter.update_by_id(&id, update).unwrap().unwrap();
    assert_eq!(updated["a.b"], json!(2));
    assert!(!updated.contains_key("a"));

    let found = adapter
        .find(&Filters::new().query(Query::from(doc(json!({"a.b": 2})))))
        .unwrap();
    assert_eq!(titles(&found), ["Dotted"]);
}

#[test]
fn update_by_id_rejects_id_change() {
    let adapter = connected();
    let seeded = seed(&adapter);
    let id = id_of(&seeded[0]);

    let err = adapter
        .update_by_id(&id, Update::new().set("id", "other"))
        .unwrap_err();
    assert!(matches!(err, AdapterError::Write(_)));
    assert!(adapter.find_by_id(&id).unwrap().is_some());
}

#[test]
fn update_many_reports_replaced_unchanged_and_errors() {
    let adapter = connected();
    seed(&adapter);
    adapter
        .insert(doc(json!({"title": "Draft", "votes": "n/a", "status": true})))
        .unwrap();

    let summary = adapter
        .update_many(
            &Query::from(doc(json!({"status": true}))),
            Update::new().set("status", true).increment("votes", 1),
        )
        .unwrap();
    assert_eq!(summary.replaced, 2);
    assert_eq!(summary.errors, 1);
    assert!(summary.first_error.unwrap().contains("votes"));

    let summary = adapter
        .update_many(
            &Query::from(doc(json!({"status": false}))),
            Update::new().set("status", false),
        )
        .unwrap();
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.replaced, 0);

    let votes: Vec<Value> = adapter
        .find(&Filters::new().query(doc(json!({"status": true}))))
        .unwrap()
        .into_iter()
        .map(|doc| doc["votes"].clone())
        .collect();
    assert_eq!(votes, [json!(4), json!(6), json!("n/a")]);
}

#[test]
fn remove_and_clear() {
    let adapter = connected();
    let seeded = seed(&adapter);
    let id = id_of(&seeded[0]);

    let ack = adapter.remove_by_id(&id).unwrap();
    assert_eq!(Value::Object(ack), json!({"id": id.clone()}));
    assert!(adapter.find_by_id(&id).unwrap().is_none());

    let summary = adapter
        .remove_many(&Query::from(row("votes").lt(1)))
        .unwrap();
    assert_eq!(summary.deleted, 1);

    let summary = adapter.clear().unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(adapter.count(&Filters::new()).unwrap(), 0);
}

#[test]
fn operations_require_connection() {
    let mut adapter = SqliteDocumentAdapter::in_memory();
    assert!(matches!(
        adapter.find(&Filters::new()),
        Err(AdapterError::NotConnected)
    ));
    assert!(matches!(adapter.connect(), Err(AdapterError::NotInitialized)));

    adapter
        .init(&ServiceSchema::new("posts", "blog", "posts"))
        .unwrap();
    adapter.connect().unwrap();
    adapter.disconnect().unwrap();
    assert!(matches!(
        adapter.count(&Filters::new()),
        Err(AdapterError::NotConnected)
    ));
}

#[test]
fn init_requires_database_and_table() {
    let mut adapter = SqliteDocumentAdapter::in_memory();

    let mut schema = ServiceSchema::new("posts", "blog", "posts");
    schema.database = None;
    let err = adapter.init(&schema).unwrap_err();
    assert!(matches!(err, AdapterError::MissingDatabase));
    assert_eq!(
        err.to_string(),
        "Missing `database` definition in schema of service!"
    );

    let mut schema = ServiceSchema::new("posts", "blog", "posts");
    schema.table = Some("  ".to_string());
    assert!(matches!(
        adapter.init(&schema),
        Err(AdapterError::MissingTable)
    ));

    let schema = ServiceSchema::new("posts", "blog;drop", "posts");
    assert!(matches!(adapter.init(&schema), Err(AdapterError::Db(_))));
}

#[test]
fn non_scalar_keys_are_rejected() {
    let adapter = connected();
    let err = adapter.insert(doc(json!({"id": [1, 2]}))).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidKey(_)));
    assert!(matches!(
        adapter.find_by_id(&json!({"a": 1})),
        Err(AdapterError::InvalidKey(_))
    ));
}
