//! End-to-end scenarios against a real collection engine.

use docket_document::{DataType, Document, FacetSettings, ID_FIELD, Value};
use docket_index::{CollectionEngine, IndexSettings, SearchCriteria};
use tempfile::TempDir;
use uuid::Uuid;

/// Opens a fresh engine in a temp dir.
fn open(temp: &TempDir) -> CollectionEngine {
    CollectionEngine::open(temp.path().join("books"), "books", IndexSettings::default()).unwrap()
}

/// The hitchhiker fixture from the product examples.
fn hitchhiker() -> serde_json::Value {
    serde_json::json!({
        "Title": "The Hitchhiker's Guide to the Galaxy",
        "Author": "Douglas Adams",
        "Rating": 10,
        "PublishDate": "1979-10-12T12:00:00Z",
    })
}

#[tokio::test]
async fn insert_and_search_with_sort_and_top_n() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let first = engine.insert_json(hitchhiker()).await.unwrap();
    let second = engine.insert_json(hitchhiker()).await.unwrap();
    assert_ne!(first, second);
    engine.refresh().unwrap();

    let criteria = SearchCriteria::for_query("Author:Douglas")
        .sorted_by("-Title")
        .top(1);
    let result = engine.search(&criteria).await.unwrap();

    assert_eq!(result.total_hits, 2);
    assert_eq!(result.item_count, 1);
    assert_eq!(result.items.len(), 1);

    let id = Uuid::parse_str(&result.items[0].id).unwrap();
    let doc = engine
        .select(id, &["Title".to_string()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        doc.get("Title").and_then(Value::as_text),
        Some("The Hitchhiker's Guide to the Galaxy")
    );

    engine.close().await.unwrap();
}

#[tokio::test]
async fn type_conflicts_drop_the_value_but_not_the_insert() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    engine
        .insert_json(serde_json::json!({"Rating": 10}))
        .await
        .unwrap();
    // The conflicting insert itself succeeds.
    engine
        .insert_json(serde_json::json!({"Rating": "ten"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    // Both documents exist, but only one has an indexed Rating.
    assert_eq!(engine.count("*").await.unwrap(), 2);
    assert_eq!(engine.count("Rating:[1 TO 100]").await.unwrap(), 1);

    // The schema kept its original type.
    let fields = engine.schema();
    let rating = fields.iter().find(|f| f.name == "Rating").unwrap();
    assert_eq!(rating.data_type, DataType::Number);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn hierarchical_facets_drill_down_and_sideways() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);
    engine
        .configure_facet("Category", FacetSettings::hierarchical("Category"))
        .unwrap();
    engine
        .configure_facet("Author", FacetSettings::new("Author"))
        .unwrap();

    for (category, author) in [
        ("Books/Fiction/Comedy", "Adams"),
        ("Books/Fiction/Drama", "Chekhov"),
        ("Books/Non-Fiction/History", "Gibbon"),
    ] {
        engine
            .insert_json(serde_json::json!({"Category": category, "Author": author}))
            .await
            .unwrap();
    }
    engine.refresh().unwrap();

    // Undrilled counts first.
    let plain = engine
        .search(&SearchCriteria::default().with_facets(5))
        .await
        .unwrap();
    let category = plain.facets.iter().find(|f| f.name == "Category").unwrap();
    assert_eq!(category.child("Books").unwrap().count, 3);
    let author = plain.facets.iter().find(|f| f.name == "Author").unwrap();
    assert_eq!(author.count, 3);

    // Drill into Books/Fiction.
    let drilled = engine
        .search(
            &SearchCriteria::default()
                .with_facets(5)
                .drill("Category:Books/Fiction"),
        )
        .await
        .unwrap();

    assert_eq!(drilled.total_hits, 2);

    let category = drilled.facets.iter().find(|f| f.name == "Category").unwrap();
    let fiction = category
        .child("Books")
        .unwrap()
        .child("Fiction")
        .unwrap();
    assert_eq!(fiction.count, 2);
    assert_eq!(fiction.child("Comedy").unwrap().count, 1);
    assert_eq!(fiction.child("Drama").unwrap().count, 1);

    // Drill-sideways: the other facet's counts are unaffected by the drill.
    let author = drilled.facets.iter().find(|f| f.name == "Author").unwrap();
    assert_eq!(author.count, 3);
    assert_eq!(author.child("Gibbon").unwrap().count, 1);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn drill_filters_split_on_the_facet_configured_separator() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let mut settings = FacetSettings::hierarchical("Category");
    settings.hierarchy_separator = ">".to_string();
    engine.configure_facet("Category", settings).unwrap();

    for category in ["Books>Fiction>Comedy", "Books>Fiction>Drama", "Books>History"] {
        engine
            .insert_json(serde_json::json!({"Category": category}))
            .await
            .unwrap();
    }
    engine.refresh().unwrap();

    let drilled = engine
        .search(
            &SearchCriteria::default()
                .with_facets(5)
                .drill("Category:Books>Fiction"),
        )
        .await
        .unwrap();

    assert_eq!(drilled.total_hits, 2);
    let category = drilled.facets.iter().find(|f| f.name == "Category").unwrap();
    let fiction = category.child("Books").unwrap().child("Fiction").unwrap();
    assert_eq!(fiction.count, 2);
    assert_eq!(fiction.child("Comedy").unwrap().count, 1);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn facet_leaf_counts_never_exceed_the_selection() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);
    engine
        .configure_facet("Category", FacetSettings::hierarchical("Category"))
        .unwrap();

    for category in ["A/x", "A/y", "B/z"] {
        engine
            .insert_json(serde_json::json!({"Category": category}))
            .await
            .unwrap();
    }
    // One document without the facet at all.
    engine
        .insert_json(serde_json::json!({"Other": 1}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::default().with_facets(10))
        .await
        .unwrap();
    let category = result.facets.iter().find(|f| f.name == "Category").unwrap();
    let leaf_sum: u64 = category.values.iter().map(|v| v.count).sum();
    assert!(leaf_sum <= result.total_hits as u64);
    // Every faceted document has exactly one Category value.
    assert_eq!(leaf_sum, 3);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn unknown_facet_filter_fails_the_query() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);
    engine
        .insert_json(serde_json::json!({"Title": "x"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let err = engine
        .search(
            &SearchCriteria::default()
                .with_facets(5)
                .drill("Nope:Books"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown facet"));

    engine.close().await.unwrap();
}

#[tokio::test]
async fn null_sentinel_finds_explicit_nulls_only() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let with_null = engine
        .insert_json(serde_json::json!({"X": null}))
        .await
        .unwrap();
    engine
        .insert_json(serde_json::json!({"X": "present"}))
        .await
        .unwrap();
    // A document without X at all is not an explicit null.
    engine
        .insert_json(serde_json::json!({"Y": 1}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::for_query("X:_null_"))
        .await
        .unwrap();
    assert_eq!(result.total_hits, 1);
    assert_eq!(result.items[0].id, with_null.as_hyphenated().to_string());

    engine.close().await.unwrap();
}

#[tokio::test]
async fn ascending_sort_places_missing_values_last() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let cheap = engine
        .insert_json(serde_json::json!({"Title": "cheap", "Price": 5}))
        .await
        .unwrap();
    let dear = engine
        .insert_json(serde_json::json!({"Title": "dear", "Price": 50}))
        .await
        .unwrap();
    let unpriced = engine
        .insert_json(serde_json::json!({"Title": "unpriced"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::for_query("*").sorted_by("Price:asc"))
        .await
        .unwrap();
    let ids: Vec<String> = result.items.iter().map(|h| h.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            cheap.as_hyphenated().to_string(),
            dear.as_hyphenated().to_string(),
            unpriced.as_hyphenated().to_string(),
        ]
    );

    // Descending flips the present values and leads with the missing one.
    let result = engine
        .search(&SearchCriteria::for_query("*").sorted_by("Price:desc"))
        .await
        .unwrap();
    let ids: Vec<String> = result.items.iter().map(|h| h.id.clone()).collect();
    assert_eq!(ids[0], unpriced.as_hyphenated().to_string());
    assert_eq!(ids[1], dear.as_hyphenated().to_string());
    assert_eq!(ids[2], cheap.as_hyphenated().to_string());

    engine.close().await.unwrap();
}

#[tokio::test]
async fn sorting_by_unknown_field_fails() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);
    engine
        .insert_json(serde_json::json!({"Title": "x"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let err = engine
        .search(&SearchCriteria::for_query("*").sorted_by("Nope:asc"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown sort field"));

    engine.close().await.unwrap();
}

#[tokio::test]
async fn highlight_marks_query_terms_in_fragments() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let description = format!(
        "{} A weary hitchhiker wandered far across the galaxy, {}",
        "Opening filler that says nothing of note but pads the text out. ".repeat(3),
        "and the rest of the story goes on for quite a while after that."
    );
    engine
        .insert_json(serde_json::json!({"Description": description}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::for_query("hitchhiker AND galaxy").highlighted())
        .await
        .unwrap();
    assert_eq!(result.total_hits, 1);
    let highlight = result.items[0].highlight.as_deref().unwrap();
    assert!(highlight.contains("<b>hitchhiker</b>"), "got: {highlight}");
    assert!(highlight.contains("<b>galaxy</b>"), "got: {highlight}");

    engine.close().await.unwrap();
}

#[tokio::test]
async fn pagination_pages_concatenate_to_the_full_prefix() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    for i in 0..7 {
        engine
            .insert_json(serde_json::json!({"Seq": i, "Body": "common"}))
            .await
            .unwrap();
    }
    engine.refresh().unwrap();

    let mut paged = Vec::new();
    for page in 1..=4 {
        let result = engine
            .search(
                &SearchCriteria::for_query("Body:common")
                    .sorted_by("Seq:asc")
                    .page(2, page),
            )
            .await
            .unwrap();
        assert_eq!(result.page_count, 4);
        paged.extend(result.items.into_iter().map(|h| h.id));
    }

    let all = engine
        .search(
            &SearchCriteria::for_query("Body:common")
                .sorted_by("Seq:asc")
                .top(8)
                .page(8, 1),
        )
        .await
        .unwrap();
    let all_ids: Vec<String> = all.items.into_iter().map(|h| h.id).collect();

    assert_eq!(paged, all_ids);
    assert_eq!(paged.len(), 7);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn selected_fields_round_trip_modulo_coercions() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let id = engine
        .insert_json(serde_json::json!({
            "Title": "Mostly Harmless",
            "Rating": 9.5,
            "InPrint": true,
            "PublishDate": "1979-10-12T12:00:00Z",
            "Tags": ["scifi", "comedy"],
        }))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let doc = engine
        .select(id, &["*".to_string()])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(doc.id(), Some(id));
    assert_eq!(
        doc.get("Title").and_then(Value::as_text),
        Some("Mostly Harmless")
    );
    assert_eq!(doc.get("Rating").and_then(Value::as_number), Some(9.5));
    assert_eq!(doc.get("InPrint"), Some(&Value::Bool(true)));
    let expected_date = docket_document::parse_datetime("1979-10-12T12:00:00Z").unwrap();
    assert_eq!(doc.get("PublishDate"), Some(&Value::DateTime(expected_date)));
    match doc.get("Tags") {
        Some(Value::Array(tags)) => {
            let mut tags: Vec<&str> = tags.iter().filter_map(Value::as_text).collect();
            tags.sort_unstable();
            assert_eq!(tags, vec!["comedy", "scifi"]);
        }
        other => panic!("expected Tags array, got {other:?}"),
    }
    // Write stamps came back as timestamps.
    assert!(matches!(
        doc.get("_createdTimestamp"),
        Some(Value::DateTime(_))
    ));

    engine.close().await.unwrap();
}

#[tokio::test]
async fn search_projects_selected_fields_onto_hits() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    engine.insert_json(hitchhiker()).await.unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::for_query("Author:Douglas").select(&["Title", "Rating"]))
        .await
        .unwrap();
    let document = result.items[0].document.as_ref().unwrap();
    assert_eq!(
        document["Title"],
        serde_json::json!("The Hitchhiker's Guide to the Galaxy")
    );
    assert_eq!(document["Rating"], serde_json::json!(10.0));

    engine.close().await.unwrap();
}

#[tokio::test]
async fn selecting_object_fields_is_rejected() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let id = engine
        .insert_json(serde_json::json!({"Address": {"City": "Reykjavik"}}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let err = engine
        .select(id, &["Address".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("object"));

    // The nested leaf itself projects fine.
    let doc = engine
        .select(id, &["Address.City".to_string()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        doc.get("Address.City").and_then(Value::as_text),
        Some("Reykjavik")
    );

    engine.close().await.unwrap();
}

#[tokio::test]
async fn range_and_date_queries_agree_with_the_data() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    engine.insert_json(hitchhiker()).await.unwrap();
    engine
        .insert_json(serde_json::json!({
            "Title": "A much later book",
            "Rating": 3,
            "PublishDate": "2001-05-01T00:00:00Z",
        }))
        .await
        .unwrap();
    engine.refresh().unwrap();

    assert_eq!(engine.count("Rating:[5 TO *]").await.unwrap(), 1);
    assert_eq!(engine.count("Rating:{3 TO 10}").await.unwrap(), 0);
    assert_eq!(engine.count("Rating:[3 TO 10]").await.unwrap(), 2);
    assert_eq!(
        engine
            .count("PublishDate:[1979-01-01 TO 1980-01-01]")
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        engine.count("PublishDate:[* TO 2020-01-01]").await.unwrap(),
        2
    );

    engine.close().await.unwrap();
}

#[tokio::test]
async fn text_sort_compares_case_insensitively() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let mut ids = Vec::new();
    for title in ["cherry", "Banana", "apple"] {
        ids.push(
            engine
                .insert_json(serde_json::json!({"Title": title}))
                .await
                .unwrap(),
        );
    }
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::for_query("*").sorted_by("Title:asc"))
        .await
        .unwrap();
    let ordered: Vec<String> = result.items.iter().map(|h| h.id.clone()).collect();
    // The sort column is lowercased, so "Banana" lands between the others.
    assert_eq!(
        ordered,
        vec![
            ids[2].as_hyphenated().to_string(),
            ids[1].as_hyphenated().to_string(),
            ids[0].as_hyphenated().to_string(),
        ]
    );

    engine.close().await.unwrap();
}

#[tokio::test]
async fn boolean_and_guid_terms_match_exactly() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let publisher = "6f1c43b2-9e5d-4a7e-8f13-0a2b3c4d5e6f";
    engine
        .insert_json(serde_json::json!({"InPrint": true, "Publisher": publisher}))
        .await
        .unwrap();
    engine
        .insert_json(serde_json::json!({"InPrint": false}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    assert_eq!(engine.count("InPrint:true").await.unwrap(), 1);
    assert_eq!(engine.count("InPrint:false").await.unwrap(), 1);
    // Guid matching is case-insensitive via lowercasing.
    assert_eq!(
        engine
            .count(&format!("Publisher:{}", publisher.to_uppercase()))
            .await
            .unwrap(),
        1
    );

    engine.close().await.unwrap();
}

#[tokio::test]
async fn auto_facet_dates_default_to_hierarchical_day_paths() {
    let temp = TempDir::new().unwrap();
    let engine = CollectionEngine::open(
        temp.path().join("books"),
        "books",
        IndexSettings::default().with_auto_facet(),
    )
    .unwrap();

    engine
        .insert_json(serde_json::json!({"PublishDate": "1979-10-12T12:00:00Z"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    let result = engine
        .search(&SearchCriteria::default().with_facets(5))
        .await
        .unwrap();
    let date_facet = result
        .facets
        .iter()
        .find(|f| f.name == "PublishDate")
        .unwrap();
    // yyyy/MMM/dd: the first hierarchy level is the year.
    assert_eq!(date_facet.child("1979").unwrap().count, 1);

    // Drilling into the year reveals the month level.
    let drilled = engine
        .search(
            &SearchCriteria::default()
                .with_facets(5)
                .drill("PublishDate:1979"),
        )
        .await
        .unwrap();
    assert_eq!(drilled.total_hits, 1);
    let date_facet = drilled
        .facets
        .iter()
        .find(|f| f.name == "PublishDate")
        .unwrap();
    let year = date_facet.child("1979").unwrap();
    assert_eq!(year.child("Oct").unwrap().count, 1);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn queries_on_unknown_fields_fail() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);
    engine
        .insert_json(serde_json::json!({"Title": "x"}))
        .await
        .unwrap();
    engine.refresh().unwrap();

    assert!(engine.count("Missing:1").await.unwrap_err().to_string().contains("unknown field"));
    assert!(engine.count("Rating~2").await.is_ok()); // full-text fuzzy is fine
    assert!(engine.count("Title:ok~1").await.is_ok());

    engine.close().await.unwrap();
}

#[tokio::test]
async fn update_keeps_ids_stable_and_last_write_wins() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    let id = engine
        .insert_json(serde_json::json!({"Title": "first version"}))
        .await
        .unwrap();

    for version in ["second version", "third version"] {
        let mut doc = Document::from_json(serde_json::json!({"Title": version})).unwrap();
        doc.set(ID_FIELD, Value::Guid(id));
        engine.update(doc).await.unwrap();
    }
    engine.refresh().unwrap();

    assert_eq!(engine.count("*").await.unwrap(), 1);
    assert_eq!(engine.count("Title:third").await.unwrap(), 1);
    assert_eq!(engine.count("Title:first").await.unwrap(), 0);

    engine.close().await.unwrap();
}

#[tokio::test]
async fn nested_fields_are_searchable_by_dotted_name() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp);

    engine
        .insert_json(serde_json::json!({
            "Title": "x",
            "Publisher": {"Name": "Megadodo", "Founded": 1978},
        }))
        .await
        .unwrap();
    engine.refresh().unwrap();

    assert_eq!(engine.count("Publisher.Name:megadodo").await.unwrap(), 1);
    assert_eq!(
        engine.count("Publisher.Founded:[1900 TO 2000]").await.unwrap(),
        1
    );

    engine.close().await.unwrap();
}
