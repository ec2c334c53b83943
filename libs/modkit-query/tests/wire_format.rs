//! JSON wire form of specifications.

use modkit_query::{Error, QueryConfig, QueryEntity, QuerySpecification, SortType};
use serde_json::json;

#[derive(Clone, Debug, Default, PartialEq, QueryEntity)]
struct Ticket {
    id: i64,
    title: String,
    priority: i32,
    assignee: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, QueryEntity)]
struct TicketSummary {
    id: i64,
    headline: String,
}

fn tickets() -> Vec<Ticket> {
    vec![
        Ticket {
            id: 1,
            title: "Login fails".to_owned(),
            priority: 1,
            assignee: Some("ann".to_owned()),
        },
        Ticket {
            id: 2,
            title: "Logo blurry".to_owned(),
            priority: 3,
            assignee: None,
        },
        Ticket {
            id: 3,
            title: "Slow search".to_owned(),
            priority: 2,
            assignee: Some("bo".to_owned()),
        },
    ]
}

#[test]
fn serializes_every_section() {
    let mut spec = QuerySpecification::<Ticket, TicketSummary>::new();
    spec.filters_mut().add_text("Priority <= 2").unwrap();
    spec.sorts_mut()
        .add("Priority", SortType::OrderByDescending)
        .unwrap()
        .add("Id", SortType::OrderBy)
        .unwrap();
    spec.searches_mut().add("Title", "Log%").unwrap();
    spec.projections_mut()
        .add("Id")
        .unwrap()
        .add_mapped("Title", "Headline")
        .unwrap();
    spec.as_split_query().set_page(1, 25);

    assert_eq!(
        serde_json::to_value(&spec).unwrap(),
        json!({
            "Filters": [{ "Filter": "(Priority <= 2)" }],
            "Sorts": [
                { "OrderItem": "Priority", "OrderType": 1 },
                { "OrderItem": "Id", "OrderType": 2 }
            ],
            "Searches": [{ "SearchItem": "Title", "SearchTerm": "Log%", "SearchGroup": 1 }],
            "Projections": [
                { "Assignor": "Id", "Assignee": "Id" },
                { "Assignor": "Title", "Assignee": "Headline" }
            ],
            "AsNoTracking": false,
            "AsSplitQuery": true,
            "IgnoreAutoIncludes": false,
            "IgnoreQueryFilters": false,
            "Skip": 0,
            "Take": 25
        })
    );
}

#[test]
fn round_trip_preserves_behavior() {
    let mut spec = QuerySpecification::<Ticket, TicketSummary>::new();
    spec.filters_mut().add_text("Assignee != null | Priority > 2").unwrap();
    spec.sorts_mut().add("Title", SortType::OrderBy).unwrap();
    spec.projections_mut().add_mapped("Title", "Headline").unwrap();
    spec.ignore_auto_includes();

    let text = serde_json::to_string(&spec).unwrap();
    let decoded: QuerySpecification<Ticket, TicketSummary> = serde_json::from_str(&text).unwrap();

    assert_eq!(decoded.to_wire(), spec.to_wire());
    assert!(decoded.filters().iter().zip(spec.filters()).all(|(a, b)| a.structural_equals(b)));
    assert_eq!(decoded.materialize(tickets()), spec.materialize(tickets()));
    assert!(decoded.flags().ignore_auto_includes);
}

#[test]
fn missing_sections_take_defaults() {
    let spec = QuerySpecification::<Ticket>::from_json(
        json!({ "Sorts": [{ "OrderItem": "priority", "OrderType": 0 }] }),
        QueryConfig::default(),
    )
    .unwrap();

    assert!(spec.filters().is_empty());
    assert_eq!(spec.skip(), None);
    assert_eq!(spec.take(), None);
    let ids: Vec<i64> = spec.materialize(tickets()).iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 3, 2]);
}

#[test]
fn search_group_defaults_to_one() {
    let spec = QuerySpecification::<Ticket>::from_json(
        json!({ "Searches": [{ "SearchItem": "Title", "SearchTerm": "%search" }] }),
        QueryConfig::default(),
    )
    .unwrap();
    assert_eq!(spec.searches().iter().next().unwrap().group(), 1);
}

#[test]
fn rejects_bad_input() {
    let err = QuerySpecification::<Ticket>::from_json(
        json!({ "Filters": [{ "Filter": "Priority >" }] }),
        QueryConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidFilter(_)), "{err}");

    let err = QuerySpecification::<Ticket>::from_json(
        json!({ "Sorts": [{ "OrderItem": "Severity", "OrderType": 0 }] }),
        QueryConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::FieldNotFound { .. }), "{err}");

    let err = QuerySpecification::<Ticket>::from_json(
        json!({ "Sorts": [{ "OrderItem": "Id", "OrderType": 9 }] }),
        QueryConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");

    let err = QuerySpecification::<Ticket>::from_json(
        json!({ "Projections": [{ "Assignor": "Title", "Assignee": "Title" }] }),
        QueryConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

#[test]
fn filter_length_limit_comes_from_config() {
    let config = QueryConfig {
        max_filter_length: 12,
        ..QueryConfig::default()
    };
    let wire = json!({ "Filters": [{ "Filter": "Priority == 1 | Priority == 2" }] });

    let err = QuerySpecification::<Ticket>::from_json(wire.clone(), config).unwrap_err();
    assert!(matches!(err, Error::InvalidFilter(_)), "{err}");
    assert!(QuerySpecification::<Ticket>::from_json(wire, QueryConfig::default()).is_ok());
}
