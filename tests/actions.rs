mod common;

use axum::http::StatusCode;
use common::Input;
use pretty_assertions::assert_eq;
use resource_actions::{
    ActionError, AuthBundle, ColumnsToReturn, FieldSpec, Output, Record, ResourceSpec, Store,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn project_spec() -> ResourceSpec {
    ResourceSpec::new("Project")
        .field(FieldSpec::new("id").type_name("Number").lookup_field())
        .field(FieldSpec::new("name").type_name("String"))
        .field(FieldSpec::new("profile_id").type_name("Number"))
        .field(FieldSpec::new("is_live").type_name("Boolean").default_value(false))
}

fn owned_project_spec() -> ResourceSpec {
    project_spec().owner_creds(["profile_id => profile_ids"])
}

fn profiles(ids: &[i64]) -> AuthBundle {
    AuthBundle::new().claim("profile_ids", json!(ids))
}

fn keys(record: &Record) -> Vec<&str> {
    record.attributes.keys().map(String::as_str).collect()
}

fn names(records: &[Record]) -> Vec<Value> {
    records.iter().map(|r| r.get("name").cloned().unwrap_or(Value::Null)).collect()
}

#[tokio::test]
async fn unknown_model_is_rejected_by_every_action() {
    let actions = common::actions().await;
    let spec = ResourceSpec::new("Nope").field(FieldSpec::new("id").lookup_field());
    let input = Input::new().field("id", 1);

    for _ in 0..2 {
        let errors = vec![
            actions.get_item(&spec, &input).await.err(),
            actions.get_items(&spec, &input).await.err(),
            actions.create_item(&spec, &input).await.err(),
            actions.update_item(&spec, &input).await.err(),
            actions.upsert_item(&spec, &input).await.err(),
            actions.delete_item(&spec, &input).await.err(),
        ];
        for err in errors {
            let err = err.expect("action should reject");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.to_string(), r#"The model "Nope" is not recognized"#);
        }
    }
}

#[tokio::test]
async fn missing_required_fields_are_rejected_by_every_action() {
    let actions = common::actions().await;
    let spec = ResourceSpec::new("Project")
        .field(FieldSpec::new("id").lookup_field())
        .field(FieldSpec::new("name").required());
    let input = Input::new().field("id", 1);

    for _ in 0..2 {
        let errors = vec![
            actions.get_item(&spec, &input).await.err(),
            actions.get_items(&spec, &input).await.err(),
            actions.create_item(&spec, &input).await.err(),
            actions.update_item(&spec, &input).await.err(),
            actions.upsert_item(&spec, &input).await.err(),
            actions.delete_item(&spec, &input).await.err(),
        ];
        for err in errors {
            let err = err.expect("action should reject");
            assert!(matches!(err, ActionError::MissingFields(_)));
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.to_string(), r#"Missing required field: "name""#);
        }
    }
    assert_eq!(actions.store().rows("Project").await.len(), 10);
}

#[tokio::test]
async fn unmatched_owner_creds_are_forbidden() {
    let actions = common::actions().await;
    let spec = owned_project_spec();
    let input = Input::new()
        .field("id", 1)
        .field("name", "Hijacked")
        .auth_bundle(profiles(&[2]));

    let errors = vec![
        actions.get_item(&spec, &input).await.err(),
        actions.get_items(&spec, &input).await.err(),
        actions.create_item(&spec, &input).await.err(),
        actions.update_item(&spec, &input).await.err(),
        actions.upsert_item(&spec, &input).await.err(),
        actions.delete_item(&spec, &input).await.err(),
    ];
    for err in errors {
        let err = err.expect("action should reject");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "You are not authorized to perform this action");
    }

    let rows = actions.store().rows("Project").await;
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].get("name"), Some(&json!("Project 01")));
}

#[tokio::test]
async fn create_applies_defaults_and_authorizes_on_input() {
    let actions = common::actions().await;
    let input = Input::new()
        .field("name", "Project 11")
        .field("profile_id", 1)
        .field("owner", "ignored")
        .auth_bundle(profiles(&[1]));

    let created = actions.create_item(&owned_project_spec(), &input).await.unwrap();
    assert_eq!(created.get("id"), Some(&json!(11)));
    assert_eq!(created.get("is_live"), Some(&json!(false)));
    assert_eq!(created.get("owner"), None);
    assert!(created.get("created_at").is_some());
    assert_eq!(actions.store().rows("Project").await.len(), 11);
}

#[tokio::test]
async fn upsert_creates_then_updates() {
    let actions = common::actions().await;
    let spec = ResourceSpec::new("Role")
        .field(FieldSpec::new("name").required().lookup_field())
        .field(FieldSpec::new("description"));

    let created = actions
        .upsert_item(&spec, &Input::new().field("name", "auditor").field("description", "reads"))
        .await
        .unwrap();
    assert_eq!(created.get("id"), Some(&json!(4)));
    assert_eq!(created.get("name"), Some(&json!("auditor")));

    let updated = actions
        .upsert_item(&spec, &Input::new().field("name", "auditor").field("description", "reads all"))
        .await
        .unwrap();
    assert_eq!(updated.get("id"), Some(&json!(4)));
    assert_eq!(updated.get("description"), Some(&json!("reads all")));
    assert_eq!(actions.store().rows("Role").await.len(), 4);
}

#[tokio::test]
async fn upsert_and_update_require_a_lookup_field() {
    let actions = common::actions().await;
    let input = Input::new().field("name", "No id");
    for err in [
        actions.upsert_item(&project_spec(), &input).await.unwrap_err(),
        actions.update_item(&project_spec(), &input).await.unwrap_err(),
    ] {
        assert!(matches!(err, ActionError::LookupFieldNotProvided));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn update_targets_existing_rows_only() {
    let actions = common::actions().await;

    let err = actions
        .update_item(&project_spec(), &Input::new().field("id", 99).field("name", "Ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), r#"The requested "Project" was not found"#);

    // profile_id only comes from the stored row.
    let input = Input::new()
        .field("id", 8)
        .field("name", "Renamed")
        .auth_bundle(profiles(&[2]));
    let updated = actions.update_item(&owned_project_spec(), &input).await.unwrap();
    assert_eq!(updated.get("id"), Some(&json!(8)));
    assert_eq!(updated.get("name"), Some(&json!("Renamed")));
    assert_eq!(updated.get("is_live"), Some(&json!(true)));
}

#[tokio::test]
async fn delete_reports_rows_and_not_found() {
    let actions = common::actions().await;
    let spec = project_spec();

    let err = actions.delete_item(&spec, &Input::new().field("id", 99)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let removed = actions.delete_item(&spec, &Input::new().field("id", 10)).await.unwrap();
    assert_eq!(removed, 1);
    let err = actions.get_item(&spec, &Input::new().field("id", 10)).await.unwrap_err();
    assert!(matches!(err, ActionError::ResourceNotFound(_)));
}

#[tokio::test]
async fn delete_authorizes_against_the_looked_up_row() {
    let actions = common::actions().await;
    let spec = owned_project_spec();

    let err = actions
        .delete_item(&spec, &Input::new().field("id", 9).auth_bundle(profiles(&[1])))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let removed = actions
        .delete_item(&spec, &Input::new().field("id", 2).auth_bundle(profiles(&[1])))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(actions.store().rows("Project").await.len(), 9);
}

#[tokio::test]
async fn get_item_honours_bare_owner_rule() {
    let actions = common::actions().await;
    let spec = ResourceSpec::new("Profile")
        .field(FieldSpec::new("id"))
        .field(FieldSpec::new("user_id"))
        .owner_creds(["user_id"]);

    let profile = actions
        .get_item(
            &spec,
            &Input::new()
                .field("id", 1)
                .field("user_id", 2)
                .auth_bundle(AuthBundle::new().claim("user_id", 2)),
        )
        .await
        .unwrap();
    assert_eq!(profile.get("slug"), Some(&json!("ada")));

    let err = actions
        .get_item(
            &spec,
            &Input::new()
                .field("id", 1)
                .field("user_id", 2)
                .auth_bundle(AuthBundle::new().claim("user_id", 3)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn column_projection() {
    let actions = common::actions().await;
    let input = Input::new().field("id", 1);
    let all = vec![
        "created_at", "id", "is_live", "name", "profile_id", "updated_at",
    ];

    let record = actions.get_item(&project_spec(), &input).await.unwrap();
    assert_eq!(keys(&record), all);

    let empty = project_spec().columns_to_return(ColumnsToReturn::List(vec![]));
    let record = actions.get_item(&empty, &input).await.unwrap();
    assert_eq!(keys(&record), all);

    let listed = project_spec().columns_to_return(ColumnsToReturn::List(vec!["id".into(), "name".into()]));
    let record = actions.get_item(&listed, &input.clone().column_set("ignored")).await.unwrap();
    assert_eq!(keys(&record), vec!["id", "name"]);

    let mut sets = BTreeMap::new();
    sets.insert("list".to_string(), vec!["id".to_string()]);
    let no_default = project_spec().columns_to_return(ColumnsToReturn::Sets(sets.clone()));
    let record = actions.get_item(&no_default, &input.clone().column_set("list")).await.unwrap();
    assert_eq!(keys(&record), vec!["id"]);
    let record = actions.get_item(&no_default, &input.clone().column_set("unknown")).await.unwrap();
    assert_eq!(keys(&record), all);

    sets.insert("default".to_string(), vec!["id".to_string(), "name".to_string()]);
    let with_default = project_spec().columns_to_return(ColumnsToReturn::Sets(sets));
    let record = actions.get_item(&with_default, &input.clone().column_set("unknown")).await.unwrap();
    assert_eq!(keys(&record), vec!["id", "name"]);
    let records = actions.get_items(&with_default, &Input::new()).await.unwrap();
    assert!(records.iter().all(|r| keys(r) == vec!["id", "name"]));
}

#[tokio::test]
async fn relations_and_load_direct_merge() {
    let actions = common::actions().await;
    let input = Input::new()
        .field("id", 1)
        .relations(["profile"])
        .load_direct(["profile:slug", "codingLanguageTags:label"]);

    let record = actions.get_item(&project_spec(), &input).await.unwrap();
    let body = serde_json::to_value(&record).unwrap();
    assert_eq!(body["profile"], json!("ada"));
    assert_eq!(body["coding_language_tags"], json!(["rust", "go"]));
    assert_eq!(body["relations"]["profile"]["slug"], json!("ada"));
    assert_eq!(record.relations.keys().collect::<Vec<_>>(), vec!["profile"]);

    let flattened_only = Input::new().field("id", 1).load_direct(["profile:title"]);
    let body = serde_json::to_value(actions.get_item(&project_spec(), &flattened_only).await.unwrap()).unwrap();
    assert_eq!(body["profile"], json!("Analytical"));
    assert!(body.get("relations").is_none());
}

#[tokio::test]
async fn get_items_loads_relations_for_every_row() {
    let actions = common::actions().await;
    let input = Input::new().field("profile_id", 2).relations(["profile"]);
    let records = actions.get_items(&project_spec(), &input).await.unwrap();
    assert_eq!(records.len(), 4);
    for record in records.iter() {
        let profile = record.related("profile").unwrap().records();
        assert_eq!(profile[0].get("slug"), Some(&json!("grace")));
    }
    assert!(records.pagination.is_none());
}

#[tokio::test]
async fn membership_and_empty_results() {
    let actions = common::actions().await;
    let records = actions
        .get_items(&project_spec(), &Input::new().field("id", json!([1, 3, 5])))
        .await
        .unwrap();
    assert_eq!(names(&records.records), vec![json!("Project 01"), json!("Project 03"), json!("Project 05")]);

    let none = actions
        .get_items(&project_spec(), &Input::new().field("profile_id", 42))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn pagination_windows() {
    let actions = common::actions().await;
    let spec = project_spec().default_order_by("name");

    let page = actions.get_items(&spec, &Input::new().paginate(3, 3)).await.unwrap();
    assert_eq!(names(&page.records), vec![json!("Project 04"), json!("Project 05"), json!("Project 06")]);
    let meta = page.pagination.unwrap();
    assert_eq!((meta.skip, meta.limit, meta.row_count), (3, 3, 10));

    let beyond = actions.get_items(&spec, &Input::new().paginate(20, 3)).await.unwrap();
    assert!(beyond.is_empty());
    assert_eq!(beyond.pagination.unwrap().row_count, 10);

    let mut defaults = Input::new();
    defaults.paginate = Some(resource_actions::Paginate::default());
    let first = actions.get_items(&spec, &defaults).await.unwrap();
    assert_eq!(first.len(), 10);
    assert_eq!(first.pagination.unwrap().limit, 10);
}

#[tokio::test]
async fn ordering_prefers_input_over_default() {
    let actions = common::actions().await;
    let spec = project_spec().default_order_by("-name");

    let by_default = actions.get_items(&spec, &Input::new()).await.unwrap();
    assert_eq!(by_default.records[0].get("name"), Some(&json!("Project 10")));

    let chained = actions
        .get_items(&spec, &Input::new().order_by("-profile_id,name"))
        .await
        .unwrap();
    let ordered = names(&chained.records);
    assert_eq!(ordered.first(), Some(&json!("Project 07")));
    assert_eq!(ordered[3], json!("Project 10"));
    assert_eq!(ordered[4], json!("Project 01"));
    assert_eq!(ordered.last(), Some(&json!("Project 06")));
}

#[tokio::test]
async fn caller_owned_scope_decides_the_outcome() {
    let actions = common::actions().await;
    let spec = project_spec();

    let scope = actions.store().begin().await.unwrap();
    let created = actions
        .create_item(&spec, &Input::new().field("name", "Draft").field("profile_id", 1).transacting(&scope))
        .await
        .unwrap();
    let id = created.get("id").cloned().unwrap();
    let seen = actions
        .get_item(&spec, &Input::new().field("id", id.clone()).transacting(&scope))
        .await
        .unwrap();
    assert_eq!(seen.get("name"), Some(&json!("Draft")));
    assert_eq!(actions.store().rows("Project").await.len(), 10);

    actions.store().rollback(scope).await.unwrap();
    let err = actions.get_item(&spec, &Input::new().field("id", id)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upsert_create_path_authorizes_on_input_only() {
    let actions = common::actions().await;
    let spec = owned_project_spec();

    let created = actions
        .upsert_item(
            &spec,
            &Input::new()
                .field("id", 50)
                .field("name", "Fresh")
                .field("profile_id", 1)
                .auth_bundle(profiles(&[1])),
        )
        .await
        .unwrap();
    assert_eq!(created.get("id"), Some(&json!(50)));
    assert_eq!(created.get("is_live"), Some(&json!(false)));

    for input in [
        Input::new().field("id", 51).field("profile_id", 2),
        Input::new().field("id", 52).field("name", "No owner"),
    ] {
        let err = actions
            .upsert_item(&spec, &input.auth_bundle(profiles(&[1])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
    assert_eq!(actions.store().rows("Project").await.len(), 11);
}

#[tokio::test]
async fn input_fields_override_stored_ones_when_authorizing_updates() {
    let actions = common::actions().await;
    let spec = owned_project_spec();

    // Stored profile_id is 2, the input moves the project to profile 1.
    let moved = actions
        .update_item(
            &spec,
            &Input::new()
                .field("id", 8)
                .field("profile_id", 1)
                .auth_bundle(profiles(&[1])),
        )
        .await
        .unwrap();
    assert_eq!(moved.get("profile_id"), Some(&json!(1)));

    // Stored profile_id is 1, but the input claims profile 2.
    let err = actions
        .update_item(
            &spec,
            &Input::new()
                .field("id", 2)
                .field("profile_id", 2)
                .auth_bundle(profiles(&[1])),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(actions.store().rows("Project").await[1].get("profile_id"), Some(&json!(1)));
}

#[tokio::test]
async fn commits_outside_an_open_scope_survive_its_commit() {
    let actions = common::actions().await;
    let spec = ResourceSpec::new("Role").field(FieldSpec::new("name").required());

    let scope = actions.store().begin().await.unwrap();
    actions
        .create_item(&spec, &Input::new().field("name", "in_scope").transacting(&scope))
        .await
        .unwrap();
    actions
        .create_item(&spec, &Input::new().field("name", "independent"))
        .await
        .unwrap();
    assert_eq!(actions.store().rows("Role").await.len(), 4);

    actions.store().commit(scope).await.unwrap();
    let roles = actions.store().rows("Role").await;
    assert_eq!(
        names(&roles.into_iter().map(Record::new).collect::<Vec<_>>()),
        vec![json!("admin"), json!("editor"), json!("viewer"), json!("independent"), json!("in_scope")]
    );
}

#[tokio::test]
async fn reads_render_as_json_api() {
    let actions = common::actions().await;
    let spec = project_spec().columns_to_return(ColumnsToReturn::List(vec![
        "id".into(),
        "name".into(),
        "profile_id".into(),
    ]));
    let input = Input::new().field("profile_id", 1).relations(["profile"]).paginate(0, 2);

    let doc = actions.get_items_as(&spec, &input, Output::JsonApi).await.unwrap();
    assert_eq!(
        doc["data"][0],
        json!({
            "type": "Project",
            "id": "1",
            "attributes": { "name": "Project 01", "profile_id": 1 },
            "relationships": { "profile": { "data": { "type": "Profile", "id": "1" } } }
        })
    );
    assert_eq!(doc["data"].as_array().unwrap().len(), 2);
    let included = doc["included"].as_array().unwrap();
    assert_eq!(included.len(), 1);
    assert_eq!(included[0]["attributes"]["slug"], json!("ada"));
    assert_eq!(doc["meta"]["pagination"], json!({ "skip": 0, "limit": 2, "rowCount": 6 }));

    let one = Input::new().field("id", 3);
    let native = actions.get_item_as(&spec, &one, Output::Native).await.unwrap();
    assert_eq!(native, json!({ "id": 3, "name": "Project 03", "profile_id": 1 }));
    let err = actions
        .get_item_as(&spec, &Input::new().field("id", 99), Output::JsonApi)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn events_go_to_the_injected_dispatcher() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let actions = common::actions().await.with_dispatch(tracing::Dispatch::new(subscriber));

    actions
        .get_item(&project_spec(), &Input::new().field("id", 1))
        .await
        .unwrap();

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("getItem"), "{logs}");
    assert!(logs.contains("Project"), "{logs}");
}
