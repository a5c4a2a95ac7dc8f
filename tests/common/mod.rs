#![allow(dead_code)]

use resource_actions::{from_json_str, resolve, ActionInput, Actions, MemoryScope, MemoryStore};
use serde_json::{json, Value};

pub type Input<'a> = ActionInput<'a, MemoryScope>;

const REGISTRY: &str = include_str!("../fixtures/registry.json");

/// Store seeded with users, roles, profiles, ten projects and language tags.
///
/// Projects 1..=6 belong to profile 1 ("ada"), 7..=10 to profile 2 ("grace").
/// Project 1 is tagged rust and go. User 1 has role admin, user 2 has editor.
pub async fn seeded_store() -> MemoryStore {
    let registry = resolve(&from_json_str(REGISTRY).expect("fixture parses")).expect("fixture resolves");
    let store = MemoryStore::new(registry);

    seed(&store, "User", vec![
        json!({ "username": "super_admin" }),
        json!({ "username": "ada" }),
        json!({ "username": "grace" }),
    ])
    .await;
    seed(&store, "UserInfo", vec![json!({ "user_id": 2, "professional_title": "Engineer" })]).await;
    seed(&store, "Role", vec![
        json!({ "name": "admin" }),
        json!({ "name": "editor" }),
        json!({ "name": "viewer" }),
    ])
    .await;
    seed(&store, "UserRole", vec![
        json!({ "user_id": 1, "role_id": 1 }),
        json!({ "user_id": 2, "role_id": 2 }),
    ])
    .await;
    seed(&store, "Profile", vec![
        json!({ "user_id": 2, "slug": "ada", "title": "Analytical" }),
        json!({ "user_id": 3, "slug": "grace", "title": "Compilers" }),
    ])
    .await;
    let projects = (1..=10)
        .map(|n| {
            json!({
                "name": format!("Project {:02}", n),
                "profile_id": if n <= 6 { 1 } else { 2 },
                "is_live": n % 2 == 0,
            })
        })
        .collect();
    seed(&store, "Project", projects).await;
    seed(&store, "CodingLanguageTag", vec![
        json!({ "label": "rust" }),
        json!({ "label": "go" }),
        json!({ "label": "python" }),
    ])
    .await;
    seed(&store, "ProjectCodingLanguageTag", vec![
        json!({ "project_id": 1, "coding_language_tag_id": 1 }),
        json!({ "project_id": 1, "coding_language_tag_id": 2 }),
    ])
    .await;
    store
}

async fn seed(store: &MemoryStore, model: &str, rows: Vec<Value>) {
    store.seed(model, rows).await.expect("seed rows");
}

pub async fn actions() -> Actions<MemoryStore> {
    Actions::new(seeded_store().await)
}
