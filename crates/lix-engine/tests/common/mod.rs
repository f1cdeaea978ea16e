#![allow(dead_code)]

use serde_json::{json, Value};

use lix_engine::ast::{col, lit, Insert, Select};
use lix_engine::{Lix, Session, SqlValue};

pub fn todo_schema() -> Value {
    json!({
        "x-lix-key": "todo",
        "x-lix-version": "1.0",
        "x-lix-primary-key": ["id"],
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
            "done": { "type": "boolean" }
        },
        "required": ["id", "title"],
        "additionalProperties": false
    })
}

/// In-memory lix with the `todo` schema registered, and a session on main.
pub async fn setup() -> (Lix, Session) {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();
    lix.register_schema(&session, todo_schema()).await.unwrap();
    (lix, session)
}

pub async fn add_todo(lix: &Lix, session: &Session, id: &str, title: &str) {
    let result = lix
        .execute(
            session,
            Insert::into_view("todo")
                .columns(["id", "title", "done"])
                .values(vec![lit(id), lit(title), lit(false)]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);
}

/// `(id, title)` of every visible todo, ordered by id.
pub async fn todos(lix: &Lix, session: &Session) -> Vec<(String, String)> {
    let result = lix
        .execute(
            session,
            Select::star_from("todo")
                .columns(["id", "title"])
                .order_by(col("id"), false),
            &[],
        )
        .await
        .unwrap();
    result
        .rows
        .iter()
        .map(|row| (text(&row[0]), text(&row[1])))
        .collect()
}

pub fn text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        other => panic!("expected text, got {other:?}"),
    }
}

pub async fn read_json(lix: &Lix, session: &Session, path: &str) -> Value {
    let file = lix.read_file(session, path).await.unwrap();
    serde_json::from_slice(&file.data).unwrap()
}

pub fn pair(id: &str, title: &str) -> (String, String) {
    (id.to_string(), title.to_string())
}
