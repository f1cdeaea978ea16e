//! Logical views exposed to queries and their physical definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use lix_core::schema::{ACCOUNT_SCHEMA_KEY, FILE_DESCRIPTOR_SCHEMA_KEY, LOG_SCHEMA_KEY};
use lix_core::{resolved_state_sql, LixSchema, DEFAULT_MAX_INHERITANCE_DEPTH, FILE_DATA_CACHE_TABLE};

use crate::ast::{func, lit, qcol, Expr, JoinKind, Select, SelectItem, TableRef};

/// Columns of the `state` views, in order.
pub const STATE_COLUMNS: &[&str] = &[
    "entity_id",
    "schema_key",
    "file_id",
    "version_id",
    "plugin_key",
    "snapshot_content",
    "schema_version",
    "change_id",
    "commit_id",
    "inherited_from_version_id",
    "created_at",
    "updated_at",
];

/// Columns of the `state_history` view, in order.
pub const HISTORY_COLUMNS: &[&str] = &[
    "entity_id",
    "schema_key",
    "file_id",
    "plugin_key",
    "snapshot_content",
    "schema_version",
    "change_id",
    "commit_id",
    "root_commit_id",
    "depth",
    "created_at",
];

/// Metadata columns added to every entity view, mapped to the state column
/// they read.
pub const LIXCOL_COLUMNS: &[(&str, &str)] = &[
    ("lixcol_entity_id", "entity_id"),
    ("lixcol_schema_key", "schema_key"),
    ("lixcol_file_id", "file_id"),
    ("lixcol_version_id", "version_id"),
    ("lixcol_plugin_key", "plugin_key"),
    ("lixcol_schema_version", "schema_version"),
    ("lixcol_change_id", "change_id"),
    ("lixcol_commit_id", "commit_id"),
    ("lixcol_inherited_from_version_id", "inherited_from_version_id"),
    ("lixcol_created_at", "created_at"),
    ("lixcol_updated_at", "updated_at"),
    ("lixcol_snapshot_content", "snapshot_content"),
];

/// Extra metadata columns of entity history views.
const LIXCOL_HISTORY_COLUMNS: &[(&str, &str)] = &[
    ("lixcol_entity_id", "entity_id"),
    ("lixcol_schema_key", "schema_key"),
    ("lixcol_file_id", "file_id"),
    ("lixcol_plugin_key", "plugin_key"),
    ("lixcol_schema_version", "schema_version"),
    ("lixcol_change_id", "change_id"),
    ("lixcol_commit_id", "commit_id"),
    ("lixcol_root_commit_id", "root_commit_id"),
    ("lixcol_depth", "depth"),
    ("lixcol_created_at", "created_at"),
    ("lixcol_snapshot_content", "snapshot_content"),
];

/// Map a `lixcol_*` column of an entity view to its state column.
pub fn lixcol_target(name: &str) -> Option<&'static str> {
    LIXCOL_COLUMNS
        .iter()
        .chain(LIXCOL_HISTORY_COLUMNS)
        .find(|(lixcol, _)| *lixcol == name)
        .map(|(_, target)| *target)
}

/// Reachability of every commit from every commit, nearest path only.
const HISTORY_SQL: &str = r#"
WITH RECURSIVE reach(root_commit_id, commit_id, depth) AS (
    SELECT id, id, 0 FROM lix_commit
    UNION
    SELECT r.root_commit_id, e.parent_id, r.depth + 1
    FROM reach r JOIN lix_commit_edge e ON e.child_id = r.commit_id
),
nearest AS (
    SELECT root_commit_id, commit_id, MIN(depth) AS depth
    FROM reach GROUP BY root_commit_id, commit_id
)
SELECT c.entity_id, c.schema_key, c.file_id, c.plugin_key, s.content AS snapshot_content,
       c.schema_version, c.id AS change_id, n.commit_id, n.root_commit_id, n.depth, c.created_at
FROM nearest n
JOIN lix_commit_change cc ON cc.commit_id = n.commit_id
JOIN change c ON c.id = cc.change_id
LEFT JOIN snapshot s ON s.id = c.snapshot_id
"#;

/// Whether a view shows the active version or every version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Active,
    AllVersions,
}

/// A schema exposed as a typed view.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub schema_key: String,
    pub schema_version: String,
    pub properties: Vec<String>,
    pub primary_key: Vec<String>,
}

impl EntityView {
    pub fn from_schema(schema: &LixSchema) -> Self {
        Self {
            schema_key: schema.key.clone(),
            schema_version: schema.version.clone(),
            properties: schema.properties.clone(),
            primary_key: schema.primary_key.clone(),
        }
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }
}

/// What a view name resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewKind<'a> {
    State(Scope),
    StateHistory,
    File(Scope),
    Entity(&'a EntityView, Scope),
    EntityHistory(&'a EntityView),
}

impl ViewKind<'_> {
    pub fn is_read_only(&self) -> bool {
        matches!(self, ViewKind::StateHistory | ViewKind::EntityHistory(_))
    }
}

/// The set of views a query may reference, derived from the registered
/// schemas.
#[derive(Debug, Clone)]
pub struct ViewCatalog {
    entities: BTreeMap<String, EntityView>,
    aliases: BTreeMap<String, String>,
    generation: u64,

    /// Visible rows of every version, inherited ones included.
    state_sql: String,
}

impl ViewCatalog {
    /// Build the catalog from the latest version of each schema.
    pub fn new(schemas: &[LixSchema], generation: u64) -> Self {
        let entities = schemas
            .iter()
            .map(|schema| (schema.key.clone(), EntityView::from_schema(schema)))
            .collect();
        let aliases = [
            ("account", ACCOUNT_SCHEMA_KEY),
            ("log", LOG_SCHEMA_KEY),
        ]
        .into_iter()
        .map(|(alias, key)| (alias.to_string(), key.to_string()))
        .collect();

        Self {
            entities,
            aliases,
            generation,
            state_sql: resolved_state_sql(DEFAULT_MAX_INHERITANCE_DEPTH),
        }
    }

    /// Follow at most `depth` levels of inheritance when reading state.
    pub fn with_max_inheritance_depth(mut self, depth: usize) -> Self {
        self.state_sql = resolved_state_sql(depth);
        self
    }

    /// Schema generation the catalog was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entity(&self, name: &str) -> Option<&EntityView> {
        self.entities
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|key| self.entities.get(key)))
    }

    pub fn entity_views(&self) -> impl Iterator<Item = &EntityView> {
        self.entities.values()
    }

    /// Resolve a view name.
    pub fn resolve(&self, name: &str) -> Option<ViewKind<'_>> {
        match name {
            "state" => return Some(ViewKind::State(Scope::Active)),
            "state_by_version" | "state_all" => return Some(ViewKind::State(Scope::AllVersions)),
            "state_history" => return Some(ViewKind::StateHistory),
            "file" => return Some(ViewKind::File(Scope::Active)),
            "file_by_version" => return Some(ViewKind::File(Scope::AllVersions)),
            _ => {}
        }

        if let Some(view) = self.entity(name) {
            return Some(ViewKind::Entity(view, Scope::Active));
        }
        if let Some(base) = name.strip_suffix("_by_version") {
            return self.entity(base).map(|v| ViewKind::Entity(v, Scope::AllVersions));
        }
        if let Some(base) = name.strip_suffix("_history") {
            return self.entity(base).map(ViewKind::EntityHistory);
        }
        None
    }
}

/// Session-scoped inputs to preprocessing.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub active_version_id: String,
    pub catalog: Arc<ViewCatalog>,
}

impl EngineState {
    pub fn new(active_version_id: impl Into<String>, catalog: Arc<ViewCatalog>) -> Self {
        Self {
            active_version_id: active_version_id.into(),
            catalog,
        }
    }
}

// Physical definitions

/// JSON path for a top-level property.
pub fn property_path(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("$.{name}")
    } else {
        format!("$.\"{}\"", name.replace('"', "\\\""))
    }
}

/// `json_extract(<content>, '$.name')`.
pub fn extract_property(content: Expr, name: &str) -> Expr {
    func("json_extract", vec![content, lit(property_path(name))])
}

fn state_source(state: &EngineState) -> TableRef {
    TableRef::Raw {
        sql: state.catalog.state_sql.clone(),
        alias: "s".to_string(),
    }
}

fn version_filter(select: Select, table: &str, scope: Scope, state: &EngineState) -> Select {
    match scope {
        Scope::Active => select.filter(qcol(table, "version_id").eq(lit(state.active_version_id.as_str()))),
        Scope::AllVersions => select,
    }
}

/// Live rows of every version, read through inheritance.
pub(crate) fn state_view(scope: Scope, state: &EngineState) -> Select {
    let projection = STATE_COLUMNS
        .iter()
        .map(|c| SelectItem::aliased(qcol("s", *c), *c))
        .collect();
    let select = Select::from_table(state_source(state), projection)
        .filter(qcol("s", "snapshot_content").is_not_null());
    version_filter(select, "s", scope, state)
}

fn history_source() -> TableRef {
    TableRef::Raw {
        sql: HISTORY_SQL.to_string(),
        alias: "h".to_string(),
    }
}

/// Every committed change together with each commit it is reachable from.
pub(crate) fn state_history_view() -> Select {
    let projection = HISTORY_COLUMNS
        .iter()
        .map(|c| SelectItem::aliased(qcol("h", *c), *c))
        .collect();
    Select::from_table(history_source(), projection)
}

fn property_items(view: &EntityView, table: &str) -> Vec<SelectItem> {
    view.properties
        .iter()
        .map(|p| SelectItem::aliased(extract_property(qcol(table, "snapshot_content"), p), p.as_str()))
        .collect()
}

/// Typed view over the live rows of one schema.
pub(crate) fn entity_view(view: &EntityView, scope: Scope, state: &EngineState) -> Select {
    let mut projection = property_items(view, "s");
    projection.extend(
        LIXCOL_COLUMNS
            .iter()
            .map(|(alias, column)| SelectItem::aliased(qcol("s", *column), *alias)),
    );
    let select = Select::from_table(state_source(state), projection)
        .filter(qcol("s", "schema_key").eq(lit(view.schema_key.as_str())))
        .filter(qcol("s", "snapshot_content").is_not_null());
    version_filter(select, "s", scope, state)
}

/// Typed history of one schema.
pub(crate) fn entity_history_view(view: &EntityView) -> Select {
    let mut projection = property_items(view, "h");
    projection.extend(
        LIXCOL_HISTORY_COLUMNS
            .iter()
            .map(|(alias, column)| SelectItem::aliased(qcol("h", *column), *alias)),
    );
    Select::from_table(history_source(), projection)
        .filter(qcol("h", "schema_key").eq(lit(view.schema_key.as_str())))
}

/// File descriptors joined with their rendered bytes.
pub(crate) fn file_view(scope: Scope, state: &EngineState) -> Select {
    let content = || qcol("s", "snapshot_content");
    let projection = vec![
        SelectItem::aliased(extract_property(content(), "id"), "id"),
        SelectItem::aliased(extract_property(content(), "path"), "path"),
        SelectItem::aliased(qcol("d", "data"), "data"),
        SelectItem::aliased(extract_property(content(), "metadata"), "metadata"),
        SelectItem::aliased(qcol("s", "version_id"), "lixcol_version_id"),
        SelectItem::aliased(qcol("s", "change_id"), "lixcol_change_id"),
        SelectItem::aliased(qcol("s", "commit_id"), "lixcol_commit_id"),
        SelectItem::aliased(qcol("s", "inherited_from_version_id"), "lixcol_inherited_from_version_id"),
        SelectItem::aliased(qcol("s", "created_at"), "lixcol_created_at"),
        SelectItem::aliased(qcol("s", "updated_at"), "lixcol_updated_at"),
    ];
    let select = Select::from_table(state_source(state), projection)
        .join(
            JoinKind::Left,
            TableRef::physical(FILE_DATA_CACHE_TABLE, "d"),
            qcol("d", "file_id")
                .eq(qcol("s", "entity_id"))
                .and(qcol("d", "version_id").eq(qcol("s", "version_id"))),
        )
        .filter(qcol("s", "schema_key").eq(lit(FILE_DESCRIPTOR_SCHEMA_KEY)))
        .filter(qcol("s", "snapshot_content").is_not_null());
    version_filter(select, "s", scope, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::catalog;

    #[test]
    fn test_resolve_names() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("state"), Some(ViewKind::State(Scope::Active)));
        assert_eq!(catalog.resolve("state_all"), Some(ViewKind::State(Scope::AllVersions)));
        assert!(matches!(catalog.resolve("todo"), Some(ViewKind::Entity(v, Scope::Active)) if v.schema_key == "todo"));
        assert!(matches!(catalog.resolve("todo_by_version"), Some(ViewKind::Entity(_, Scope::AllVersions))));
        assert!(matches!(catalog.resolve("todo_history"), Some(ViewKind::EntityHistory(_))));
        assert!(matches!(catalog.resolve("account"), Some(ViewKind::Entity(v, _)) if v.schema_key == ACCOUNT_SCHEMA_KEY));
        assert!(catalog.resolve("nope").is_none());
        assert!(catalog.resolve("nope_history").is_none());
        assert_eq!(catalog.generation(), 3);
    }

    #[test]
    fn test_property_path_quotes_unusual_names() {
        assert_eq!(property_path("title"), "$.title");
        assert_eq!(property_path("due date"), "$.\"due date\"");
    }

    #[test]
    fn test_entity_view_reads_active_version() {
        let catalog = Arc::new(catalog());
        let state = EngineState::new("v1", catalog.clone());
        let view = catalog.entity("todo").unwrap();
        let sql = entity_view(view, Scope::Active, &state).to_string();
        assert!(sql.contains("json_extract(\"s\".\"snapshot_content\", '$.title') AS \"title\""));
        assert!(sql.contains("\"s\".\"version_id\" = 'v1'"));
        assert!(sql.contains("\"lixcol_entity_id\""));

        let all = entity_view(view, Scope::AllVersions, &state).to_string();
        assert!(!all.contains("'v1'"));
    }

    #[test]
    fn test_state_views_read_through_inheritance() {
        let catalog = Arc::new(catalog().with_max_inheritance_depth(2));
        let state = EngineState::new("v1", catalog.clone());
        let view = catalog.entity("todo").unwrap();
        for sql in [
            state_view(Scope::Active, &state).to_string(),
            entity_view(view, Scope::Active, &state).to_string(),
            file_view(Scope::Active, &state).to_string(),
        ] {
            assert!(sql.contains("LEFT JOIN candidate nearer"));
            assert!(sql.contains("l.depth < 2"));
            assert!(sql.contains("\"s\".\"inherited_from_version_id\""));
        }
    }
}
