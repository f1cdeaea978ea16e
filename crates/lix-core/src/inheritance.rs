//! Read-through of version inheritance in SQL.
//!
//! The state cache holds only the rows a version owns. Entities a version
//! never touched are read from the versions it inherits from, each as of
//! the commit it was pinned at, when a query runs.

use crate::types::STATE_CACHE_TABLE;

/// Longest inheritance chain followed unless configured otherwise.
pub const DEFAULT_MAX_INHERITANCE_DEPTH: usize = 64;

/// Visible rows of every version, tombstones included.
///
/// Columns: `entity_id, schema_key, file_id, version_id, plugin_key,
/// snapshot_content, schema_version, change_id, commit_id,
/// inherited_from_version_id, inheritance_delete_marker, created_at,
/// updated_at`.
///
/// Layer 0 is the version's own cache rows. Layer `n` is the newest change
/// per entity reachable from the commit the `n`th ancestor was pinned at,
/// minus what that ancestor itself inherited. An own or nearer row shadows
/// every farther one through the anti-join at the end.
pub fn resolved_state_sql(max_inheritance_depth: usize) -> String {
    format!(
        r#"WITH RECURSIVE
layer(viewer, depth, version_id, commit_id, base_commit_id) AS (
    SELECT v.id, 1, p.id, v.inherits_from_commit_id, p.inherits_from_commit_id
    FROM version v JOIN version p ON p.id = v.inherits_from_version_id
    WHERE v.inherits_from_commit_id IS NOT NULL
    UNION ALL
    SELECT l.viewer, l.depth + 1, g.id, p.inherits_from_commit_id, g.inherits_from_commit_id
    FROM layer l
    JOIN version p ON p.id = l.version_id
    JOIN version g ON g.id = p.inherits_from_version_id
    WHERE p.inherits_from_commit_id IS NOT NULL AND l.depth < {depth}
),
reach(viewer, depth, commit_id, distance) AS (
    SELECT viewer, depth, commit_id, 0 FROM layer
    UNION
    SELECT r.viewer, r.depth, e.parent_id, r.distance + 1
    FROM reach r JOIN lix_commit_edge e ON e.child_id = r.commit_id
),
shared(viewer, depth, commit_id) AS (
    SELECT viewer, depth, base_commit_id FROM layer WHERE base_commit_id IS NOT NULL
    UNION
    SELECT s.viewer, s.depth, e.parent_id
    FROM shared s JOIN lix_commit_edge e ON e.child_id = s.commit_id
),
nearest(viewer, depth, commit_id, distance) AS (
    SELECT r.viewer, r.depth, r.commit_id, MIN(r.distance)
    FROM reach r
    WHERE NOT EXISTS (
        SELECT 1 FROM shared s
        WHERE s.viewer = r.viewer AND s.depth = r.depth AND s.commit_id = r.commit_id
    )
    GROUP BY r.viewer, r.depth, r.commit_id
),
inherited AS (
    SELECT n.viewer, n.depth, l.version_id AS layer_version_id, cc.commit_id,
           c.id AS change_id, c.entity_id, c.schema_key, c.file_id, c.plugin_key,
           c.schema_version, c.snapshot_id, c.created_at,
           ROW_NUMBER() OVER (
               PARTITION BY n.viewer, n.depth, c.entity_id, c.schema_key, c.file_id
               ORDER BY n.distance, c.created_at DESC, c.id DESC, cc.commit_id
           ) AS pick,
           MIN(c.created_at) OVER (
               PARTITION BY n.viewer, n.depth, c.entity_id, c.schema_key, c.file_id
           ) AS first_seen
    FROM nearest n
    JOIN layer l ON l.viewer = n.viewer AND l.depth = n.depth
    JOIN lix_commit_change cc ON cc.commit_id = n.commit_id
    JOIN change c ON c.id = cc.change_id
),
candidate AS (
    SELECT o.version_id AS viewer, 0 AS depth, o.entity_id, o.schema_key, o.file_id, o.plugin_key,
           o.snapshot_content, o.schema_version, o.change_id, o.commit_id,
           NULL AS inherited_from_version_id, o.created_at, o.updated_at
    FROM {cache} o
    UNION ALL
    SELECT i.viewer, i.depth, i.entity_id, i.schema_key, i.file_id, i.plugin_key,
           sn.content, i.schema_version, i.change_id, i.commit_id,
           i.layer_version_id, i.first_seen, i.created_at
    FROM inherited i JOIN snapshot sn ON sn.id = i.snapshot_id
    WHERE i.pick = 1
)
SELECT c.entity_id, c.schema_key, c.file_id, c.viewer AS version_id, c.plugin_key,
       c.snapshot_content, c.schema_version, c.change_id, c.commit_id,
       c.inherited_from_version_id,
       CASE WHEN c.depth = 0 AND c.snapshot_content IS NULL THEN coalesce((
           SELECT p.snapshot_content IS NOT NULL FROM candidate p
           WHERE p.viewer = c.viewer AND p.entity_id = c.entity_id
             AND p.schema_key = c.schema_key AND p.file_id = c.file_id AND p.depth > 0
           ORDER BY p.depth LIMIT 1
       ), 0) ELSE 0 END AS inheritance_delete_marker,
       c.created_at, c.updated_at
FROM candidate c
LEFT JOIN candidate nearer
    ON nearer.viewer = c.viewer AND nearer.entity_id = c.entity_id
   AND nearer.schema_key = c.schema_key AND nearer.file_id = c.file_id
   AND nearer.depth < c.depth
WHERE nearer.viewer IS NULL"#,
        depth = max_inheritance_depth.max(1),
        cache = STATE_CACHE_TABLE,
    )
}
