//! Plain text plugin: one entity per line.

use serde_json::{json, Value};

use lix_core::{ApplyRequest, DetectRequest, DetectedChange, Plugin, Result};

use crate::entities::{apply, diff, join_positional, position_id, utf8, EntityMap};

pub const TEXT_PLUGIN_KEY: &str = "plugin_text";
pub const TEXT_LINE_SCHEMA_KEY: &str = "plugin_text_line";
const SCHEMA_VERSION: &str = "1.0";

/// Tracks `.txt` files line by line. Each line keeps its terminator, so
/// rendering the lines in order reproduces the file byte for byte.
#[derive(Debug, Default, Clone)]
pub struct TextPlugin;

impl TextPlugin {
    pub fn new() -> Self {
        Self
    }

    fn entities(data: &[u8]) -> Result<EntityMap> {
        let text = utf8(TEXT_PLUGIN_KEY, data)?;
        Ok(text
            .split_inclusive('\n')
            .enumerate()
            .map(|(position, line)| {
                let id = position_id(position);
                let content = json!({ "id": id, "position": position, "text": line });
                (id, content)
            })
            .collect())
    }
}

impl Plugin for TextPlugin {
    fn key(&self) -> &str {
        TEXT_PLUGIN_KEY
    }

    fn detect_changes_glob(&self) -> &str {
        "**/*.txt"
    }

    fn schemas(&self) -> Vec<Value> {
        vec![json!({
            "x-lix-key": TEXT_LINE_SCHEMA_KEY,
            "x-lix-version": SCHEMA_VERSION,
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "position": { "type": "integer" },
                "text": { "type": "string" }
            },
            "required": ["id", "position", "text"],
            "additionalProperties": false
        })]
    }

    fn detect_changes(&self, request: DetectRequest) -> Result<Vec<DetectedChange>> {
        let before = match &request.before {
            Some(file) => Self::entities(&file.data)?,
            None => EntityMap::new(),
        };
        let after = Self::entities(&request.after.data)?;
        Ok(diff(TEXT_LINE_SCHEMA_KEY, SCHEMA_VERSION, &before, &after))
    }

    fn apply_changes(&self, request: ApplyRequest) -> Result<Vec<u8>> {
        let mut entities = Self::entities(&request.file.data)?;
        apply(&mut entities, TEXT_LINE_SCHEMA_KEY, request.changes);
        join_positional(TEXT_PLUGIN_KEY, &entities, "text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lix_core::PluginFile;

    fn file(data: &str) -> PluginFile {
        PluginFile {
            id: "f1".to_string(),
            path: "/notes.txt".to_string(),
            data: data.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_edit_single_line() {
        let plugin = TextPlugin::new();
        let changes = plugin
            .detect_changes(DetectRequest {
                before: Some(file("one\ntwo\nthree")),
                after: file("one\n2\nthree"),
            })
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].entity_id, "00000001");
        assert_eq!(changes[0].snapshot_content.as_ref().unwrap()["text"], "2\n");
    }

    #[test]
    fn test_round_trip_from_empty() {
        let plugin = TextPlugin::new();
        let target = "alpha\r\nbeta\n\ngamma";
        let changes = plugin
            .detect_changes(DetectRequest {
                before: None,
                after: file(target),
            })
            .unwrap();
        let bytes = plugin
            .apply_changes(ApplyRequest {
                file: file(""),
                changes,
            })
            .unwrap();
        assert_eq!(bytes, target.as_bytes());
    }

    #[test]
    fn test_truncation_deletes_trailing_lines() {
        let plugin = TextPlugin::new();
        let before = file("a\nb\nc\n");
        let changes = plugin
            .detect_changes(DetectRequest {
                before: Some(before.clone()),
                after: file("a\n"),
            })
            .unwrap();
        assert_eq!(changes.iter().filter(|c| c.snapshot_content.is_none()).count(), 2);

        let bytes = plugin.apply_changes(ApplyRequest { file: before, changes }).unwrap();
        assert_eq!(bytes, b"a\n");
    }

    #[test]
    fn test_invalid_utf8_is_a_plugin_error() {
        let plugin = TextPlugin::new();
        let err = plugin
            .detect_changes(DetectRequest {
                before: None,
                after: PluginFile {
                    id: "f".into(),
                    path: "/x.txt".into(),
                    data: vec![0xff, 0xfe],
                },
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "PLUGIN_ERROR");
    }
}
