//! Markdown plugin: one entity per top-level block.

use pulldown_cmark::{Event, Parser};
use serde_json::{json, Value};

use lix_core::{ApplyRequest, DetectRequest, DetectedChange, Plugin, Result};

use crate::entities::{apply, diff, join_positional, position_id, utf8, EntityMap};

pub const MARKDOWN_PLUGIN_KEY: &str = "plugin_md";
pub const MARKDOWN_BLOCK_SCHEMA_KEY: &str = "plugin_md_block";
const SCHEMA_VERSION: &str = "1.0";

/// Byte offsets where top-level blocks start.
fn block_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut depth = 0usize;
    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    starts.push(range.start);
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            _ if depth == 0 => starts.push(range.start),
            _ => {}
        }
    }
    starts.dedup();
    starts
}

/// Split a document into block segments. Each segment runs from its block's
/// start to the next block's start, so trailing blank lines stay with the
/// block before them and the segments concatenate to the original text.
fn segments(text: &str) -> Vec<&str> {
    let mut starts = block_starts(text);
    if starts.first().is_some_and(|s| *s > 0) {
        // Leading whitespace belongs to the first block.
        starts[0] = 0;
    }
    if starts.is_empty() && !text.is_empty() {
        starts.push(0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[*start..end]
        })
        .collect()
}

/// Tracks `.md` files block by block, preserving the raw source of each
/// block.
#[derive(Debug, Default, Clone)]
pub struct MarkdownPlugin;

impl MarkdownPlugin {
    pub fn new() -> Self {
        Self
    }

    fn entities(data: &[u8]) -> Result<EntityMap> {
        let text = utf8(MARKDOWN_PLUGIN_KEY, data)?;
        Ok(segments(text)
            .into_iter()
            .enumerate()
            .map(|(position, markdown)| {
                let id = position_id(position);
                let content = json!({ "id": id, "position": position, "markdown": markdown });
                (id, content)
            })
            .collect())
    }
}

impl Plugin for MarkdownPlugin {
    fn key(&self) -> &str {
        MARKDOWN_PLUGIN_KEY
    }

    fn detect_changes_glob(&self) -> &str {
        "**/*.md"
    }

    fn schemas(&self) -> Vec<Value> {
        vec![json!({
            "x-lix-key": MARKDOWN_BLOCK_SCHEMA_KEY,
            "x-lix-version": SCHEMA_VERSION,
            "x-lix-primary-key": ["id"],
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "position": { "type": "integer" },
                "markdown": { "type": "string" }
            },
            "required": ["id", "position", "markdown"],
            "additionalProperties": false
        })]
    }

    fn detect_changes(&self, request: DetectRequest) -> Result<Vec<DetectedChange>> {
        let before = match &request.before {
            Some(file) => Self::entities(&file.data)?,
            None => EntityMap::new(),
        };
        let after = Self::entities(&request.after.data)?;
        Ok(diff(MARKDOWN_BLOCK_SCHEMA_KEY, SCHEMA_VERSION, &before, &after))
    }

    fn apply_changes(&self, request: ApplyRequest) -> Result<Vec<u8>> {
        let mut entities = Self::entities(&request.file.data)?;
        apply(&mut entities, MARKDOWN_BLOCK_SCHEMA_KEY, request.changes);
        join_positional(MARKDOWN_PLUGIN_KEY, &entities, "markdown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lix_core::PluginFile;

    const DOC: &str = "# Title\n\nFirst paragraph\nstill first.\n\n- a\n- b\n\n---\n\n```rust\nfn main() {}\n```\n";

    fn file(data: &str) -> PluginFile {
        PluginFile {
            id: "f1".to_string(),
            path: "/README.md".to_string(),
            data: data.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_segments_cover_document() {
        let parts = segments(DOC);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "# Title\n\n");
        assert!(parts[3].starts_with("---"));
        assert_eq!(parts.concat(), DOC);
    }

    #[test]
    fn test_leading_whitespace_is_kept() {
        let text = "\n\nHello\n";
        assert_eq!(segments(text).concat(), text);
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_paragraph_edit_touches_one_block() {
        let plugin = MarkdownPlugin::new();
        let edited = DOC.replace("still first.", "still the first.");
        let changes = plugin
            .detect_changes(DetectRequest {
                before: Some(file(DOC)),
                after: file(&edited),
            })
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].entity_id, "00000001");
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let plugin = MarkdownPlugin::new();
        let changes = plugin
            .detect_changes(DetectRequest {
                before: None,
                after: file(DOC),
            })
            .unwrap();
        let bytes = plugin
            .apply_changes(ApplyRequest {
                file: file(""),
                changes,
            })
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), DOC);
    }
}
