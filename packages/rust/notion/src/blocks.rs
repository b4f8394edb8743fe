//! Conversion between Notion block JSON and [`NativeBlock`] / [`Block`].

use serde_json::{Value, json};

use pagewright_shared::{Block, BlockKind, NativeBlock};

/// Notion rejects text objects longer than this many characters.
const MAX_TEXT_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// Build a `rich_text` array, splitting long text into 2000-char chunks.
pub(crate) fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return json!([]);
    }
    let parts: Vec<Value> = chars
        .chunks(MAX_TEXT_CHARS)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect();
    Value::Array(parts)
}

/// Concatenate the `plain_text` of every element of a `rich_text` array.
pub(crate) fn plain_text(rich: &Value) -> String {
    rich.as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.pointer("/text/content"))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// NativeBlock → JSON
// ---------------------------------------------------------------------------

/// The type-keyed body used by both "append children" and "update block".
pub(crate) fn block_body(block: &NativeBlock) -> Value {
    let kind = block.kind();
    let inner = match block {
        NativeBlock::ToDo { text, checked } => json!({
            "rich_text": rich_text(text),
            "checked": checked,
        }),
        NativeBlock::Code { language, text } => json!({
            "rich_text": rich_text(text),
            "language": language,
        }),
        other => json!({ "rich_text": rich_text(other.text()) }),
    };
    let mut body = serde_json::Map::new();
    body.insert(kind.as_str().to_string(), inner);
    Value::Object(body)
}

/// A full block object for the `children` array of an append request.
pub(crate) fn child_object(block: &NativeBlock) -> Value {
    let mut object = block_body(block);
    if let Value::Object(map) = &mut object {
        map.insert("object".into(), json!("block"));
        map.insert("type".into(), json!(block.kind().as_str()));
    }
    object
}

// ---------------------------------------------------------------------------
// JSON → Block
// ---------------------------------------------------------------------------

/// Parse a Notion block object into the native representation, if text-bearing.
pub(crate) fn parse_native(object: &Value) -> Option<NativeBlock> {
    let type_name = object.get("type")?.as_str()?;
    let inner = object.get(type_name)?;
    let text = plain_text(inner.get("rich_text").unwrap_or(&Value::Null));

    Some(match BlockKind::from_api_name(type_name) {
        BlockKind::Paragraph => NativeBlock::Paragraph(text),
        BlockKind::Heading1 => NativeBlock::Heading { level: 1, text },
        BlockKind::Heading2 => NativeBlock::Heading { level: 2, text },
        BlockKind::Heading3 => NativeBlock::Heading { level: 3, text },
        BlockKind::BulletedListItem => NativeBlock::BulletedListItem(text),
        BlockKind::NumberedListItem => NativeBlock::NumberedListItem(text),
        BlockKind::ToDo => NativeBlock::ToDo {
            text,
            checked: inner.get("checked").and_then(Value::as_bool).unwrap_or(false),
        },
        BlockKind::Code => NativeBlock::Code {
            language: inner
                .get("language")
                .and_then(Value::as_str)
                .unwrap_or("plain text")
                .to_string(),
            text,
        },
        BlockKind::Other(_) => return None,
    })
}

/// Parse a Notion block object into a [`Block`] with markdown-flavored content.
///
/// Non text-bearing blocks keep whatever plain text they carry (often none).
pub(crate) fn parse_block(object: &Value) -> Option<Block> {
    let id = object.get("id")?.as_str()?;
    let type_name = object.get("type")?.as_str()?;
    let kind = BlockKind::from_api_name(type_name);

    let content = match parse_native(object) {
        Some(native) => pagewright_markdown::render(&native),
        None => object
            .get(type_name)
            .and_then(|inner| inner.get("rich_text"))
            .map(plain_text)
            .unwrap_or_default(),
    };

    Some(Block {
        block_id: id.to_string(),
        content,
        kind: Some(kind),
        has_children: object
            .get("has_children")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}
