//! Page property parsing and [`PropertyUpdate`] → Notion property payloads.

use serde_json::{Map, Value, json};

use pagewright_shared::{
    CompletionStatus, PageRecord, PagewrightError, PropertyNames, PropertyUpdate, Result,
};

use crate::blocks::{plain_text, rich_text};

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read a property as a single string, whatever its Notion type.
pub(crate) fn property_text(property: &Value) -> Option<String> {
    let type_name = property.get("type")?.as_str()?;
    let inner = property.get(type_name)?;
    match type_name {
        "title" | "rich_text" => Some(plain_text(inner)),
        "select" | "status" => inner.get("name").and_then(Value::as_str).map(String::from),
        "number" => inner.as_f64().map(|n| n.to_string()),
        "multi_select" => Some(property_list(property).join(", ")),
        "url" | "email" | "phone_number" => inner.as_str().map(String::from),
        _ => None,
    }
}

/// Read a property as a list of strings (multi_select names, relation ids).
pub(crate) fn property_list(property: &Value) -> Vec<String> {
    let Some(type_name) = property.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };
    let Some(inner) = property.get(type_name) else {
        return Vec::new();
    };
    match type_name {
        "multi_select" => inner
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        "relation" => inner
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("id").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        _ => property_text(property).into_iter().filter(|s| !s.is_empty()).collect(),
    }
}

/// Parse a Notion page object (from the API or a webhook body) into a [`PageRecord`].
pub fn parse_page_object(page: &Value, names: &PropertyNames) -> Result<PageRecord> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| PagewrightError::parse("page object has no id"))?;

    let properties = page.get("properties").cloned().unwrap_or(Value::Null);
    let prop = |name: &str| properties.get(name);

    Ok(PageRecord {
        id: id.to_string(),
        url: page.get("url").and_then(Value::as_str).map(String::from),
        title: prop(&names.title).and_then(property_text).unwrap_or_default(),
        categories: prop(&names.category).map(property_list).unwrap_or_default(),
        status: prop(&names.status)
            .and_then(property_text)
            .filter(|s| !s.is_empty()),
        database_id: page
            .pointer("/parent/database_id")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// The `properties` object for a page update.
pub(crate) fn property_payload(updates: &[PropertyUpdate], names: &PropertyNames) -> Value {
    let mut properties = Map::new();
    for update in updates {
        let (name, value) = match update {
            PropertyUpdate::Title(title) => (&names.title, json!({ "title": rich_text(title) })),
            PropertyUpdate::Category(categories) => (
                &names.category,
                json!({ "multi_select": categories.iter().map(|c| json!({ "name": c })).collect::<Vec<_>>() }),
            ),
            PropertyUpdate::Priority(priority) => {
                (&names.priority, json!({ "select": { "name": priority } }))
            }
            PropertyUpdate::Workload(workload) => {
                (&names.workload, json!({ "select": { "name": workload } }))
            }
            PropertyUpdate::PendingByTask(ids) => (&names.pending_by_task, relation(ids)),
            PropertyUpdate::PendingTask(ids) => (&names.pending_task, relation(ids)),
        };
        properties.insert(name.clone(), value);
    }
    Value::Object(properties)
}

fn relation(ids: &[String]) -> Value {
    json!({ "relation": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>() })
}

/// The `properties` object that records a pipeline status.
pub(crate) fn status_payload(status: CompletionStatus, names: &PropertyNames) -> Value {
    let mut properties = Map::new();
    properties.insert(
        names.completion_status.clone(),
        json!({ "select": { "name": status.as_str() } }),
    );
    Value::Object(properties)
}
