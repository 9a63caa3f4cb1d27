//! Manifest decoding
//!
//! Turns raw manifest bytes into an ordered list of [`ResourceDocument`]s.
//! Accepted forms:
//! - a single YAML or JSON object
//! - a multi-document YAML stream (documents separated by `---`)
//! - a concatenated JSON stream or a top-level JSON array
//! - list kinds (`v1/List`, `ConfigMapList`, ...) whose `items` are expanded
//!
//! Decoding is all-or-nothing: one bad document rejects the whole input.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::document::ResourceDocument;
use crate::error::{DecodeError, Result};

/// Decode manifest bytes into documents, assigning `default_namespace` to
/// namespaced documents without one.
///
/// Identities must be unique within the decoded batch.
pub fn decode_documents(content: &[u8], default_namespace: &str) -> Result<Vec<ResourceDocument>> {
    let text = std::str::from_utf8(content)?;

    let values = if looks_like_json(text) {
        parse_json_stream(text)?
    } else {
        parse_yaml_stream(text)?
    };

    let mut documents = Vec::new();
    for value in values {
        expand_into(value, &mut documents)?;
    }

    let documents: Vec<ResourceDocument> = documents
        .into_iter()
        .map(|doc| doc.with_default_namespace(default_namespace))
        .collect();

    ensure_unique(&documents)?;
    Ok(documents)
}

fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

fn parse_json_stream(text: &str) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
        match value? {
            Value::Array(items) => values.extend(items),
            other => values.push(other),
        }
    }
    Ok(values)
}

fn parse_yaml_stream(text: &str) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        // Empty and comment-only documents
        if value.is_null() {
            continue;
        }
        values.push(value);
    }
    Ok(values)
}

/// Push `value` to `out`, expanding list kinds in place
fn expand_into(value: Value, out: &mut Vec<ResourceDocument>) -> Result<()> {
    if is_list(&value) {
        let index = out.len();
        let Value::Object(mut map) = value else {
            return Err(DecodeError::NotAnObject { index });
        };
        let items = match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        for item in items {
            expand_into(item, out)?;
        }
        return Ok(());
    }

    let index = out.len();
    out.push(ResourceDocument::from_value(value, index)?);
    Ok(())
}

fn is_list(value: &Value) -> bool {
    let is_list_kind = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"));
    is_list_kind && value.get("items").is_some_and(Value::is_array)
}

/// Reject a batch that contains the same identity twice
pub fn ensure_unique(documents: &[ResourceDocument]) -> Result<()> {
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if !seen.insert(doc.identity()) {
            return Err(DecodeError::DuplicateIdentity {
                identity: doc.identity().to_string(),
            });
        }
    }
    Ok(())
}
