//! Operation-id collision detection and postfix assignment.
//!
//! Operations that share an `operationId` but differ by request or response
//! media type get a postfix so every generated symbol name stays unique.
//!
//! Each media type maps to a short PascalCase code (`application/json` becomes
//! `Json`, `text/csv` becomes `Csv`). Inside one collision group the postfix is
//! built from whichever half of the `(contentType, responseType)` pair varies:
//!
//! | group varies by      | postfix                 |
//! |----------------------|-------------------------|
//! | response type only   | `{response}`            |
//! | content type only    | `{content}`             |
//! | both                 | `{content}To{response}` |
//!
//! When two members still end up with the same code (two exotic media types
//! that abbreviate alike) every member of the group gets `_` plus the first
//! 8 hex digits of a SHA-256 over `"{contentType}\n{responseType}"` appended.
//! The result depends only on the set of pairs in the group, never on the
//! order descriptors were produced in.

use crate::descriptors::{rest_descriptors, Descriptor, ResourceDescriptor, RestData};
use crate::error::SyncError;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Postfix assignment for one source's descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictResolution {
    conflicting_operation_ids: BTreeSet<String>,
    /// Descriptor id -> postfix, only for descriptors in a collision group.
    postfixes: BTreeMap<String, String>,
}

impl ConflictResolution {
    /// Operation ids shared by two or more descriptors.
    pub fn conflicting_operation_ids(&self) -> &BTreeSet<String> {
        &self.conflicting_operation_ids
    }

    pub fn is_conflicting(&self, operation_id: &str) -> bool {
        self.conflicting_operation_ids.contains(operation_id)
    }

    /// Postfix for a descriptor; empty when its operation id is unique.
    pub fn postfix(&self, descriptor_id: &str) -> &str {
        self.postfixes.get(descriptor_id).map(String::as_str).unwrap_or("")
    }

    /// Operation id with the descriptor's postfix applied.
    pub fn symbol_name(&self, descriptor: &ResourceDescriptor<RestData>) -> String {
        format!("{}{}", descriptor.data.operation_id, self.postfix(&descriptor.id))
    }

    pub fn postfixes(&self) -> &BTreeMap<String, String> {
        &self.postfixes
    }
}

/// Compute the conflict set and postfixes for one source.
///
/// Fails with [`SyncError::DuplicateDescriptor`] when two descriptors share
/// operation id, content type and response type.
pub fn resolve_conflicts(descriptors: &[Descriptor]) -> Result<ConflictResolution, SyncError> {
    let mut groups: BTreeMap<&str, Vec<&ResourceDescriptor<RestData>>> = BTreeMap::new();
    for descriptor in rest_descriptors(descriptors) {
        groups
            .entry(descriptor.data.operation_id.as_str())
            .or_default()
            .push(descriptor);
    }

    let mut resolution = ConflictResolution::default();

    for (operation_id, mut members) in groups {
        if members.len() < 2 {
            continue;
        }

        members.sort_by(|a, b| media_pair(a).cmp(&media_pair(b)).then_with(|| a.id.cmp(&b.id)));
        if let Some(pair) = members.windows(2).find(|w| media_pair(w[0]) == media_pair(w[1])) {
            let (first, second) = (pair[0], pair[1]);
            return Err(SyncError::DuplicateDescriptor {
                source_id: first.source.clone(),
                operation_id: operation_id.to_string(),
                content_type: first.data.content_type.clone(),
                response_type: first.data.response_type.clone(),
                first: first.id.clone(),
                second: second.id.clone(),
            });
        }

        resolution
            .conflicting_operation_ids
            .insert(operation_id.to_string());
        for (id, postfix) in group_postfixes(&members) {
            resolution.postfixes.insert(id, postfix);
        }
    }

    Ok(resolution)
}

fn media_pair(descriptor: &ResourceDescriptor<RestData>) -> (&str, &str) {
    (
        descriptor.data.content_type.as_str(),
        descriptor.data.response_type.as_str(),
    )
}

/// Postfixes for one collision group whose media pairs are pairwise distinct.
fn group_postfixes(members: &[&ResourceDescriptor<RestData>]) -> Vec<(String, String)> {
    let same_content = all_equal(members.iter().map(|d| d.data.content_type.as_str()));
    let same_response = all_equal(members.iter().map(|d| d.data.response_type.as_str()));

    let mut assigned: Vec<(String, String)> = members
        .iter()
        .map(|d| {
            let content = media_code(&d.data.content_type);
            let response = media_code(&d.data.response_type);
            let postfix = if same_content {
                response
            } else if same_response {
                content
            } else {
                format!("{content}To{response}")
            };
            (d.id.clone(), postfix)
        })
        .collect();

    let distinct: BTreeSet<&str> = assigned.iter().map(|(_, p)| p.as_str()).collect();
    if distinct.len() != assigned.len() {
        for ((_, postfix), d) in assigned.iter_mut().zip(members) {
            postfix.push('_');
            postfix.push_str(&pair_digest(&d.data.content_type, &d.data.response_type));
        }
    }

    assigned
}

fn all_equal<'s>(mut values: impl Iterator<Item = &'s str>) -> bool {
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

/// Short readable code for a media type.
pub fn media_code(media_type: &str) -> String {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let known = match essence.as_str() {
        "application/json" => Some("Json"),
        "application/xml" | "text/xml" => Some("Xml"),
        "text/plain" => Some("Text"),
        "text/html" => Some("Html"),
        "text/csv" => Some("Csv"),
        "multipart/form-data" => Some("FormData"),
        "application/x-www-form-urlencoded" => Some("UrlEncoded"),
        "application/octet-stream" => Some("Blob"),
        "application/pdf" => Some("Pdf"),
        "application/zip" => Some("Zip"),
        "application/x-ndjson" => Some("NdJson"),
        "text/event-stream" => Some("EventStream"),
        "*/*" => Some("Any"),
        _ => None,
    };
    if let Some(code) = known {
        return code.to_string();
    }

    let subtype = essence.rsplit('/').next().unwrap_or(&essence);
    let code = pascal_case(subtype);
    if code.is_empty() {
        "Media".to_string()
    } else {
        code
    }
}

fn pascal_case(value: &str) -> String {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn pair_digest(content_type: &str, response_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(response_type.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}
