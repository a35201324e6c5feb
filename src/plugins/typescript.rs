//! TypeScript emission shared by the built-in plugins.

use super::DocumentationTab;
use crate::conflicts::ConflictResolution;
use crate::descriptors::{
    ParameterLocation, PathSegment, ResourceDescriptor, RestData, SchemaData, SchemaShape, TypeRef,
};
use serde::Serialize;

pub const GENERATED_HEADER: &str = "// This file is generated by openapi-sync. Do not edit by hand.";

const CLIENT_TEMPLATE: &str = r#"{{ header }}
// Source: {{ title }}

export type ResponseKind = "json" | "text" | "blob" | "none";

export interface RequestOptions {
  method: string;
  path: string;
  query?: Record<string, unknown>;
  headers?: Record<string, unknown>;
  body?: unknown;
  contentType?: string;
  responseKind: ResponseKind;
}

export const baseUrl: string = {{ base_url }} ?? "";

export async function request<T>(options: RequestOptions, init: RequestInit = {}): Promise<T> {
  const origin = typeof window === "undefined" ? "http://localhost" : window.location.origin;
  const url = new URL(baseUrl + options.path, origin);
  for (const [key, value] of Object.entries(options.query ?? {})) {
    if (value !== undefined && value !== null) url.searchParams.set(key, String(value));
  }
  const headers = new Headers(init.headers);
  for (const [key, value] of Object.entries(options.headers ?? {})) {
    if (value !== undefined && value !== null) headers.set(key, String(value));
  }
  let body: BodyInit | undefined;
  if (options.body !== undefined) {
    if (options.contentType === "multipart/form-data") {
      body = options.body as FormData;
    } else if (options.contentType && /[/+]json$/.test(options.contentType)) {
      headers.set("Content-Type", options.contentType);
      body = JSON.stringify(options.body);
    } else {
      if (options.contentType) headers.set("Content-Type", options.contentType);
      body = options.body as BodyInit;
    }
  }
  const response = await fetch(url, { ...init, method: options.method, headers, body });
  if (!response.ok) {
    throw new Error(`${options.method} ${options.path} failed with status ${response.status}`);
  }
  switch (options.responseKind) {
    case "json":
      return (await response.json()) as T;
    case "text":
      return (await response.text()) as T;
    case "blob":
      return (await response.blob()) as T;
    default:
      return undefined as T;
  }
}
"#;

/// The fetch wrapper every generated endpoint calls through.
///
/// `base_url` is a TypeScript expression, typically an environment lookup.
pub fn render_client(title: &str, base_url: &str) -> tera::Result<String> {
    let mut context = tera::Context::new();
    context.insert("header", GENERATED_HEADER);
    context.insert("title", title);
    context.insert("base_url", base_url);
    tera::Tera::one_off(CLIENT_TEMPLATE, &context, false)
}

pub fn ts_type(type_ref: &TypeRef) -> String {
    let base = if let Some(items) = &type_ref.items {
        format!("Array<{}>", ts_type(items))
    } else if let Some(name) = &type_ref.reference {
        pascal_case(name)
    } else if let Some(values) = &type_ref.enum_values {
        values
            .iter()
            .map(|v| format!("{v:?}"))
            .collect::<Vec<_>>()
            .join(" | ")
    } else {
        match type_ref.openapi_type.as_str() {
            "string" => match type_ref.format.as_deref() {
                Some("binary") => "Blob".to_string(),
                _ => "string".to_string(),
            },
            "integer" | "number" => "number".to_string(),
            "boolean" => "boolean".to_string(),
            "object" => "Record<string, unknown>".to_string(),
            _ => "unknown".to_string(),
        }
    };

    if type_ref.nullable {
        format!("{base} | null")
    } else {
        base
    }
}

/// Type used for a request body of the given media type.
pub fn body_type(data: &RestData) -> Option<String> {
    let essence = essence(&data.content_type);
    match essence.as_str() {
        "multipart/form-data" => Some("FormData".to_string()),
        "application/x-www-form-urlencoded" => Some("URLSearchParams".to_string()),
        "application/octet-stream" => Some("Blob".to_string()),
        _ => data.request_body.as_ref().map(ts_type),
    }
}

/// Type a successful call resolves to.
pub fn response_type(data: &RestData) -> String {
    if data.is_downloadable {
        return "Blob".to_string();
    }
    match &data.response {
        Some(response) => ts_type(response),
        None if essence(&data.response_type) == "text/plain" => "string".to_string(),
        None => "void".to_string(),
    }
}

/// How the client should read the response body.
pub fn response_kind(data: &RestData) -> &'static str {
    if data.is_downloadable {
        "blob"
    } else if essence(&data.response_type) == "text/plain" {
        "text"
    } else if data.response.is_none() {
        "none"
    } else {
        "json"
    }
}

fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn camel_case(value: &str) -> String {
    let pascal = pascal_case(value);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => pascal,
    }
}

/// `listPets` -> `ListPets`, `get_pet-by id` -> `GetPetById`.
pub fn pascal_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut upper_next = true;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                out.push(c.to_ascii_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        } else {
            upper_next = true;
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// `pet-store` -> `PET_STORE`.
pub fn screaming_snake(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_lower = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Object key as written in a type or object literal.
pub fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("{name:?}")
    }
}

/// Expression reading `name` from `object`.
pub fn accessor(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{name:?}]")
    }
}

fn doc_comment(out: &mut String, indent: &str, text: Option<&str>) {
    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str(indent);
        out.push_str("/** ");
        out.push_str(&text.replace("*/", "*\\/").replace('\n', " "));
        out.push_str(" */\n");
    }
}

pub fn render_schema(schema: &SchemaData) -> String {
    let mut out = String::new();
    let name = pascal_case(&schema.name);
    doc_comment(&mut out, "", schema.description.as_deref());

    match &schema.shape {
        SchemaShape::Object { fields } => {
            out.push_str(&format!("export interface {name} {{\n"));
            for field in fields {
                doc_comment(&mut out, "  ", field.description.as_deref());
                let optional = if field.required { "" } else { "?" };
                out.push_str(&format!(
                    "  {}{}: {};\n",
                    property_key(&field.name),
                    optional,
                    ts_type(&field.type_ref)
                ));
            }
            out.push_str("}\n");
        }
        SchemaShape::Alias { target } => {
            out.push_str(&format!("export type {name} = {};\n", ts_type(target)));
        }
    }

    out
}

pub fn render_schemas_file<'d>(
    title: &str,
    schemas: impl Iterator<Item = &'d ResourceDescriptor<SchemaData>>,
) -> String {
    let mut out = format!("{GENERATED_HEADER}\n// Source: {title}\n");
    for schema in schemas {
        out.push('\n');
        out.push_str(&render_schema(&schema.data));
    }
    out
}

/// Names of component schemas an endpoint mentions, sorted and deduplicated.
pub fn referenced_schemas(data: &RestData) -> Vec<String> {
    fn collect(type_ref: &TypeRef, names: &mut Vec<String>) {
        if let Some(name) = &type_ref.reference {
            names.push(pascal_case(name));
        }
        if let Some(items) = &type_ref.items {
            collect(items, names);
        }
    }

    let mut names = Vec::new();
    for type_ref in data
        .request_body
        .iter()
        .chain(data.response.iter())
        .chain(data.variables.iter().map(|v| &v.type_ref))
    {
        collect(type_ref, &mut names);
    }
    names.sort();
    names.dedup();
    names
}

#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// Template-facing view of one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    /// camelCase symbol including the collision postfix.
    pub name: String,
    /// PascalCase symbol including the collision postfix.
    pub type_name: String,
    pub operation_id: String,
    pub method: String,
    pub path: String,
    /// JavaScript template literal body producing the request path.
    pub url: String,
    pub params_type: Option<String>,
    pub params_required: bool,
    pub query: Vec<Entry>,
    pub headers: Vec<Entry>,
    pub body_type: Option<String>,
    pub response_type: String,
    pub response_kind: String,
    pub content_type: String,
    pub is_query: bool,
    pub summary: Option<String>,
    pub deprecated: bool,
}

impl EndpointView {
    pub fn new(descriptor: &ResourceDescriptor<RestData>, conflicts: &ConflictResolution) -> Self {
        let symbol = conflicts.symbol_name(descriptor);
        Self::with_symbol(&descriptor.data, &symbol)
    }

    fn with_symbol(data: &RestData, symbol: &str) -> Self {
        let url: String = data
            .paths
            .iter()
            .map(|segment| match segment {
                PathSegment::Literal(s) => format!("/{s}"),
                PathSegment::Param(name) => format!(
                    "/${{encodeURIComponent(String({}))}}",
                    accessor("params", name)
                ),
            })
            .collect();

        let entries = |location: ParameterLocation| -> Vec<Entry> {
            data.variables_in(location)
                .map(|v| Entry {
                    key: property_key(&v.name),
                    value: accessor("params", &v.name),
                })
                .collect()
        };

        Self {
            name: camel_case(symbol),
            type_name: pascal_case(symbol),
            operation_id: data.operation_id.clone(),
            method: data.method.as_str().to_string(),
            path: data.path(),
            url: if url.is_empty() { "/".to_string() } else { url },
            params_type: params_type(data),
            params_required: data.variables.iter().any(|v| v.required),
            query: entries(ParameterLocation::Query),
            headers: entries(ParameterLocation::Header),
            body_type: body_type(data),
            response_type: response_type(data),
            response_kind: response_kind(data).to_string(),
            content_type: data.content_type.clone(),
            is_query: data.method.is_query(),
            summary: data.summary.clone().or_else(|| data.description.clone()),
            deprecated: data.deprecated,
        }
    }

    /// Parameter list for a function taking this endpoint's inputs.
    pub fn signature(&self) -> String {
        let mut args = Vec::new();
        if let Some(params) = &self.params_type {
            if self.params_required {
                args.push(format!("params: {params}"));
            } else {
                args.push(format!("params: {params} = {{}}"));
            }
        }
        if let Some(body) = &self.body_type {
            args.push(format!("body: {body}"));
        }
        args.join(", ")
    }

    /// `request(...)` options object literal.
    pub fn request_options(&self) -> String {
        let mut fields = vec![
            format!("method: {:?}", self.method),
            format!("path: `{}`", self.url),
        ];
        if !self.query.is_empty() {
            fields.push(format!("query: {{ {} }}", render_entries(&self.query)));
        }
        if !self.headers.is_empty() {
            fields.push(format!("headers: {{ {} }}", render_entries(&self.headers)));
        }
        if self.body_type.is_some() {
            fields.push("body".to_string());
            fields.push(format!("contentType: {:?}", self.content_type));
        }
        fields.push(format!("responseKind: {:?}", self.response_kind));
        format!("{{ {} }}", fields.join(", "))
    }
}

fn render_entries(entries: &[Entry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.key, e.value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Object type literal of an endpoint's variables, `None` without variables.
pub fn params_type(data: &RestData) -> Option<String> {
    if data.variables.is_empty() {
        return None;
    }
    let fields: Vec<String> = data
        .variables
        .iter()
        .map(|v| {
            let optional = if v.required { "" } else { "?" };
            format!("{}{}: {}", property_key(&v.name), optional, ts_type(&v.type_ref))
        })
        .collect();
    Some(format!("{{ {} }}", fields.join("; ")))
}

pub fn schema_tabs(descriptor: &ResourceDescriptor<SchemaData>) -> Vec<DocumentationTab> {
    let json = serde_json::to_string_pretty(&descriptor.data.schema)
        .unwrap_or_else(|_| descriptor.data.schema.to_string());
    vec![
        DocumentationTab::new("TypeScript Type", "typescript", render_schema(&descriptor.data)),
        DocumentationTab::new("JSON Schema", "json", json),
    ]
}

/// `Request` and `Response` tabs shared by every TypeScript plugin.
pub fn endpoint_shape_tabs(descriptor: &ResourceDescriptor<RestData>) -> Vec<DocumentationTab> {
    let data = &descriptor.data;
    let mut request = format!(
        "{} {}\nContent-Type: {}\n",
        data.method,
        data.path(),
        data.content_type
    );
    for location in [
        ParameterLocation::Path,
        ParameterLocation::Query,
        ParameterLocation::Header,
        ParameterLocation::Cookie,
    ] {
        let vars: Vec<String> = data
            .variables_in(location)
            .map(|v| {
                let optional = if v.required { "" } else { "?" };
                format!("  {}{}: {}", property_key(&v.name), optional, ts_type(&v.type_ref))
            })
            .collect();
        if !vars.is_empty() {
            request.push_str(&format!(
                "\n{} parameters:\n{}\n",
                location.as_str(),
                vars.join("\n")
            ));
        }
    }
    if let Some(body) = body_type(data) {
        request.push_str(&format!("\nbody: {body}\n"));
    }

    let response = format!(
        "Accept: {}\nresolves to: {}{}\n",
        data.response_type,
        response_type(data),
        if data.is_downloadable { " (download)" } else { "" }
    );

    vec![
        DocumentationTab::new("Request", "http", request),
        DocumentationTab::new("Response", "typescript", response),
    ]
}
