use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// One documented unit of a source, tagged with the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor<T> {
    pub id: String,
    pub source: String,
    pub data: T,
}

/// Any descriptor produced for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Descriptor {
    Rest(ResourceDescriptor<RestData>),
    Schema(ResourceDescriptor<SchemaData>),
}

impl Descriptor {
    pub fn id(&self) -> &str {
        match self {
            Descriptor::Rest(d) => &d.id,
            Descriptor::Schema(d) => &d.id,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Descriptor::Rest(d) => &d.source,
            Descriptor::Schema(d) => &d.source,
        }
    }

    pub fn as_rest(&self) -> Option<&ResourceDescriptor<RestData>> {
        match self {
            Descriptor::Rest(d) => Some(d),
            Descriptor::Schema(_) => None,
        }
    }

    pub fn as_schema(&self) -> Option<&ResourceDescriptor<SchemaData>> {
        match self {
            Descriptor::Schema(d) => Some(d),
            Descriptor::Rest(_) => None,
        }
    }
}

/// Iterate the REST descriptors of a descriptor sequence.
pub fn rest_descriptors(
    descriptors: &[Descriptor],
) -> impl Iterator<Item = &ResourceDescriptor<RestData>> {
    descriptors.iter().filter_map(Descriptor::as_rest)
}

/// Iterate the schema descriptors of a descriptor sequence.
pub fn schema_descriptors(
    descriptors: &[Descriptor],
) -> impl Iterator<Item = &ResourceDescriptor<SchemaData>> {
    descriptors.iter().filter_map(Descriptor::as_schema)
}

/// A REST operation, narrowed to one request/response media type pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestData {
    pub operation_id: String,
    pub method: HttpMethod,
    pub paths: Vec<PathSegment>,
    pub request_body: Option<TypeRef>,
    pub response: Option<TypeRef>,
    pub variables: Vec<Variable>,
    pub content_type: String,
    pub response_type: String,
    pub is_downloadable: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl RestData {
    /// The templated path, e.g. `/pets/{petId}`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.paths {
            path.push('/');
            match segment {
                PathSegment::Literal(s) => path.push_str(s),
                PathSegment::Param(name) => {
                    path.push('{');
                    path.push_str(name);
                    path.push('}');
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    pub fn variables_in(&self, location: ParameterLocation) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(move |v| v.location == location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PathSegment {
    Literal(String),
    Param(String),
}

impl PathSegment {
    /// Split a templated path into segments; empty segments are dropped.
    pub fn parse_path(path: &str) -> Vec<PathSegment> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Whether clients should treat the operation as a read.
    pub fn is_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named component schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaData {
    pub name: String,
    /// The schema as written in the document.
    pub schema: JsonValue,
    pub description: Option<String>,
    pub shape: SchemaShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SchemaShape {
    Object { fields: Vec<Field> },
    Alias { target: TypeRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    pub required: bool,
    pub description: Option<String>,
}

/// Reference to a type as used by an operation or a schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub openapi_type: String,
    pub format: Option<String>,
    pub items: Option<Box<TypeRef>>,
    /// Name of the referenced component schema.
    pub reference: Option<String>,
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub nullable: bool,
}

impl TypeRef {
    pub fn primitive(openapi_type: &str) -> Self {
        Self {
            openapi_type: openapi_type.to_string(),
            format: None,
            items: None,
            reference: None,
            enum_values: None,
            nullable: false,
        }
    }

    pub fn any() -> Self {
        Self::primitive("any")
    }

    pub fn named(name: &str) -> Self {
        Self {
            reference: Some(name.to_string()),
            ..Self::primitive("object")
        }
    }

    pub fn array(items: TypeRef) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::primitive("array")
        }
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    pub fn is_array(&self) -> bool {
        self.items.is_some()
    }
}
