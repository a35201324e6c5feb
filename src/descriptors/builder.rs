use super::model::{
    Descriptor, Field, HttpMethod, ParameterLocation, PathSegment, ResourceDescriptor, RestData,
    SchemaData, SchemaShape, TypeRef, Variable,
};
use crate::error::SyncError;
use indexmap::IndexMap;
use openapiv3::{
    Components, IntegerFormat, MediaType, NumberFormat, OpenAPI, Operation, Parameter,
    ParameterSchemaOrContent, PathItem, ReferenceOr, RequestBody, Response, Schema, SchemaKind,
    StatusCode, Type, VariantOrUnknownOrEmpty,
};
use serde_json::Value;
use std::borrow::Borrow;

const DEFAULT_MEDIA_TYPE: &str = "application/json";
const MAX_REF_DEPTH: usize = 16;

const SCHEMAS: &str = "#/components/schemas/";
const PARAMETERS: &str = "#/components/parameters/";
const REQUEST_BODIES: &str = "#/components/requestBodies/";
const RESPONSES: &str = "#/components/responses/";

/// Build the descriptor sequence for one source.
///
/// Operations come first, path by path and method by method in document
/// order, followed by component schemas in document order.
pub fn build_descriptors(
    document: &Value,
    source_id: &str,
) -> Result<Vec<Descriptor>, SyncError> {
    let openapi: OpenAPI = serde_json::from_value(document.clone())
        .map_err(|e| SyncError::spec_parse(source_id, format!("not an OpenAPI document: {e}")))?;

    if !openapi.openapi.starts_with("3.") {
        return Err(SyncError::spec_parse(
            source_id,
            format!("unsupported OpenAPI version '{}'", openapi.openapi),
        ));
    }

    DescriptorBuilder::new(&openapi, document, source_id).build()
}

struct DescriptorBuilder<'a> {
    openapi: &'a OpenAPI,
    /// Raw document; `openapiv3` drops the order of methods within a path.
    document: &'a Value,
    source_id: &'a str,
}

impl<'a> DescriptorBuilder<'a> {
    fn new(openapi: &'a OpenAPI, document: &'a Value, source_id: &'a str) -> Self {
        Self {
            openapi,
            document,
            source_id,
        }
    }

    fn build(&self) -> Result<Vec<Descriptor>, SyncError> {
        let openapi = self.openapi;
        let mut descriptors = Vec::new();

        for (path, path_item_ref) in &openapi.paths.paths {
            let path_item = match path_item_ref {
                ReferenceOr::Item(item) => item,
                ReferenceOr::Reference { reference } => {
                    return Err(self.unsupported(format!(
                        "path item reference '{reference}' for '{path}'"
                    )))
                }
            };
            self.extract_operations_from_path(path, path_item, &mut descriptors)?;
        }

        if let Some(components) = &openapi.components {
            for (name, schema_ref) in &components.schemas {
                descriptors.push(Descriptor::Schema(self.extract_schema(name, schema_ref)?));
            }
        }

        Ok(descriptors)
    }

    fn extract_operations_from_path(
        &self,
        path: &str,
        path_item: &'a PathItem,
        descriptors: &mut Vec<Descriptor>,
    ) -> Result<(), SyncError> {
        let declared = self
            .document
            .get("paths")
            .and_then(|paths| paths.get(path))
            .and_then(Value::as_object);
        let position = |key: &str| {
            declared
                .and_then(|item| item.keys().position(|k| k.eq_ignore_ascii_case(key)))
                .unwrap_or(usize::MAX)
        };

        let mut ops: Vec<(usize, HttpMethod, &'a Operation)> = [
            ("get", &path_item.get, HttpMethod::Get),
            ("put", &path_item.put, HttpMethod::Put),
            ("post", &path_item.post, HttpMethod::Post),
            ("delete", &path_item.delete, HttpMethod::Delete),
            ("options", &path_item.options, HttpMethod::Options),
            ("head", &path_item.head, HttpMethod::Head),
            ("patch", &path_item.patch, HttpMethod::Patch),
            ("trace", &path_item.trace, HttpMethod::Trace),
        ]
        .into_iter()
        .filter_map(|(key, op, method)| op.as_ref().map(|op| (position(key), method, op)))
        .collect();
        ops.sort_by_key(|(declared_at, ..)| *declared_at);

        for (_, method, operation) in ops {
            let variants = self.extract_operation(path, method, path_item, operation)?;
            descriptors.extend(variants.into_iter().map(Descriptor::Rest));
        }

        Ok(())
    }

    /// One descriptor per (request media type, response media type) pair.
    fn extract_operation(
        &self,
        path: &str,
        method: HttpMethod,
        path_item: &'a PathItem,
        operation: &'a Operation,
    ) -> Result<Vec<ResourceDescriptor<RestData>>, SyncError> {
        let operation_id = operation
            .operation_id
            .clone()
            .unwrap_or_else(|| fallback_operation_id(method, path));

        let variables = self.extract_variables(&path_item.parameters, &operation.parameters)?;

        let requests: Vec<(String, Option<TypeRef>)> = match &operation.request_body {
            Some(body_ref) => {
                let body = self.resolve_request_body(body_ref)?;
                self.media_variants(&body.content)?
            }
            None => Vec::new(),
        };
        let requests = if requests.is_empty() {
            vec![(DEFAULT_MEDIA_TYPE.to_string(), None)]
        } else {
            requests
        };

        let responses = match self.success_response(operation)? {
            Some(response) => self.media_variants(&response.content)?,
            None => Vec::new(),
        };
        let has_response_content = !responses.is_empty();
        let responses = if responses.is_empty() {
            vec![(DEFAULT_MEDIA_TYPE.to_string(), None)]
        } else {
            responses
        };

        let mut variants = Vec::with_capacity(requests.len() * responses.len());
        for (content_type, request_body) in &requests {
            for (response_type, response) in &responses {
                variants.push(ResourceDescriptor {
                    id: format!(
                        "{}:{}:{}:{}:{}",
                        self.source_id, method, path, content_type, response_type
                    ),
                    source: self.source_id.to_string(),
                    data: RestData {
                        operation_id: operation_id.clone(),
                        method,
                        paths: PathSegment::parse_path(path),
                        request_body: request_body.clone(),
                        response: response.clone(),
                        variables: variables.clone(),
                        content_type: content_type.clone(),
                        response_type: response_type.clone(),
                        is_downloadable: has_response_content && is_downloadable(response_type),
                        summary: operation.summary.clone(),
                        description: operation.description.clone(),
                        tags: operation.tags.clone(),
                        deprecated: operation.deprecated,
                    },
                });
            }
        }

        Ok(variants)
    }

    /// Path-item parameters first, then operation parameters; an operation
    /// parameter replaces a path-item parameter with the same name and location.
    fn extract_variables(
        &self,
        shared: &'a [ReferenceOr<Parameter>],
        own: &'a [ReferenceOr<Parameter>],
    ) -> Result<Vec<Variable>, SyncError> {
        let mut by_key: IndexMap<(String, ParameterLocation), Variable> = IndexMap::new();

        for param_ref in shared.iter().chain(own) {
            let param = self.resolve_parameter(param_ref)?;
            let variable = self.extract_variable(param)?;
            by_key.insert((variable.name.clone(), variable.location), variable);
        }

        Ok(by_key.into_values().collect())
    }

    fn extract_variable(&self, param: &Parameter) -> Result<Variable, SyncError> {
        let location = match param {
            Parameter::Query { .. } => ParameterLocation::Query,
            Parameter::Header { .. } => ParameterLocation::Header,
            Parameter::Path { .. } => ParameterLocation::Path,
            Parameter::Cookie { .. } => ParameterLocation::Cookie,
        };
        let data = param.parameter_data_ref();

        let type_ref = match &data.format {
            ParameterSchemaOrContent::Schema(schema_ref) => self.type_ref(schema_ref)?,
            ParameterSchemaOrContent::Content(content) => match content.values().next() {
                Some(media) => self.media_type_ref(media)?.unwrap_or_else(TypeRef::any),
                None => TypeRef::any(),
            },
        };

        Ok(Variable {
            name: data.name.clone(),
            location,
            type_ref,
            // Path parameters are always required, whatever the document says.
            required: data.required || location == ParameterLocation::Path,
            description: data.description.clone(),
        })
    }

    /// First 2xx response in declaration order, else `default`.
    fn success_response(
        &self,
        operation: &'a Operation,
    ) -> Result<Option<&'a Response>, SyncError> {
        let success = operation.responses.responses.iter().find(|(status, _)| match status {
            StatusCode::Code(code) => (200..300).contains(code),
            StatusCode::Range(range) => *range == 2,
        });

        let response_ref = match success {
            Some((_, response_ref)) => Some(response_ref),
            None => operation.responses.default.as_ref(),
        };

        response_ref.map(|r| self.resolve_response(r)).transpose()
    }

    fn media_variants(
        &self,
        content: &IndexMap<String, MediaType>,
    ) -> Result<Vec<(String, Option<TypeRef>)>, SyncError> {
        content
            .iter()
            .map(|(media_type, media)| Ok((media_type.clone(), self.media_type_ref(media)?)))
            .collect()
    }

    fn media_type_ref(&self, media: &MediaType) -> Result<Option<TypeRef>, SyncError> {
        media.schema.as_ref().map(|s| self.type_ref(s)).transpose()
    }

    fn extract_schema(
        &self,
        name: &str,
        schema_ref: &ReferenceOr<Schema>,
    ) -> Result<ResourceDescriptor<SchemaData>, SyncError> {
        let (schema_json, description, shape) = match schema_ref {
            ReferenceOr::Reference { reference } => (
                serde_json::json!({ "$ref": reference }),
                None,
                SchemaShape::Alias {
                    target: self.schema_reference(reference)?,
                },
            ),
            ReferenceOr::Item(schema) => {
                let json = serde_json::to_value(schema)
                    .map_err(|e| self.parse_error(format!("schema '{name}': {e}")))?;
                let shape = match &schema.schema_kind {
                    SchemaKind::Type(Type::Object(object)) => SchemaShape::Object {
                        fields: self.extract_fields(&object.properties, &object.required)?,
                    },
                    _ => SchemaShape::Alias {
                        target: self.schema_type_ref(schema)?,
                    },
                };
                (json, schema.schema_data.description.clone(), shape)
            }
        };

        Ok(ResourceDescriptor {
            id: format!("{}:schema:{}", self.source_id, name),
            source: self.source_id.to_string(),
            data: SchemaData {
                name: name.to_string(),
                schema: schema_json,
                description,
                shape,
            },
        })
    }

    fn extract_fields(
        &self,
        properties: &IndexMap<String, ReferenceOr<Box<Schema>>>,
        required: &[String],
    ) -> Result<Vec<Field>, SyncError> {
        properties
            .iter()
            .map(|(field_name, field_schema)| {
                let description = match field_schema {
                    ReferenceOr::Item(schema) => schema.schema_data.description.clone(),
                    ReferenceOr::Reference { .. } => None,
                };
                Ok(Field {
                    name: field_name.clone(),
                    type_ref: self.type_ref(field_schema)?,
                    required: required.contains(field_name),
                    description,
                })
            })
            .collect()
    }

    fn type_ref<S: Borrow<Schema>>(
        &self,
        schema_ref: &ReferenceOr<S>,
    ) -> Result<TypeRef, SyncError> {
        match schema_ref {
            ReferenceOr::Reference { reference } => self.schema_reference(reference),
            ReferenceOr::Item(schema) => self.schema_type_ref(Borrow::<Schema>::borrow(schema)),
        }
    }

    fn schema_reference(&self, reference: &str) -> Result<TypeRef, SyncError> {
        let name = self.component_name(reference, SCHEMAS)?;
        let exists = self
            .components()
            .map(|c| c.schemas.contains_key(name))
            .unwrap_or(false);
        if !exists {
            return Err(self.parse_error(format!("dangling reference '{reference}'")));
        }
        Ok(TypeRef::named(name))
    }

    fn schema_type_ref(&self, schema: &Schema) -> Result<TypeRef, SyncError> {
        let type_ref = match &schema.schema_kind {
            SchemaKind::Type(Type::String(string_type)) => {
                let format = match &string_type.format {
                    VariantOrUnknownOrEmpty::Item(fmt) => Some(string_format(fmt).to_string()),
                    VariantOrUnknownOrEmpty::Unknown(fmt) => Some(fmt.clone()),
                    VariantOrUnknownOrEmpty::Empty => None,
                };
                let values: Vec<String> =
                    string_type.enumeration.iter().flatten().cloned().collect();
                TypeRef {
                    enum_values: (!values.is_empty()).then_some(values),
                    ..TypeRef::primitive("string").with_format(format)
                }
            }
            SchemaKind::Type(Type::Number(num_type)) => {
                let format = match &num_type.format {
                    VariantOrUnknownOrEmpty::Item(NumberFormat::Float) => Some("float".into()),
                    VariantOrUnknownOrEmpty::Item(NumberFormat::Double) => Some("double".into()),
                    VariantOrUnknownOrEmpty::Unknown(fmt) => Some(fmt.clone()),
                    VariantOrUnknownOrEmpty::Empty => None,
                };
                TypeRef::primitive("number").with_format(format)
            }
            SchemaKind::Type(Type::Integer(int_type)) => {
                let format = match &int_type.format {
                    VariantOrUnknownOrEmpty::Item(IntegerFormat::Int32) => Some("int32".into()),
                    VariantOrUnknownOrEmpty::Item(IntegerFormat::Int64) => Some("int64".into()),
                    VariantOrUnknownOrEmpty::Unknown(fmt) => Some(fmt.clone()),
                    VariantOrUnknownOrEmpty::Empty => None,
                };
                TypeRef::primitive("integer").with_format(format)
            }
            SchemaKind::Type(Type::Boolean(_)) => TypeRef::primitive("boolean"),
            SchemaKind::Type(Type::Array(array_type)) => {
                let items = match &array_type.items {
                    Some(items) => self.type_ref(items)?,
                    None => TypeRef::any(),
                };
                TypeRef::array(items)
            }
            SchemaKind::Type(Type::Object(_)) => TypeRef::primitive("object"),
            _ => TypeRef::any(),
        };

        Ok(TypeRef {
            nullable: schema.schema_data.nullable,
            ..type_ref
        })
    }

    fn resolve_parameter(
        &self,
        item: &'a ReferenceOr<Parameter>,
    ) -> Result<&'a Parameter, SyncError> {
        self.resolve(item, PARAMETERS, |c| &c.parameters)
    }

    fn resolve_request_body(
        &self,
        item: &'a ReferenceOr<RequestBody>,
    ) -> Result<&'a RequestBody, SyncError> {
        self.resolve(item, REQUEST_BODIES, |c| &c.request_bodies)
    }

    fn resolve_response(&self, item: &'a ReferenceOr<Response>) -> Result<&'a Response, SyncError> {
        self.resolve(item, RESPONSES, |c| &c.responses)
    }

    /// Follow `$ref`s into one component section until an inline item is found.
    fn resolve<T>(
        &self,
        mut item: &'a ReferenceOr<T>,
        prefix: &str,
        section: impl Fn(&'a Components) -> &'a IndexMap<String, ReferenceOr<T>>,
    ) -> Result<&'a T, SyncError> {
        for _ in 0..MAX_REF_DEPTH {
            match item {
                ReferenceOr::Item(value) => return Ok(value),
                ReferenceOr::Reference { reference } => {
                    let name = self.component_name(reference, prefix)?;
                    item = self
                        .components()
                        .and_then(|c| section(c).get(name))
                        .ok_or_else(|| {
                            self.parse_error(format!("dangling reference '{reference}'"))
                        })?;
                }
            }
        }
        Err(self.parse_error(format!(
            "reference chain deeper than {MAX_REF_DEPTH} under '{prefix}'"
        )))
    }

    fn component_name<'r>(&self, reference: &'r str, prefix: &str) -> Result<&'r str, SyncError> {
        reference
            .strip_prefix(prefix)
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                self.unsupported(format!("reference '{reference}' (expected '{prefix}<name>')"))
            })
    }

    fn components(&self) -> Option<&'a Components> {
        self.openapi.components.as_ref()
    }

    fn parse_error(&self, reason: String) -> SyncError {
        SyncError::spec_parse(self.source_id, reason)
    }

    fn unsupported(&self, reason: String) -> SyncError {
        SyncError::unsupported(self.source_id, reason)
    }
}

fn string_format(format: &openapiv3::StringFormat) -> &'static str {
    match format {
        openapiv3::StringFormat::Date => "date",
        openapiv3::StringFormat::DateTime => "date-time",
        openapiv3::StringFormat::Password => "password",
        openapiv3::StringFormat::Byte => "byte",
        openapiv3::StringFormat::Binary => "binary",
    }
}

fn fallback_operation_id(method: HttpMethod, path: &str) -> String {
    format!(
        "{}_{}",
        method.as_str().to_lowercase(),
        path.trim_matches('/').replace('/', "_").replace(['{', '}'], "")
    )
}

/// Whether a response media type is a file rather than structured data.
pub fn is_downloadable(response_type: &str) -> bool {
    let essence = response_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    !(essence.ends_with("/json") || essence.ends_with("+json") || essence == "text/plain")
}
