//! Normalized, language-agnostic view of an OpenAPI document.

pub mod builder;
pub mod model;

pub use builder::{build_descriptors, is_downloadable};
pub use model::{
    rest_descriptors, schema_descriptors, Descriptor, Field, HttpMethod, ParameterLocation,
    PathSegment, ResourceDescriptor, RestData, SchemaData, SchemaShape, TypeRef, Variable,
};
