//! React client generator: typed fetchers plus TanStack Query hooks.

use super::output::{base_url_of, remove_env_var, upsert_env_var, write_all, OutputFile};
use super::typescript::{
    camel_case, endpoint_shape_tabs, referenced_schemas, render_client, render_schemas_file,
    schema_tabs, screaming_snake, EndpointView, GENERATED_HEADER,
};
use super::{
    parse_options, DocumentationTab, GenerationContext, InitOutcome, LifecycleContext, Plugin,
    PluginMeta, SourceContext,
};
use crate::conflicts::ConflictResolution;
use crate::descriptors::{
    rest_descriptors, schema_descriptors, Descriptor, ResourceDescriptor, RestData, SchemaData,
};
use crate::stats::category;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tera::{Context, Tera};
use tracing::info;

const HOOKS_TEMPLATE: &str = r#"{{ header }}
// Source: {{ title }}

import { useMutation, useQuery{% if suspense %}, useSuspenseQuery{% endif %} } from "@tanstack/react-query";
import type { UseMutationOptions, UseQueryOptions } from "@tanstack/react-query";
import { request } from "./client";
{% if imports %}import type { {{ imports | join(sep=", ") }} } from "./schemas";
{% endif %}{% for hook in hooks %}
{% if hook.summary %}/** {{ hook.summary }}{% if hook.deprecated %} @deprecated{% endif %} */
{% elif hook.deprecated %}/** @deprecated */
{% endif %}export function {{ hook.name }}({{ hook.fetch_args }}): Promise<{{ hook.response_type }}> {
  return request<{{ hook.response_type }}>({{ hook.request_options }}, init);
}
{% if hook.is_query %}
export const {{ hook.name }}QueryKey = ({{ hook.signature }}) => [{{ source_key }}, "{{ hook.operation_id }}"{% for arg in hook.arg_names %}, {{ arg }}{% endfor %}] as const;

export function use{{ hook.type_name }}({{ hook.hook_args }}options?: Omit<UseQueryOptions<{{ hook.response_type }}>, "queryKey" | "queryFn">) {
  return useQuery({
    queryKey: {{ hook.name }}QueryKey({{ hook.call_args }}),
    queryFn: ({ signal }) => {{ hook.name }}({{ hook.call_prefix }}{ signal }),
    ...options,
  });
}
{% if suspense %}
export function use{{ hook.type_name }}Suspense({{ hook.signature }}) {
  return useSuspenseQuery({
    queryKey: {{ hook.name }}QueryKey({{ hook.call_args }}),
    queryFn: ({ signal }) => {{ hook.name }}({{ hook.call_prefix }}{ signal }),
  });
}
{% endif %}{% else %}
export function use{{ hook.type_name }}(options?: Omit<UseMutationOptions<{{ hook.response_type }}, Error, {{ hook.variables_type }}>, "mutationFn">) {
  return useMutation({
    mutationFn: ({{ hook.variables_arg }}) => {{ hook.name }}({{ hook.mutation_call }}),
    ...options,
  });
}
{% endif %}{% endfor %}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactOptions {
    /// Also emit `useSuspenseQuery` variants for read endpoints.
    #[serde(default)]
    pub suspense: bool,
    /// Env file maintained by source bookkeeping, relative to the project.
    #[serde(default)]
    pub env_file: Option<String>,
}

impl ReactOptions {
    fn env_file(&self) -> &str {
        self.env_file.as_deref().unwrap_or(".env")
    }
}

/// `EndpointView` plus the argument plumbing the hooks template needs.
#[derive(Debug, Clone, Serialize)]
struct HookView {
    #[serde(flatten)]
    endpoint: EndpointView,
    signature: String,
    fetch_args: String,
    hook_args: String,
    arg_names: Vec<&'static str>,
    call_args: String,
    call_prefix: String,
    request_options: String,
    variables_type: String,
    variables_arg: String,
    mutation_call: String,
}

impl HookView {
    fn new(endpoint: EndpointView) -> Self {
        let signature = endpoint.signature();
        let mut arg_names = Vec::new();
        if endpoint.params_type.is_some() {
            arg_names.push("params");
        }
        if endpoint.body_type.is_some() {
            arg_names.push("body");
        }
        let call_args = arg_names.join(", ");
        let with_comma = |s: &str| if s.is_empty() { String::new() } else { format!("{s}, ") };

        let (variables_type, variables_arg, mutation_call) =
            match (&endpoint.params_type, &endpoint.body_type) {
                (None, None) => ("void".to_string(), String::new(), String::new()),
                (Some(params), None) => {
                    (params.clone(), "params".to_string(), "params".to_string())
                }
                (None, Some(body)) => (body.clone(), "body".to_string(), "body".to_string()),
                (Some(params), Some(body)) => (
                    format!("{{ params: {params}; body: {body} }}"),
                    "{ params, body }".to_string(),
                    "params, body".to_string(),
                ),
            };

        Self {
            fetch_args: format!("{}init?: RequestInit", with_comma(&signature)),
            hook_args: with_comma(&signature),
            call_prefix: with_comma(&call_args),
            request_options: endpoint.request_options(),
            signature,
            arg_names,
            call_args,
            variables_type,
            variables_arg,
            mutation_call,
            endpoint,
        }
    }
}

fn base_url_var(source_id: &str) -> String {
    format!("{}_BASE_URL", screaming_snake(source_id))
}

fn render_hooks(
    title: &str,
    source_id: &str,
    descriptors: &[Descriptor],
    conflicts: &ConflictResolution,
    options: &ReactOptions,
) -> Result<String> {
    let mut imports: Vec<String> = Vec::new();
    let hooks: Vec<HookView> = rest_descriptors(descriptors)
        .map(|d| {
            imports.extend(referenced_schemas(&d.data));
            HookView::new(EndpointView::new(d, conflicts))
        })
        .collect();
    imports.sort();
    imports.dedup();

    let mut tera = Tera::default();
    tera.add_raw_template("hooks.ts", HOOKS_TEMPLATE)?;

    let mut context = Context::new();
    context.insert("header", GENERATED_HEADER);
    context.insert("title", title);
    context.insert("source_key", &format!("{source_id:?}"));
    context.insert("suspense", &options.suspense);
    context.insert("imports", &imports);
    context.insert("hooks", &hooks);

    tera.render("hooks.ts", &context)
        .context("Failed to render hooks.ts")
}

pub struct ReactPlugin;

#[async_trait]
impl Plugin for ReactPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            name: "openapi-sync-react".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            compat: "^0.1".to_string(),
            generator: "react".to_string(),
        }
    }

    fn validate_options(&self, options: &Value) -> Result<()> {
        parse_options::<ReactOptions>(options).map(|_| ())
    }

    async fn generate(
        &self,
        descriptors: &[Descriptor],
        ctx: &mut GenerationContext<'_>,
    ) -> Result<()> {
        let options: ReactOptions = parse_options(ctx.options)?;
        let source = ctx.source;
        let client = render_client(
            &source.name,
            &format!("process.env.{}", base_url_var(&source.id)),
        )?;
        let schemas = render_schemas_file(&source.name, schema_descriptors(descriptors));
        let hooks = render_hooks(&source.name, &source.id, descriptors, ctx.conflicts, &options)?;

        let files = [
            OutputFile::new("client.ts", client),
            OutputFile::new("schemas.ts", schemas),
            OutputFile::new("hooks.ts", hooks),
        ];
        write_all(&ctx.source_dir(), &files).await?;

        for _ in rest_descriptors(descriptors) {
            ctx.stats.increment(category::ENDPOINTS);
        }
        for _ in schema_descriptors(descriptors) {
            ctx.stats.increment(category::SCHEMAS);
        }
        Ok(())
    }

    fn schema_documentation(
        &self,
        descriptor: &ResourceDescriptor<SchemaData>,
    ) -> Vec<DocumentationTab> {
        schema_tabs(descriptor)
    }

    fn endpoint_documentation(
        &self,
        descriptor: &ResourceDescriptor<RestData>,
        conflicts: &ConflictResolution,
    ) -> Vec<DocumentationTab> {
        let view = EndpointView::new(descriptor, conflicts);
        let module = camel_case(&descriptor.source);
        let usage = if view.is_query {
            let args = if view.params_type.is_some() { "params" } else { "" };
            format!(
                "import {{ {module} }} from \"./api\";\n\nconst {{ data, isLoading }} = {module}.use{}({args});\n",
                view.type_name
            )
        } else {
            format!(
                "import {{ {module} }} from \"./api\";\n\nconst mutation = {module}.use{}();\nmutation.mutate(variables);\n",
                view.type_name
            )
        };

        let mut tabs = vec![DocumentationTab::new("Usage", "tsx", usage)];
        tabs.extend(endpoint_shape_tabs(descriptor));
        tabs
    }

    async fn init(&self, ctx: &LifecycleContext<'_>) -> Result<InitOutcome> {
        let root = ctx.root_dir.display().to_string();
        Ok(InitOutcome {
            post_init: Some(Box::new(move || {
                vec![
                    "Install the query runtime: npm install @tanstack/react-query".to_string(),
                    format!("Wrap your app in a QueryClientProvider, then import hooks from \"{root}\""),
                ]
            })),
        })
    }

    async fn post_build(&self, ctx: &LifecycleContext<'_>) -> Result<()> {
        let mut index = format!("{GENERATED_HEADER}\n");
        for source in ctx.sources {
            index.push_str(&format!(
                "export * as {} from \"./{}/hooks\";\n",
                camel_case(&source.id),
                source.id
            ));
        }
        let result = write_all(ctx.root_dir, &[OutputFile::new("index.ts", index)]).await?;
        info!(root = %ctx.root_dir.display(), ?result, "react barrel updated");
        Ok(())
    }

    async fn add_source(&self, ctx: &SourceContext<'_>) -> Result<()> {
        let options: ReactOptions = parse_options(ctx.options)?;
        let path = ctx.project_dir.join(options.env_file());
        let key = base_url_var(&ctx.source.id);
        upsert_env_var(&path, &key, &base_url_of(&ctx.source.spec_url)).await?;
        Ok(())
    }

    async fn remove_source(&self, ctx: &SourceContext<'_>) -> Result<()> {
        let options: ReactOptions = parse_options(ctx.options)?;
        let path = ctx.project_dir.join(options.env_file());
        remove_env_var(&path, &base_url_var(&ctx.source.id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::conflicts::resolve_conflicts;
    use crate::descriptors::build_descriptors;
    use crate::stats::StatsCounter;
    use serde_json::json;

    fn petstore() -> Vec<Descriptor> {
        let document = json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}],
                        "responses": {"200": {"description": "ok", "content": {
                            "application/json": {"schema": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}}
                        }}}
                    },
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
                        "responses": {"201": {"description": "created"}}
                    }
                }
            },
            "components": {"schemas": {"Pet": {
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
            }}}
        });
        build_descriptors(&document, "petstore").unwrap()
    }

    fn source() -> SourceConfig {
        SourceConfig {
            id: "petstore".into(),
            name: "Petstore".into(),
            spec_url: "https://api.example.com/openapi.json".into(),
        }
    }

    #[test]
    fn options_reject_unknown_keys() {
        assert!(ReactPlugin.validate_options(&json!({"suspense": true})).is_ok());
        assert!(ReactPlugin.validate_options(&json!({})).is_ok());
        assert!(ReactPlugin.validate_options(&json!({"suspence": true})).is_err());
    }

    #[test]
    fn hooks_cover_queries_and_mutations() {
        let descriptors = petstore();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let options = ReactOptions::default();
        let hooks =
            render_hooks("Petstore", "petstore", &descriptors, &conflicts, &options).unwrap();

        assert!(hooks.starts_with(GENERATED_HEADER));
        assert!(hooks.contains("import type { Pet } from \"./schemas\";"));
        assert!(hooks.contains("export function listPets(params: { limit?: number } = {}, init?: RequestInit): Promise<Array<Pet>>"));
        assert!(hooks.contains("export function useListPets(params: { limit?: number } = {}, options?:"));
        assert!(hooks.contains("queryKey: listPetsQueryKey(params),"));
        assert!(hooks.contains("export function useCreatePet(options?: Omit<UseMutationOptions<void, Error, Pet>, \"mutationFn\">)"));
        assert!(hooks.contains("mutationFn: (body) => createPet(body),"));
        assert!(!hooks.contains("useSuspenseQuery"));
    }

    #[test]
    fn suspense_variants_are_opt_in() {
        let descriptors = petstore();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let options = ReactOptions {
            suspense: true,
            env_file: None,
        };
        let hooks =
            render_hooks("Petstore", "petstore", &descriptors, &conflicts, &options).unwrap();
        assert!(hooks.contains("export function useListPetsSuspense("));
    }

    #[test]
    fn usage_tab_names_the_postfixed_hook() {
        let document = json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "paths": {"/pets": {"get": {
                "operationId": "listPets",
                "responses": {"200": {"description": "ok", "content": {
                    "application/json": {"schema": {"type": "array", "items": {"type": "string"}}},
                    "text/csv": {"schema": {"type": "string"}}
                }}}
            }}}
        });
        let descriptors = build_descriptors(&document, "petstore").unwrap();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let csv = rest_descriptors(&descriptors)
            .find(|d| d.data.response_type == "text/csv")
            .unwrap();

        let tabs = ReactPlugin.endpoint_documentation(csv, &conflicts);
        assert!(tabs[0].content.contains("petstore.useListPetsCsv("));
        assert!(!tabs[0].content.contains("useListPets("));
    }

    #[tokio::test]
    async fn generate_writes_files_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = petstore();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let source = source();
        let mut stats = StatsCounter::new("petstore");
        let options = json!({});
        let mut ctx = GenerationContext {
            root_dir: dir.path(),
            source: &source,
            stats: &mut stats,
            conflicts: &conflicts,
            options: &options,
        };
        ReactPlugin.generate(&descriptors, &mut ctx).await.unwrap();

        for file in ["client.ts", "schemas.ts", "hooks.ts"] {
            assert!(dir.path().join("petstore").join(file).exists(), "{file}");
        }
        let client = std::fs::read_to_string(dir.path().join("petstore/client.ts")).unwrap();
        assert!(client.contains("process.env.PETSTORE_BASE_URL"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.get(category::ENDPOINTS), 2);
        assert_eq!(snapshot.get(category::SCHEMAS), 1);
    }

    #[tokio::test]
    async fn source_bookkeeping_maintains_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let options = json!({});
        let ctx = SourceContext {
            project_dir: dir.path(),
            root_dir: dir.path(),
            source: &source,
            options: &options,
        };
        ReactPlugin.add_source(&ctx).await.unwrap();
        let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(env, "PETSTORE_BASE_URL=https://api.example.com\n");

        ReactPlugin.remove_source(&ctx).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(".env")).unwrap(), "");
    }

    #[tokio::test]
    async fn post_build_writes_barrel() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            source(),
            SourceConfig {
                id: "billing-api".into(),
                name: "Billing".into(),
                spec_url: "./billing.yaml".into(),
            },
        ];
        let options = json!({});
        let ctx = LifecycleContext {
            project_dir: dir.path(),
            root_dir: dir.path(),
            sources: &sources,
            options: &options,
        };
        ReactPlugin.post_build(&ctx).await.unwrap();
        let index = std::fs::read_to_string(dir.path().join("index.ts")).unwrap();
        assert!(index.contains("export * as petstore from \"./petstore/hooks\";\n"));
        assert!(index.contains("export * as billingApi from \"./billing-api/hooks\";\n"));
    }

    #[tokio::test]
    async fn init_returns_hint() {
        let dir = tempfile::tempdir().unwrap();
        let options = json!({});
        let ctx = LifecycleContext {
            project_dir: dir.path(),
            root_dir: dir.path(),
            sources: &[],
            options: &options,
        };
        let outcome = ReactPlugin.init(&ctx).await.unwrap();
        let lines = (outcome.post_init.unwrap())();
        assert!(lines[0].contains("@tanstack/react-query"));
    }
}
