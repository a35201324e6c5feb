//! Next.js generator: server-side fetchers and route handler proxies.

use super::output::{base_url_of, remove_env_var, upsert_env_var, write_all, OutputFile};
use super::typescript::{
    camel_case, endpoint_shape_tabs, referenced_schemas, render_client, render_schemas_file,
    schema_tabs, screaming_snake, EndpointView, GENERATED_HEADER,
};
use super::{
    parse_options, DocumentationTab, GenerationContext, Plugin, PluginMeta, SourceContext,
};
use crate::conflicts::ConflictResolution;
use crate::descriptors::{
    rest_descriptors, schema_descriptors, Descriptor, PathSegment, ResourceDescriptor, RestData,
    SchemaData,
};
use crate::stats::category;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NextOptions {
    /// ISR window in seconds for server fetchers; uncached when unset.
    #[serde(default)]
    pub revalidate: Option<u64>,
    #[serde(default)]
    pub env_file: Option<String>,
}

impl NextOptions {
    fn env_file(&self) -> &str {
        self.env_file.as_deref().unwrap_or(".env.local")
    }

    fn fetch_init(&self) -> String {
        match self.revalidate {
            Some(seconds) => format!("{{ next: {{ revalidate: {seconds} }}, ...init }}"),
            None => "{ cache: \"no-store\", ...init }".to_string(),
        }
    }
}

fn base_url_var(source_id: &str) -> String {
    format!("NEXT_PUBLIC_{}_BASE_URL", screaming_snake(source_id))
}

fn schema_import(descriptors: &[Descriptor]) -> String {
    let mut names: Vec<String> = rest_descriptors(descriptors)
        .flat_map(|d| referenced_schemas(&d.data))
        .collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        String::new()
    } else {
        format!("import type {{ {} }} from \"./schemas\";\n", names.join(", "))
    }
}

fn render_server(
    title: &str,
    descriptors: &[Descriptor],
    conflicts: &ConflictResolution,
    options: &NextOptions,
) -> String {
    let mut out = format!(
        "{GENERATED_HEADER}\n// Source: {title}\n\nimport \"server-only\";\nimport {{ request }} from \"./request\";\n"
    );
    out.push_str(&schema_import(descriptors));

    for descriptor in rest_descriptors(descriptors) {
        let view = EndpointView::new(descriptor, conflicts);
        let signature = view.signature();
        let args = if signature.is_empty() {
            "init?: RequestInit".to_string()
        } else {
            format!("{signature}, init?: RequestInit")
        };
        out.push('\n');
        if let Some(summary) = &view.summary {
            out.push_str(&format!("/** {} */\n", summary.replace("*/", "*\\/")));
        }
        out.push_str(&format!(
            "export async function {}({args}): Promise<{}> {{\n  return request<{}>({}, {});\n}}\n",
            view.name,
            view.response_type,
            view.response_type,
            view.request_options(),
            options.fetch_init(),
        ));
    }
    out
}

const FORWARD_HELPER: &str = r#"type RouteContext = { params: Promise<Record<string, string>> };

async function forward(req: Request, method: string, path: string): Promise<Response> {
  const incoming = new URL(req.url);
  const origin = baseUrl || incoming.origin;
  const url = new URL(path + incoming.search, origin);
  const headers = new Headers(req.headers);
  headers.delete("host");
  const hasBody = method !== "GET" && method !== "HEAD";
  const response = await fetch(url, {
    method,
    headers,
    body: hasBody ? await req.arrayBuffer() : undefined,
    cache: "no-store",
  });
  return new Response(response.body, { status: response.status, headers: response.headers });
}
"#;

fn render_routes(
    title: &str,
    descriptors: &[Descriptor],
    conflicts: &ConflictResolution,
) -> String {
    let mut out = format!(
        "{GENERATED_HEADER}\n// Source: {title}\n\nimport {{ baseUrl }} from \"./request\";\n\n{FORWARD_HELPER}"
    );

    for descriptor in rest_descriptors(descriptors) {
        let view = EndpointView::new(descriptor, conflicts);
        let has_path_params = descriptor
            .data
            .paths
            .iter()
            .any(|segment| matches!(segment, PathSegment::Param(_)));
        out.push_str(&format!(
            "\n/** Proxies {} {} */\nexport async function {}Route(req: Request, context: RouteContext): Promise<Response> {{\n",
            view.method, view.path, view.name
        ));
        if has_path_params {
            out.push_str("  const params = await context.params;\n");
        } else {
            out.push_str("  void context;\n");
        }
        out.push_str(&format!(
            "  return forward(req, {:?}, `{}`);\n}}\n",
            view.method, view.url
        ));
    }
    out
}

pub struct NextPlugin;

#[async_trait]
impl Plugin for NextPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            name: "openapi-sync-next".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            compat: "^0.1".to_string(),
            generator: "next".to_string(),
        }
    }

    fn validate_options(&self, options: &Value) -> Result<()> {
        parse_options::<NextOptions>(options).map(|_| ())
    }

    async fn generate(
        &self,
        descriptors: &[Descriptor],
        ctx: &mut GenerationContext<'_>,
    ) -> Result<()> {
        let options: NextOptions = parse_options(ctx.options)?;
        let source = ctx.source;

        let files = [
            OutputFile::new(
                "request.ts",
                render_client(&source.name, &format!("process.env.{}", base_url_var(&source.id)))?,
            ),
            OutputFile::new(
                "schemas.ts",
                render_schemas_file(&source.name, schema_descriptors(descriptors)),
            ),
            OutputFile::new(
                "server.ts",
                render_server(&source.name, descriptors, ctx.conflicts, &options),
            ),
            OutputFile::new("routes.ts", render_routes(&source.name, descriptors, ctx.conflicts)),
        ];
        write_all(&ctx.source_dir(), &files).await?;

        let endpoints = rest_descriptors(descriptors).count() as u64;
        ctx.stats.increment_by(category::ENDPOINTS, endpoints);
        ctx.stats.increment_by(category::SERVER_SIDE_ENDPOINTS, endpoints);
        ctx.stats
            .increment_by(category::SCHEMAS, schema_descriptors(descriptors).count() as u64);
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
        let source = &descriptor.source;
        let mut args = Vec::new();
        if view.params_type.is_some() {
            args.push("params");
        }
        if view.body_type.is_some() {
            args.push("body");
        }
        let usage = format!(
            "// Server component or action\nimport {{ {name} }} from \"@/api/{source}/server\";\n\nconst data = await {name}({args});\n\n\
             // app/api/{module}{path}/route.ts\nexport {{ {name}Route as {method} }} from \"@/api/{source}/routes\";\n",
            name = view.name,
            args = args.join(", "),
            module = camel_case(source),
            path = descriptor.data.path(),
            method = view.method,
        );

        let mut tabs = vec![DocumentationTab::new("Usage", "typescript", usage)];
        tabs.extend(endpoint_shape_tabs(descriptor));
        tabs
    }

    async fn add_source(&self, ctx: &SourceContext<'_>) -> Result<()> {
        let options: NextOptions = parse_options(ctx.options)?;
        let path = ctx.project_dir.join(options.env_file());
        let key = base_url_var(&ctx.source.id);
        upsert_env_var(&path, &key, &base_url_of(&ctx.source.spec_url)).await?;
        Ok(())
    }

    async fn remove_source(&self, ctx: &SourceContext<'_>) -> Result<()> {
        let options: NextOptions = parse_options(ctx.options)?;
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

    fn descriptors() -> Vec<Descriptor> {
        let document = json!({
            "openapi": "3.0.0",
            "info": {"title": "Petstore", "version": "1"},
            "paths": {
                "/pets/{petId}": {
                    "get": {
                        "operationId": "showPet",
                        "summary": "Info for a pet",
                        "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}],
                        "responses": {"200": {"description": "ok", "content": {
                            "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                        }}}
                    },
                    "delete": {
                        "operationId": "deletePet",
                        "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}],
                        "responses": {"204": {"description": "gone"}}
                    }
                }
            },
            "components": {"schemas": {"Pet": {"type": "object", "properties": {"id": {"type": "string"}}}}}
        });
        build_descriptors(&document, "petstore").unwrap()
    }

    #[test]
    fn server_fetchers_honour_revalidate() {
        let descriptors = descriptors();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let server = render_server("Petstore", &descriptors, &conflicts, &NextOptions::default());
        assert!(server.contains("import \"server-only\";"));
        assert!(server.contains("import type { Pet } from \"./schemas\";"));
        assert!(server.contains("/** Info for a pet */\nexport async function showPet(params: { petId: string }, init?: RequestInit): Promise<Pet>"));
        assert!(server.contains("{ cache: \"no-store\", ...init }"));

        let options = NextOptions {
            revalidate: Some(60),
            env_file: None,
        };
        let server = render_server("Petstore", &descriptors, &conflicts, &options);
        assert!(server.contains("{ next: { revalidate: 60 }, ...init }"));
    }

    #[test]
    fn route_handlers_forward_path_params() {
        let descriptors = descriptors();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let routes = render_routes("Petstore", &descriptors, &conflicts);
        assert!(routes.contains("export async function showPetRoute(req: Request, context: RouteContext)"));
        assert!(routes.contains("  const params = await context.params;\n"));
        assert!(routes.contains(
            "return forward(req, \"DELETE\", `/pets/${encodeURIComponent(String(params.petId))}`);"
        ));
    }

    #[tokio::test]
    async fn generate_counts_server_side_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = descriptors();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let source = SourceConfig {
            id: "petstore".into(),
            name: "Petstore".into(),
            spec_url: "https://pets.dev/openapi.json".into(),
        };
        let mut stats = StatsCounter::new("petstore");
        let options = json!({"revalidate": 30});
        let mut ctx = GenerationContext {
            root_dir: dir.path(),
            source: &source,
            stats: &mut stats,
            conflicts: &conflicts,
            options: &options,
        };
        NextPlugin.generate(&descriptors, &mut ctx).await.unwrap();

        for file in ["request.ts", "schemas.ts", "server.ts", "routes.ts"] {
            assert!(dir.path().join("petstore").join(file).exists(), "{file}");
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.get(category::ENDPOINTS), 2);
        assert_eq!(snapshot.get(category::SERVER_SIDE_ENDPOINTS), 2);
        assert_eq!(snapshot.get(category::SCHEMAS), 1);
    }

    #[tokio::test]
    async fn env_bookkeeping_uses_public_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceConfig {
            id: "pet-store".into(),
            name: "Petstore".into(),
            spec_url: "https://pets.dev/openapi.json".into(),
        };
        let options = Value::Null;
        let ctx = SourceContext {
            project_dir: dir.path(),
            root_dir: dir.path(),
            source: &source,
            options: &options,
        };
        NextPlugin.add_source(&ctx).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env.local")).unwrap(),
            "NEXT_PUBLIC_PET_STORE_BASE_URL=https://pets.dev\n"
        );
    }

    #[test]
    fn documentation_has_usage_request_response() {
        let descriptors = descriptors();
        let rest = descriptors[0].as_rest().unwrap();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let tabs = NextPlugin.endpoint_documentation(rest, &conflicts);
        let names: Vec<_> = tabs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Usage", "Request", "Response"]);
        assert!(tabs[0].content.contains("await showPet(params)"));
    }
}
