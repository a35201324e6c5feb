//! NestJS generator: DTO types and one injectable HTTP service per source.

use super::output::{write_all, OutputFile};
use super::typescript::{
    endpoint_shape_tabs, pascal_case, referenced_schemas, render_schemas_file, schema_tabs,
    EndpointView, GENERATED_HEADER,
};
use super::{parse_options, DocumentationTab, GenerationContext, Plugin, PluginMeta};
use crate::conflicts::ConflictResolution;
use crate::descriptors::{
    rest_descriptors, schema_descriptors, Descriptor, ResourceDescriptor, RestData, SchemaData,
};
use crate::stats::category;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NestOptions {
    /// Class name of the generated service; derived from the source id by default.
    #[serde(default)]
    pub service_name: Option<String>,
}

fn service_class(source_id: &str, options: &NestOptions) -> String {
    options
        .service_name
        .clone()
        .unwrap_or_else(|| format!("{}Service", pascal_case(source_id)))
}

fn service_file(source_id: &str) -> String {
    format!("{source_id}.service.ts")
}

fn axios_response_type(view: &EndpointView) -> Option<&'static str> {
    match view.response_kind.as_str() {
        "blob" => Some("arraybuffer"),
        "text" => Some("text"),
        _ => None,
    }
}

fn render_service(
    title: &str,
    class: &str,
    descriptors: &[Descriptor],
    conflicts: &ConflictResolution,
) -> String {
    let mut out = format!(
        "{GENERATED_HEADER}\n// Source: {title}\n\n\
         import {{ Injectable }} from \"@nestjs/common\";\n\
         import {{ HttpService }} from \"@nestjs/axios\";\n\
         import {{ firstValueFrom }} from \"rxjs\";\n"
    );

    let mut imports: Vec<String> = rest_descriptors(descriptors)
        .flat_map(|d| referenced_schemas(&d.data))
        .collect();
    imports.sort();
    imports.dedup();
    if !imports.is_empty() {
        out.push_str(&format!("import type {{ {} }} from \"./dto\";\n", imports.join(", ")));
    }

    out.push_str(&format!(
        "\n@Injectable()\nexport class {class} {{\n  constructor(private readonly http: HttpService) {{}}\n"
    ));

    for descriptor in rest_descriptors(descriptors) {
        let view = EndpointView::new(descriptor, conflicts);
        let returns = if descriptor.data.is_downloadable {
            "ArrayBuffer".to_string()
        } else {
            view.response_type.clone()
        };

        let mut config = vec![
            format!("method: {:?}", view.method),
            format!("url: `{}`", view.url),
        ];
        if !view.query.is_empty() {
            config.push(format!("params: {{ {} }}", entries(&view.query)));
        }
        let mut headers = view
            .headers
            .iter()
            .map(|e| format!("{}: {}", e.key, e.value))
            .collect::<Vec<_>>();
        if view.body_type.is_some() {
            headers.insert(0, format!("\"Content-Type\": {:?}", view.content_type));
            config.push("data: body".to_string());
        }
        if !headers.is_empty() {
            config.push(format!("headers: {{ {} }}", headers.join(", ")));
        }
        if let Some(kind) = axios_response_type(&view) {
            config.push(format!("responseType: {kind:?}"));
        }

        out.push('\n');
        if let Some(summary) = &view.summary {
            out.push_str(&format!("  /** {} */\n", summary.replace("*/", "*\\/")));
        }
        out.push_str(&format!(
            "  async {}({}): Promise<{returns}> {{\n\
             \x20   const response = await firstValueFrom(\n\
             \x20     this.http.request<{returns}>({{ {} }}),\n\
             \x20   );\n\
             \x20   return response.data;\n\
             \x20 }}\n",
            view.name,
            view.signature(),
            config.join(", "),
        ));
    }

    out.push_str("}\n");
    out
}

fn entries(entries: &[super::typescript::Entry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.key, e.value))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct NestPlugin;

#[async_trait]
impl Plugin for NestPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            name: "openapi-sync-nest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            compat: "^0.1".to_string(),
            generator: "nest".to_string(),
        }
    }

    fn validate_options(&self, options: &Value) -> Result<()> {
        parse_options::<NestOptions>(options).map(|_| ())
    }

    async fn generate(
        &self,
        descriptors: &[Descriptor],
        ctx: &mut GenerationContext<'_>,
    ) -> Result<()> {
        let options: NestOptions = parse_options(ctx.options)?;
        let source = ctx.source;
        let class = service_class(&source.id, &options);

        let files = [
            OutputFile::new(
                "dto.ts",
                render_schemas_file(&source.name, schema_descriptors(descriptors)),
            ),
            OutputFile::new(
                service_file(&source.id),
                render_service(&source.name, &class, descriptors, ctx.conflicts),
            ),
        ];
        write_all(&ctx.source_dir(), &files).await?;

        ctx.stats
            .increment_by(category::ENDPOINTS, rest_descriptors(descriptors).count() as u64);
        ctx.stats.increment(category::SERVICES);
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
        let class = service_class(&descriptor.source, &NestOptions::default());
        let mut args = Vec::new();
        if view.params_type.is_some() {
            args.push("params");
        }
        if view.body_type.is_some() {
            args.push("body");
        }
        let usage = format!(
            "import {{ {class} }} from \"./{source}/{file}\";\n\n\
             @Injectable()\nexport class Consumer {{\n  constructor(private readonly api: {class}) {{}}\n\n\
             \x20 run() {{\n    return this.api.{name}({args});\n  }}\n}}\n",
            source = descriptor.source,
            file = service_file(&descriptor.source).trim_end_matches(".ts"),
            name = view.name,
            args = args.join(", "),
        );

        let mut tabs = vec![DocumentationTab::new("Usage", "typescript", usage)];
        tabs.extend(endpoint_shape_tabs(descriptor));
        tabs
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
            "info": {"title": "Reports", "version": "1"},
            "paths": {
                "/reports": {
                    "get": {
                        "operationId": "exportReport",
                        "parameters": [{"name": "year", "in": "query", "required": true, "schema": {"type": "integer"}}],
                        "responses": {"200": {"description": "ok", "content": {
                            "text/csv": {"schema": {"type": "string"}}
                        }}}
                    },
                    "post": {
                        "operationId": "createReport",
                        "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Report"}}}},
                        "responses": {"201": {"description": "ok", "content": {
                            "application/json": {"schema": {"$ref": "#/components/schemas/Report"}}
                        }}}
                    }
                }
            },
            "components": {"schemas": {"Report": {"type": "object", "properties": {"title": {"type": "string"}}}}}
        });
        build_descriptors(&document, "reports").unwrap()
    }

    #[test]
    fn service_methods_use_http_service() {
        let descriptors = descriptors();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let service = render_service("Reports", "ReportsService", &descriptors, &conflicts);

        assert!(service.contains("@Injectable()\nexport class ReportsService {"));
        assert!(service.contains("import type { Report } from \"./dto\";"));
        assert!(service.contains("async exportReport(params: { year: number }): Promise<ArrayBuffer>"));
        assert!(service.contains("params: { year: params.year }"));
        assert!(service.contains("responseType: \"arraybuffer\""));
        assert!(service.contains("async createReport(body: Report): Promise<Report>"));
        assert!(service.contains("data: body, headers: { \"Content-Type\": \"application/json\" }"));
        assert!(service.ends_with("}\n"));
    }

    #[tokio::test]
    async fn generate_writes_dto_and_service() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = descriptors();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let source = SourceConfig {
            id: "reports".into(),
            name: "Reports".into(),
            spec_url: "./reports.json".into(),
        };
        let mut stats = StatsCounter::new("reports");
        let options = json!({"serviceName": "ReportingClient"});
        let mut ctx = GenerationContext {
            root_dir: dir.path(),
            source: &source,
            stats: &mut stats,
            conflicts: &conflicts,
            options: &options,
        };
        NestPlugin.generate(&descriptors, &mut ctx).await.unwrap();

        assert!(dir.path().join("reports/dto.ts").exists());
        let service =
            std::fs::read_to_string(dir.path().join("reports/reports.service.ts")).unwrap();
        assert!(service.contains("export class ReportingClient {"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.get(category::ENDPOINTS), 2);
        assert_eq!(snapshot.get(category::SERVICES), 1);
        assert_eq!(snapshot.get(category::SCHEMAS), 1);
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(NestPlugin.validate_options(&json!({"serviceName": "Api"})).is_ok());
        assert!(NestPlugin.validate_options(&json!({"envFile": ".env"})).is_err());
    }
}
