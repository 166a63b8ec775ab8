use crate::integrations::registry::ResourceKind;
use crate::loaders::{LoaderContext, OptionLoader, TemplateOption};
use crate::request::{RequestInput, build_request};
use async_trait::async_trait;
use serde_json::Value;

/// `getTemplates`: lists the account's templates as (name, id) pairs.
pub struct TemplatesLoader;

#[async_trait]
impl OptionLoader for TemplatesLoader {
    fn name(&self) -> &'static str {
        "getTemplates"
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn load(&self, ctx: &LoaderContext<'_>) -> Vec<TemplateOption> {
        let credential = ctx.registry.credential();
        let data = match ctx.credentials.get_credentials(&credential.name).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "No credential for template options");
                return Vec::new();
            }
        };

        let mut plan = match build_request(
            ctx.registry,
            ctx.base_url,
            ResourceKind::Template,
            "list",
            &RequestInput::default(),
        ) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build template list request");
                return Vec::new();
            }
        };
        if let Err(e) = credential.authenticate(&data, &mut plan) {
            tracing::warn!(error = %e, "Cannot authenticate template list request");
            return Vec::new();
        }

        match ctx.transport.send(plan).await {
            Ok(response) => parse_templates(&response.body),
            Err(e) => {
                tracing::warn!(error = %e, "Template options unavailable");
                Vec::new()
            }
        }
    }
}

/// Maps a template list payload to options. Anything but an array yields none.
pub fn parse_templates(body: &Value) -> Vec<TemplateOption> {
    let Some(items) = body.as_array() else {
        tracing::warn!("Template list payload is not an array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            let label = item.get("name").and_then(Value::as_str).unwrap_or(id);
            Some(TemplateOption {
                label: label.to_string(),
                id: id.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_templates() {
        let options = parse_templates(&json!([
            {"id": "t1", "name": "Invoice"},
            {"id": "t2"},
            {"name": "No id"}
        ]));
        assert_eq!(
            options,
            vec![
                TemplateOption {
                    label: "Invoice".to_string(),
                    id: "t1".to_string()
                },
                TemplateOption {
                    label: "t2".to_string(),
                    id: "t2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_templates_rejects_objects() {
        assert!(parse_templates(&json!({"templates": []})).is_empty());
        assert!(parse_templates(&Value::Null).is_empty());
    }
}
