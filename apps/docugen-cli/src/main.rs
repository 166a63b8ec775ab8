use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use docugen_core::config::DocuGenConfig;
use docugen_core::credentials::{CredentialData, CredentialStatus, EnvCredentialStore};
use docugen_core::{DocuGenerateNode, FieldValues, RequestInput, ResourceKind};
use docugen_inspector::InspectorState;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

#[derive(Parser)]
#[command(name = "docugen")]
#[command(about = "DocuGenerate connector", long_about = None)]
struct Cli {
    /// YAML definition replacing the embedded one.
    #[arg(long, global = true)]
    definition: Option<PathBuf>,

    /// API base URL override.
    #[arg(long, global = true)]
    base_url: Option<Url>,

    /// Repeat for more detail (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(clap::Args)]
struct Selection {
    #[arg(short, long)]
    resource: ResourceKind,

    /// Defaults to the resource's default operation.
    #[arg(short, long)]
    operation: Option<String>,

    /// Field value as `name=value`. Repeatable.
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the connector definition as JSON.
    Describe,
    /// Show the fields visible for a selection, with validation errors.
    Fields(Selection),
    /// Build the request for a selection without sending it.
    Plan(Selection),
    /// Build, authenticate and send a request.
    Run(Selection),
    /// List templates through the option loader.
    Templates,
    /// Check an API key against the remote service.
    TestCredential {
        /// Defaults to DOCUGENERATE_API_KEY.
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

impl Selection {
    fn operation(&self, node: &DocuGenerateNode) -> Result<String> {
        match &self.operation {
            Some(op) => Ok(op.clone()),
            None => node
                .registry()
                .default_operation(self.resource)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("resource '{}' has no default operation", self.resource)),
        }
    }

    fn values(&self) -> FieldValues {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = DocuGenConfig::from_env()?;
    if let Some(path) = cli.definition.clone() {
        config = config.with_definition_path(path);
    }
    if let Some(url) = cli.base_url.clone() {
        config = config.with_base_url(url);
    }

    let node = DocuGenerateNode::from_config(&config, Arc::new(EnvCredentialStore::docugenerate()))?;

    match cli.cmd {
        Commands::Describe => print_json(&node.describe()?)?,
        Commands::Fields(selection) => {
            let operation = selection.operation(&node)?;
            let state = InspectorState::new(
                Arc::new(node.registry().clone()),
                selection.resource,
                &operation,
                selection.values(),
            )?;
            print_json(&json!({
                "subtitle": node.registry().subtitle(selection.resource, &operation),
                "fields": state.fields,
                "errors": state.errors,
                "valid": state.is_valid(),
            }))?;
        }
        Commands::Plan(selection) => {
            let operation = selection.operation(&node)?;
            let plan = node.build_request(
                selection.resource,
                &operation,
                &RequestInput::new(selection.values()),
            )?;
            print_json(&plan.to_json())?;
        }
        Commands::Run(selection) => {
            let operation = selection.operation(&node)?;
            let response = node
                .execute(
                    selection.resource,
                    &operation,
                    &RequestInput::new(selection.values()),
                )
                .await?;
            print_json(&response.body)?;
        }
        Commands::Templates => {
            let options = node.load_options("getTemplates").await?;
            print_json(&serde_json::to_value(options)?)?;
        }
        Commands::TestCredential { api_key } => {
            let key = match api_key {
                Some(key) => key,
                None => std::env::var(docugen_core::config::API_KEY_VAR)
                    .with_context(|| format!("{} is not set", docugen_core::config::API_KEY_VAR))?,
            };
            match node.test_credential(&CredentialData::api_key(key)).await {
                CredentialStatus::Valid => println!("Credential is valid"),
                CredentialStatus::Invalid { status, message } => {
                    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                    return Err(anyhow!("Credential is invalid (HTTP {}): {}", status, message));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("documentId=d1").unwrap(),
            ("documentId".to_string(), "d1".to_string())
        );
        assert_eq!(
            parse_field("data=[{\"a\":\"=\"}]").unwrap(),
            ("data".to_string(), "[{\"a\":\"=\"}]".to_string())
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
    }

    #[test]
    fn test_cli_parses_selection() {
        let cli = Cli::parse_from([
            "docugen", "plan", "-r", "document", "-o", "get", "-f", "documentId=d1",
        ]);
        match cli.cmd {
            Commands::Plan(selection) => {
                assert_eq!(selection.resource, ResourceKind::Document);
                assert_eq!(selection.values().get("documentId"), Some(&json!("d1")));
            }
            _ => panic!("Expected plan command"),
        }
    }
}
