use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;
use tfschema_core::render::{render_block, render_names};
use tfschema_core::{init_logging, AppDirs, Config, Format, RenderError, SchemaClient, SchemaError};
use tfschema_plugin::{ClientOptions, GrpcClient};

#[derive(Debug, Parser)]
#[command(name = "tfschema", version, about = "Inspect Terraform provider schemas")]
struct Cli {
    /// Output format, `table` or `json` (takes precedence over config)
    #[arg(long, global = true)]
    format: Option<Format>,
    /// Directory containing the `.terraform` plugin tree (takes precedence over config)
    #[arg(long, global = true)]
    root_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provider configuration schema
    #[command(subcommand)]
    Provider(ProviderCommand),
    /// Resource type schemas
    #[command(subcommand)]
    Resource(SchemaCommand),
    /// Data source schemas
    #[command(subcommand)]
    Data(SchemaCommand),
}

#[derive(Debug, Subcommand)]
enum ProviderCommand {
    /// Show the provider configuration block
    Show { provider: String },
}

#[derive(Debug, Subcommand)]
enum SchemaCommand {
    /// List all type names served by a provider
    List { provider: String },
    /// Show the schema of one type, e.g. `aws_instance`
    Show { type_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    ProviderSchema,
    ResourceTypes,
    ResourceType(String),
    DataSources,
    DataSource(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    provider: String,
    query: Query,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("type name {0:?} has no provider prefix (expected <provider>_<name>)")]
    InvalidTypeName(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Command {
    fn invocation(&self) -> Result<Invocation, CliError> {
        let (provider, query) = match self {
            Command::Provider(ProviderCommand::Show { provider }) => {
                (provider.clone(), Query::ProviderSchema)
            }
            Command::Resource(SchemaCommand::List { provider }) => {
                (provider.clone(), Query::ResourceTypes)
            }
            Command::Resource(SchemaCommand::Show { type_name }) => (
                provider_name(type_name)?.to_string(),
                Query::ResourceType(type_name.clone()),
            ),
            Command::Data(SchemaCommand::List { provider }) => {
                (provider.clone(), Query::DataSources)
            }
            Command::Data(SchemaCommand::Show { type_name }) => (
                provider_name(type_name)?.to_string(),
                Query::DataSource(type_name.clone()),
            ),
        };
        Ok(Invocation { provider, query })
    }
}

/// The provider serving a type is named by the prefix before the first `_`.
fn provider_name(type_name: &str) -> Result<&str, CliError> {
    type_name
        .split_once('_')
        .map(|(provider, _)| provider)
        .filter(|provider| !provider.is_empty())
        .ok_or_else(|| CliError::InvalidTypeName(type_name.to_string()))
}

fn execute(client: &dyn SchemaClient, query: &Query, format: Format) -> Result<String, CliError> {
    let output = match query {
        Query::ProviderSchema => render_block(&client.get_provider_schema()?, format)?,
        Query::ResourceTypes => render_names(&client.resource_types()?, format)?,
        Query::ResourceType(name) => render_block(&client.get_resource_type_schema(name)?, format)?,
        Query::DataSources => render_names(&client.data_sources()?, format)?,
        Query::DataSource(name) => render_block(&client.get_data_source_schema(name)?, format)?,
    };
    Ok(output)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let mut config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    if let Some(root_dir) = cli.root_dir {
        config.plugin.root_dir = Some(root_dir);
    }
    let format = cli.format.unwrap_or(config.format);
    let invocation = cli.command.invocation()?;
    tracing::debug!(
        provider = %invocation.provider,
        query = ?invocation.query,
        %format,
        "running schema query"
    );

    let options = ClientOptions::from_settings(&config.plugin, &dirs);
    let mut client = GrpcClient::new(&invocation.provider, &options)?;
    let output = execute(&client, &invocation.query, format);
    let closed = client.close();

    let output = output?;
    closed?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfschema_core::{Attribute, Block, Diagnostic, Diagnostics, SchemaResult, Type};

    struct StaticClient {
        failing: bool,
    }

    impl StaticClient {
        fn check(&self) -> SchemaResult<()> {
            if self.failing {
                let diags: Diagnostics = vec![Diagnostic::error("boom", "")].into();
                return Err(SchemaError::Diagnostics(diags));
            }
            Ok(())
        }

        fn block() -> Block {
            let mut block = Block::default();
            block.attributes.insert(
                "region".to_string(),
                Attribute {
                    attr_type: Some(Type::String),
                    nested_type: None,
                    description: String::new(),
                    required: true,
                    optional: false,
                    computed: false,
                    sensitive: false,
                    deprecated: false,
                },
            );
            block
        }
    }

    impl SchemaClient for StaticClient {
        fn get_provider_schema(&self) -> SchemaResult<Block> {
            self.check()?;
            Ok(Self::block())
        }

        fn get_resource_type_schema(&self, resource_type: &str) -> SchemaResult<Block> {
            self.check()?;
            match resource_type {
                "aws_instance" => Ok(Self::block()),
                other => Err(SchemaError::ResourceTypeNotFound(other.to_string())),
            }
        }

        fn get_data_source_schema(&self, data_source: &str) -> SchemaResult<Block> {
            self.check()?;
            Err(SchemaError::DataSourceNotFound(data_source.to_string()))
        }

        fn resource_types(&self) -> SchemaResult<Vec<String>> {
            self.check()?;
            Ok(vec!["aws_instance".to_string(), "aws_vpc".to_string()])
        }

        fn data_sources(&self) -> SchemaResult<Vec<String>> {
            self.check()?;
            Ok(Vec::new())
        }

        fn close(&mut self) -> SchemaResult<()> {
            Ok(())
        }
    }

    #[test]
    fn provider_name_is_prefix_before_first_underscore() {
        assert_eq!(provider_name("aws_instance").unwrap(), "aws");
        assert_eq!(provider_name("google_compute_instance").unwrap(), "google");
        assert!(matches!(
            provider_name("instance"),
            Err(CliError::InvalidTypeName(_))
        ));
        assert!(provider_name("_instance").is_err());
    }

    #[test]
    fn show_commands_resolve_provider_from_type() {
        let cli = Cli::try_parse_from(["tfschema", "resource", "show", "aws_instance"]).unwrap();
        assert_eq!(
            cli.command.invocation().unwrap(),
            Invocation {
                provider: "aws".to_string(),
                query: Query::ResourceType("aws_instance".to_string()),
            }
        );

        let cli = Cli::try_parse_from(["tfschema", "data", "show", "null_data_source"]).unwrap();
        assert_eq!(
            cli.command.invocation().unwrap().query,
            Query::DataSource("null_data_source".to_string())
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tfschema",
            "data",
            "list",
            "aws",
            "--format",
            "JSON",
            "--root-dir",
            "/work",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(Format::Json));
        assert_eq!(cli.root_dir, Some(PathBuf::from("/work")));
        assert_eq!(cli.command.invocation().unwrap().query, Query::DataSources);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["tfschema", "provider", "show", "aws", "--format", "xml"]).is_err());
    }

    #[test]
    fn execute_lists_names() {
        let client = StaticClient { failing: false };
        let output = execute(&client, &Query::ResourceTypes, Format::Table).unwrap();
        assert_eq!(output, "aws_instance\naws_vpc\n");
    }

    #[test]
    fn execute_renders_block_as_json() {
        let client = StaticClient { failing: false };
        let output = execute(
            &client,
            &Query::ResourceType("aws_instance".to_string()),
            Format::Json,
        )
        .unwrap();
        assert!(output.contains("\"region\""));
        assert!(output.contains("\"string\""));
    }

    #[test]
    fn execute_surfaces_lookup_and_diagnostic_errors() {
        let client = StaticClient { failing: false };
        let err = execute(&client, &Query::DataSource("aws_ami".to_string()), Format::Table)
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to find data source: aws_ami");

        let client = StaticClient { failing: true };
        let err = execute(&client, &Query::ProviderSchema, Format::Table).unwrap_err();
        assert!(matches!(err, CliError::Schema(SchemaError::Diagnostics(_))));
    }
}
