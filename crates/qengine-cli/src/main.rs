//! # qengine CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # One page of a table
//! qengine --host qlik.corp fetch "Sales Analysis" Employees --page 2 --page-size 50
//!
//! # The app's default table
//! qengine fetch "Sales Analysis" --page-size 100
//!
//! # Filtered and sorted
//! qengine fetch "Sales Analysis" Employees \
//!   --filter-field Department --filter-value Sales --filter-value Support \
//!   --sort-field Salary --desc
//!
//! # Data model
//! qengine fields "Sales Analysis"
//! qengine tables "Sales Analysis"
//!
//! # Configured apps
//! qengine --mappings apps.json apps
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`; stdout carries only JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use qengine_cli::options::ConnectionOptions;
use qengine_cli::output::page_document;
use qengine_common::config::EngineConfig;
use qengine_query::{
    Filter, QueryEngine, Sort, SortOrder, StaticResolver, TablePageRequest, DEFAULT_PAGE_SIZE,
};

#[derive(FromArgs)]
/// qengine - read Qlik Engine tables page by page
struct Cli {
    /// engine host name
    #[argh(option)]
    host: Option<String>,

    /// engine port (default 4747)
    #[argh(option)]
    port: Option<u16>,

    /// user directory sent in the X-Qlik-User header
    #[argh(option, long = "user-directory")]
    user_directory: Option<String>,

    /// user id sent in the X-Qlik-User header
    #[argh(option, long = "user-id")]
    user_id: Option<String>,

    /// client certificate PEM file
    #[argh(option)]
    cert: Option<PathBuf>,

    /// client private key PEM file
    #[argh(option)]
    key: Option<PathBuf>,

    /// root CA PEM file
    #[argh(option, long = "root-ca")]
    root_ca: Option<PathBuf>,

    /// skip server certificate verification
    #[argh(switch, long = "no-verify")]
    no_verify: bool,

    /// json file mapping app and table names to engine ids
    ///
    /// Shape: {"apps": {"name": "id"}, "tables": {"app": {"name": "table"}},
    /// "objects": {"app": {"name": "object id"}}, "defaults": {"app": "name"}}.
    /// Without it, APP_MAPPINGS_JSON and DEFAULT_TABLE_MAPPINGS_JSON are
    /// used, and failing that every app name is taken to be an id.
    #[argh(option)]
    mappings: Option<PathBuf>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Fetch(FetchArgs),
    Fields(FieldsArgs),
    Tables(TablesArgs),
    Apps(AppsArgs),
}

/// Read one page of a table.
///
/// ```bash
/// qengine fetch "Sales Analysis" Employees --page 5 --page-size 10 | jq '.data[0]'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "fetch")]
/// read one page of a table
struct FetchArgs {
    /// app name or id
    #[argh(positional)]
    app: String,

    /// table name (default: the app's configured default table)
    #[argh(positional)]
    table: Option<String>,

    /// page number, starting at 1
    #[argh(option, default = "1")]
    page: u32,

    /// rows per page
    #[argh(option, long = "page-size", default = "DEFAULT_PAGE_SIZE")]
    page_size: u32,

    /// field to filter on
    #[argh(option, long = "filter-field")]
    filter_field: Option<String>,

    /// accepted value for the filter field; repeat for several
    #[argh(option, long = "filter-value")]
    filter_values: Vec<String>,

    /// field to sort by
    #[argh(option, long = "sort-field")]
    sort_field: Option<String>,

    /// sort descending
    #[argh(switch)]
    desc: bool,

    /// column to return; repeat for several (default: all)
    #[argh(option, long = "column")]
    columns: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "fields")]
/// list the fields of an app
struct FieldsArgs {
    /// app name or id
    #[argh(positional)]
    app: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "tables")]
/// list the data-model tables of an app
struct TablesArgs {
    /// app name or id
    #[argh(positional)]
    app: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "apps")]
/// list the configured apps
struct AppsArgs {}

impl Cli {
    fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            host: self.host.clone(),
            port: self.port,
            user_directory: self.user_directory.clone(),
            user_id: self.user_id.clone(),
            cert: self.cert.clone(),
            key: self.key.clone(),
            root_ca: self.root_ca.clone(),
            no_verify: self.no_verify,
        }
    }

    fn resolver(&self) -> Result<StaticResolver> {
        let resolver = match &self.mappings {
            Some(path) => StaticResolver::from_file(path)?,
            None => StaticResolver::from_env()?,
        };
        Ok(resolver)
    }
}

impl FetchArgs {
    fn request(&self, table: &str) -> Result<TablePageRequest> {
        let mut request = TablePageRequest::new(&self.app, table)
            .with_page(self.page, self.page_size)
            .with_columns(self.columns.iter().cloned());

        match (&self.filter_field, self.filter_values.is_empty()) {
            (Some(field), false) => {
                request = request.with_filter(Filter::new(field, self.filter_values.clone()));
            }
            (Some(field), true) => {
                anyhow::bail!("--filter-field {} needs at least one --filter-value", field)
            }
            (None, false) => anyhow::bail!("--filter-value given without --filter-field"),
            (None, true) => {}
        }

        if let Some(field) = &self.sort_field {
            let order = if self.desc {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            request = request.with_sort(Sort::new(field, order));
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.connection_options().apply(EngineConfig::from_env()?);
    let engine = QueryEngine::from_config(config, Arc::new(cli.resolver()?))?;

    let outcome = run(&engine, &cli.command).await;
    engine.shutdown();
    outcome
}

async fn run(engine: &QueryEngine, command: &Commands) -> Result<()> {
    let document = match command {
        Commands::Fetch(args) => {
            let table = match &args.table {
                Some(table) => table.clone(),
                None => engine.default_table(&args.app)?,
            };
            let request = args.request(&table)?;
            let page = engine.fetch_table_page(request.clone()).await?;
            page_document(&request, &page)
        }
        Commands::Fields(args) => serde_json::to_value(engine.list_fields(&args.app).await?)?,
        Commands::Tables(args) => serde_json::to_value(engine.list_tables(&args.app).await?)?,
        Commands::Apps(_) => serde_json::to_value(engine.list_apps())?,
    };
    println!("{}", serde_json::to_string(&document)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qengine_query::IdentifierResolver;

    fn parse(args: &[&str]) -> Cli {
        Cli::from_args(&["qengine"], args).unwrap()
    }

    #[test]
    fn test_cli_parse_fetch_defaults() {
        let cli = parse(&["fetch", "Sales Analysis", "Employees"]);
        assert!(cli.host.is_none());
        assert!(!cli.no_verify);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.table.as_deref(), Some("Employees"));
                let request = args.request("Employees").unwrap();
                assert_eq!(request.app, "Sales Analysis");
                assert_eq!(request.table, "Employees");
                assert_eq!(request.page, 1);
                assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
                assert!(request.filter.is_none());
                assert!(request.sort.is_none());
                assert!(request.columns.is_empty());
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_fetch_full() {
        let cli = parse(&[
            "--host", "qlik.corp",
            "--port", "4848",
            "--no-verify",
            "fetch", "HR", "Employees",
            "--page", "3",
            "--page-size", "25",
            "--filter-field", "Department",
            "--filter-value", "Sales",
            "--filter-value", "Support",
            "--sort-field", "Salary",
            "--desc",
            "--column", "Name",
            "--column", "Salary",
        ]);

        let options = cli.connection_options();
        assert_eq!(options.host.as_deref(), Some("qlik.corp"));
        assert_eq!(options.port, Some(4848));
        assert!(options.no_verify);

        match cli.command {
            Commands::Fetch(args) => {
                let request = args.request("Employees").unwrap();
                assert_eq!((request.page, request.page_size), (3, 25));
                assert_eq!(
                    request.filter,
                    Some(Filter::new("Department", vec!["Sales".into(), "Support".into()]))
                );
                assert_eq!(request.sort, Some(Sort::new("Salary", SortOrder::Descending)));
                assert_eq!(request.columns, vec!["Name", "Salary"]);
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_filter_field_needs_values() {
        let cli = parse(&["fetch", "HR", "Employees", "--filter-field", "Department"]);
        match cli.command {
            Commands::Fetch(args) => assert!(args.request("Employees").is_err()),
            _ => panic!("Expected Fetch command"),
        }

        let cli = parse(&["fetch", "HR", "Employees", "--filter-value", "Sales"]);
        match cli.command {
            Commands::Fetch(args) => assert!(args.request("Employees").is_err()),
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_parse_metadata_commands() {
        let cli = parse(&["--mappings", "apps.json", "fields", "HR"]);
        assert_eq!(cli.mappings, Some(PathBuf::from("apps.json")));
        assert!(matches!(cli.command, Commands::Fields(FieldsArgs { ref app }) if app == "HR"));

        let cli = parse(&["tables", "HR"]);
        assert!(matches!(cli.command, Commands::Tables(TablesArgs { ref app }) if app == "HR"));

        let cli = parse(&["apps"]);
        assert!(matches!(cli.command, Commands::Apps(_)));
    }

    #[test]
    fn test_mappings_file_is_loaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"apps": {"HR": "5a1e6f0c-hr"}, "defaults": {"HR": "Employees"}}"#,
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--mappings", path, "fields", "HR"]);
        let resolver = cli.resolver().unwrap();
        assert_eq!(resolver.resolve_app_id("HR").unwrap(), "5a1e6f0c-hr");
        assert_eq!(resolver.default_table("5a1e6f0c-hr").as_deref(), Some("Employees"));
    }

    #[test]
    fn test_cli_fetch_table_is_optional() {
        match parse(&["fetch", "HR", "--page", "2"]).command {
            Commands::Fetch(args) => {
                assert!(args.table.is_none());
                assert_eq!(args.page, 2);
            }
            _ => panic!("Expected Fetch command"),
        }
        assert!(Cli::from_args(&["qengine"], &["fetch"]).is_err());
        let args = ["fetch", "HR", "Employees", "--page", "x"];
        assert!(Cli::from_args(&["qengine"], &args).is_err());
    }
}
