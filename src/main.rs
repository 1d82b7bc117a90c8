// Main CLI entry point for Specter
// Uses clap for argument parsing

use clap::{Arg, ArgAction, ArgMatches, Command};
use specter::auth::{ClientCredentials, OAuthTokenSource};
use specter::client::build_http_client;
use specter::config::{CredentialStore, EngineConfig};
use specter::engine::ConformanceEngine;
use specter::error::SetupError;
use specter::parsers::{OpenApiLoader, SpecSource};
use specter::reporting::{exit_code, export_json, export_markdown, render_console};
use specter::validators::KNOWN_USER_LEVELS;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("specter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Checks a live REST backend against its OpenAPI description")
        .after_help("EXAMPLES:\n  specter --input specs/ --tenant acme\n  specter -i specs/v3.yaml -p /v3/accounts --skip-user-levels --markdown-report\n\nUser level credentials are read from {LEVEL}_CLIENT_ID / {LEVEL}_CLIENT_SECRET,\ne.g. SP_UI_CONFIG_HUB_ADMIN_CLIENT_ID for sp:ui-config-hub-admin.")
        .arg(Arg::new("input")
            .short('i')
            .long("input")
            .env("SPEC_INPUT")
            .required(true)
            .num_args(1)
            .help("OpenAPI description file or directory of descriptions"))
        .arg(Arg::new("path")
            .short('p')
            .long("path")
            .num_args(1)
            .help("Validate only this path, e.g. /v3/accounts/{id}"))
        .arg(Arg::new("tenant")
            .short('t')
            .long("tenant")
            .env("TENANT")
            .required(true)
            .num_args(1)
            .help("Tenant name used in API and token URLs"))
        .arg(Arg::new("client_id")
            .long("client-id")
            .env("CLIENT_ID")
            .required(true)
            .num_args(1)
            .help("Client id of the default identity"))
        .arg(Arg::new("client_secret")
            .long("client-secret")
            .env("CLIENT_SECRET")
            .hide_env_values(true)
            .required(true)
            .num_args(1)
            .help("Client secret of the default identity"))
        .arg(Arg::new("skip_schema")
            .long("skip-schema")
            .action(ArgAction::SetTrue)
            .help("Do not validate response schemas"))
        .arg(Arg::new("skip_filters")
            .long("skip-filters")
            .action(ArgAction::SetTrue)
            .help("Do not probe filter operators"))
        .arg(Arg::new("skip_sorters")
            .long("skip-sorters")
            .action(ArgAction::SetTrue)
            .help("Do not probe sorters"))
        .arg(Arg::new("skip_user_levels")
            .long("skip-user-levels")
            .action(ArgAction::SetTrue)
            .help("Do not probe user levels"))
        .arg(Arg::new("test_create")
            .long("test-create")
            .action(ArgAction::SetTrue)
            .help("POST to collection endpoints and validate the created record (deleted afterwards)"))
        .arg(Arg::new("forbid_contains")
            .long("forbid-contains")
            .action(ArgAction::SetTrue)
            .help("Never probe the `co` filter operator"))
        .arg(Arg::new("markdown_report")
            .long("markdown-report")
            .action(ArgAction::SetTrue)
            .help("Write a Markdown report"))
        .arg(Arg::new("json_report")
            .long("json-report")
            .action(ArgAction::SetTrue)
            .help("Write the aggregated results as JSON"))
        .arg(Arg::new("verbose")
            .long("verbose")
            .action(ArgAction::SetTrue)
            .help("Debug logging"))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("specter=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("specter=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn engine_config(matches: &ArgMatches) -> EngineConfig {
    let tenant = matches.get_one::<String>("tenant").cloned().unwrap_or_default();
    let mut config = EngineConfig::new(tenant);
    config.validators.schema = !matches.get_flag("skip_schema");
    config.validators.filters = !matches.get_flag("skip_filters");
    config.validators.sorters = !matches.get_flag("skip_sorters");
    config.validators.user_levels = !matches.get_flag("skip_user_levels");
    config.validators.create = matches.get_flag("test_create");
    config.forbid_contains = matches.get_flag("forbid_contains");
    config
}

fn credentials(matches: &ArgMatches) -> CredentialStore {
    let default = match (
        matches.get_one::<String>("client_id"),
        matches.get_one::<String>("client_secret"),
    ) {
        (Some(id), Some(secret)) => Some(ClientCredentials::new(id, secret)),
        _ => None,
    };
    let mut store = CredentialStore::new(default);
    store.load_levels_from_env(KNOWN_USER_LEVELS);
    store
}

async fn run(matches: &ArgMatches) -> Result<ExitCode, SetupError> {
    let input = matches.get_one::<String>("input").cloned().unwrap_or_default();
    let specs = OpenApiLoader.load(&input)?;
    tracing::info!(versions = ?specs.versions(), "loaded API descriptions");

    let config = engine_config(matches);
    let token_source = OAuthTokenSource::new(
        build_http_client(config.request_timeout)?,
        config.token_url(),
        config.retry.clone(),
    );
    let engine = ConformanceEngine::connect(
        Arc::new(specs),
        config,
        credentials(matches),
        Arc::new(token_source),
    )
    .await?;

    let results = engine
        .run(matches.get_one::<String>("path").map(String::as_str))
        .await;
    println!("{}", render_console(&results));

    if matches.get_flag("markdown_report") {
        match export_markdown(&results) {
            Ok(file) => println!("Markdown report written to {}", file),
            Err(err) => tracing::error!(error = %err, "failed to write Markdown report"),
        }
    }
    if matches.get_flag("json_report") {
        match export_json(&results) {
            Ok(file) => println!("JSON report written to {}", file),
            Err(err) => tracing::error!(error = %err, "failed to write JSON report"),
        }
    }

    Ok(ExitCode::from(exit_code(&results)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    match run(&matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}
