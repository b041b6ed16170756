//! Baculum API CLI
//!
//! Runs the REST API server and offers direct access to the console, the
//! LStat decoder and the OAuth2 token store.

use baculum_api::api::handlers::AppState;
use baculum_api::api::ApiServer;
use baculum_api::auth::{FileTokenStore, TokenRecord, TokenStore};
use baculum_api::config::{ApiConfig, CliArgs, Commands, LogFormat, TokenCommand};
use baculum_api::console::{CommandRequest, Console};
use baculum_api::error::{ApiError, Result};
use baculum_api::parser::LStat;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    let config = match ApiConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    // Handle result
    if let Err(e) = run(&args, config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-v`, `-vv` or `api.debug` raise the level.
fn init_logging(args: &CliArgs, config: &ApiConfig) {
    let default_level = match args.verbose {
        0 if config.api.debug => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: &CliArgs, config: ApiConfig) -> Result<()> {
    match &args.command {
        Commands::Serve { bind, port } => cmd_serve(config, bind.clone(), *port),
        Commands::Exec {
            director,
            api,
            tokens,
        } => cmd_exec(&config, director.as_deref(), *api, tokens),
        Commands::Directors => cmd_directors(&config),
        Commands::Lstat { encoded } => cmd_lstat(encoded),
        Commands::Token { action } => cmd_token(&config, action),
    }
}

fn cmd_serve(config: ApiConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string());
    tracing::info!(
        host = %host,
        version = baculum_api::VERSION,
        api_version = baculum_api::API_VERSION,
        "Starting Baculum API"
    );
    if !config.console.enabled {
        tracing::warn!("Console support is disabled, console endpoints will fail");
    }

    let state = AppState::new(config)?;
    let server = ApiServer::new(state).with_listener(bind, port);
    server.run()
}

fn cmd_exec(config: &ApiConfig, director: Option<&str>, api: bool, tokens: &[String]) -> Result<()> {
    let console = Console::new(config.console.clone());
    let mut request = CommandRequest::new(tokens.iter().cloned()).on_director(director);
    if api {
        request = request.with_api_mode();
    }

    let result = console.execute(&request, None)?;
    for line in result.without_echo() {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_directors(config: &ApiConfig) -> Result<()> {
    let console = Console::new(config.console.clone());
    for director in console.directors(None)?.output {
        println!("{}", director);
    }
    Ok(())
}

fn cmd_lstat(encoded: &str) -> Result<()> {
    let stat = LStat::decode(encoded)
        .ok_or_else(|| ApiError::config(format!("Invalid LStat value: {}", encoded)))?;
    println!("{}", serde_json::to_string_pretty(&stat)?);
    Ok(())
}

fn cmd_token(config: &ApiConfig, action: &TokenCommand) -> Result<()> {
    let store = FileTokenStore::open(&config.tokens_path)?;

    match action {
        TokenCommand::Issue {
            client_id,
            scope,
            ttl,
            console_cfg,
        } => {
            let record = TokenRecord::issue(client_id.as_str(), scope.as_str(), *ttl, console_cfg.clone());
            store.insert(record.clone())?;
            tracing::info!(client_id = %record.client_id, expires = record.expires, "Token issued");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        TokenCommand::Purge => {
            let removed = store.delete_expired(Utc::now().timestamp())?;
            println!("Removed {} expired token(s)", removed);
        }
    }
    Ok(())
}
