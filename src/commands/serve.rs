use clap::{Arg, ArgAction, ArgMatches, Command};
use kiln_runtime::workspace::{provision_async, WorkspaceConfig};
use kiln_runtime::{HttpApiServer, LlmEngine, RuntimeError, ServerConfig, ServerState};
use std::sync::Arc;

pub fn command() -> Command {
    Command::new("serve")
        .about("Start the generation HTTP server")
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host address to bind to"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("Port to bind the server to"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (defaults to environment variables)"),
        )
        .arg(
            Arg::new("no-cors")
                .long("no-cors")
                .action(ArgAction::SetTrue)
                .help("Disable permissive CORS headers"),
        )
}

pub async fn run(matches: &ArgMatches) -> Result<(), RuntimeError> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config(matches)?;

    let mut state_dir = None;
    if let Some(workspace) = &config.workspace {
        state_dir = provision_workspace(workspace).await;
    }

    let engine = LlmEngine::new(config.llm.clone())?;

    let mut state = ServerState::new(Arc::new(engine));
    if let Some(dir) = state_dir {
        state = state.with_working_directory(dir);
    }

    println!("✓ Kiln v{} listening on {}", env!("CARGO_PKG_VERSION"), config.bind_addr());
    HttpApiServer::new(config, state).start().await
}

/// Resolve the server configuration from the file or the environment, then
/// apply command-line overrides.
fn load_config(matches: &ArgMatches) -> Result<ServerConfig, RuntimeError> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env()?,
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.bind_address = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    if matches.get_flag("no-cors") {
        config.enable_cors = false;
    }

    config.validate()?;
    Ok(config)
}

/// Provisioning failures are logged and the server starts without a default
/// working directory.
async fn provision_workspace(workspace: &WorkspaceConfig) -> Option<std::path::PathBuf> {
    match provision_async(workspace.clone()).await {
        Ok(result) => {
            tracing::info!(dir = %result.workspace_dir.display(), "{}", result.message);
            Some(result.workspace_dir)
        }
        Err(e) => {
            tracing::error!(error = %e, "Workspace provisioning failed");
            None
        }
    }
}
