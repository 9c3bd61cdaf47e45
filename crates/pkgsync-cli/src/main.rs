use std::{env, fs, sync::Arc};

use clap::Parser;
use cli::{Args, Commands};
use logging::setup_logging;
use pkgsync_config::{
    config::{self, config_path, generate_default_config, get_config, set_config_path, Config},
    error::ConfigError,
};
use pkgsync_core::{
    dispatch::Selection,
    error::{ErrorContext, SyncError},
    events::{ChannelSink, EventSinkHandle, NullSink},
    lookup::LookupQuery,
    SyncContext, SyncResult,
};
use pkgsync_registry::http::configure_http_client;
use pkgsync_utils::path::resolve_path;
use progress::{spawn_event_handler, ProgressGuard};
use query::{lookup_packages, ping_package, ping_repository, refresh_metadata, show_package};
use registries::list_registries;
use sync::{sync_all_registries, sync_registry, sync_single_package};
use tracing::{debug, info, warn};
use utils::{progress_enabled, set_flag, COLOR, PROGRESS};

mod cli;
mod logging;
mod progress;
mod query;
mod registries;
mod sync;
mod utils;

fn create_context(config: Config) -> SyncResult<(SyncContext, Option<ProgressGuard>)> {
    if progress_enabled() {
        let (sink, receiver) = ChannelSink::new();
        let events: EventSinkHandle = Arc::new(sink);
        let ctx = SyncContext::open(config, events)?;
        let guard = spawn_event_handler(receiver);
        Ok((ctx, Some(guard)))
    } else {
        let events: EventSinkHandle = Arc::new(NullSink);
        let ctx = SyncContext::open(config, events)?;
        Ok((ctx, None))
    }
}

fn print_config() -> SyncResult<()> {
    let path = config_path();
    let content = match fs::read_to_string(&path) {
        Ok(v) => v,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found", path.display());
            toml::to_string_pretty(&Config::default_config()).map_err(ConfigError::from)?
        }
        Err(err) => {
            return Err(SyncError::IoError {
                action: "reading config".to_string(),
                source: err,
            });
        }
    };
    info!("{}", content);
    Ok(())
}

fn lookup_query(
    name: String,
    ecosystem: Option<String>,
    purl_type: Option<String>,
    namespace: Option<String>,
    repository: bool,
) -> LookupQuery {
    if repository {
        return LookupQuery::RepositoryUrl { url: name };
    }
    match (ecosystem, purl_type) {
        (_, Some(purl_type)) => {
            LookupQuery::Purl {
                purl_type,
                namespace,
                name,
            }
        }
        (Some(ecosystem), None) => {
            LookupQuery::Ecosystem {
                ecosystem,
                name,
            }
        }
        (None, None) => LookupQuery::Name { name },
    }
}

async fn run_command(ctx: &SyncContext, command: Commands) -> SyncResult<()> {
    match command {
        Commands::Registries => list_registries(ctx)?,
        Commands::Sync {
            registry,
            selection,
            background,
        } => sync_registry(ctx, &registry, selection.selection(), background).await?,
        Commands::SyncAll { selection } => sync_all_registries(ctx, selection.selection()).await?,
        Commands::SyncPackage { registry, name } => {
            sync_single_package(ctx, &registry, &name).await?
        }
        Commands::Lookup {
            name,
            ecosystem,
            purl_type,
            namespace,
            repository,
        } => {
            let query = lookup_query(name, ecosystem, purl_type, namespace, repository);
            lookup_packages(ctx, query).await?
        }
        Commands::Show { registry, name } => show_package(ctx, &registry, &name).await?,
        Commands::Ping { registry, name } => ping_package(ctx, &registry, &name).await?,
        Commands::PingRepository { url } => ping_repository(ctx, &url).await?,
        Commands::RefreshRepoMetadata { registry, name } => {
            refresh_metadata(ctx, &registry, &name).await?
        }
        Commands::Worker { selection } => {
            let selection = if selection.missing {
                Selection::Missing
            } else {
                Selection::RecentlyUpdated
            };
            sync_all_registries(ctx, selection).await?
        }
        Commands::DefConfig | Commands::Config => unreachable!(),
    }
    Ok(())
}

async fn handle_cli() -> SyncResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        set_flag(&COLOR, false);
    }
    if args.no_progress || args.json || args.quiet {
        set_flag(&PROGRESS, false);
    }

    if let Some(ref c) = args.config {
        let path = resolve_path(c).map_err(ConfigError::from)?;
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .with_context(|| "retrieving current directory".into())?
                .join(path)
        };
        set_config_path(path);
    }

    match args.command {
        Commands::DefConfig => generate_default_config()?,
        Commands::Config => print_config()?,
        command => {
            config::init()?;
            let config = get_config();

            let user_agent = args.user_agent.clone().or_else(|| config.user_agent.clone());
            let timeout = config.http_timeout()?;
            configure_http_client(|client| {
                if let Some(user_agent) = user_agent {
                    client.user_agent = Some(user_agent);
                }
                if timeout.is_some() {
                    client.timeout = timeout;
                }
            });
            debug!(workers = config.workers(), "configuration loaded");

            let (ctx, progress_guard) = create_context(config)?;
            let result = run_command(&ctx, command).await;

            // Dropping the context closes the event channel so the progress
            // thread can drain and exit.
            drop(ctx);
            if let Some(guard) = progress_guard {
                guard.finish();
            }
            progress::stop();
            result?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
