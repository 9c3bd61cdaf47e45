use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueHint};
use pkgsync_core::dispatch::Selection;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Which upstream names to sync. Defaults to every name.
#[derive(ClapArgs, Clone, Copy, Debug)]
#[group(multiple = false)]
pub struct SelectionArgs {
    /// Only names that are not stored yet
    #[arg(long)]
    pub missing: bool,

    /// Only recently updated names
    #[arg(long)]
    pub recent: bool,
}

impl SelectionArgs {
    pub fn selection(&self) -> Selection {
        if self.missing {
            Selection::Missing
        } else if self.recent {
            Selection::RecentlyUpdated
        } else {
            Selection::All
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,

    /// Print the configuration file to stdout
    Config,

    /// List configured registries and their package counts
    #[clap(name = "registries", visible_alias = "ls")]
    Registries,

    /// Sync packages of one registry
    #[command(arg_required_else_help = true)]
    Sync {
        /// Registry name
        #[arg(required = true)]
        registry: String,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Enqueue the syncs and run them on the worker pool
        #[arg(required = false, long, short)]
        background: bool,
    },

    /// Sync packages of every registry on the worker pool
    #[clap(name = "sync-all")]
    SyncAll {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Sync a single package and print the result
    #[command(arg_required_else_help = true)]
    #[clap(name = "sync-package")]
    SyncPackage {
        /// Registry name
        #[arg(required = true)]
        registry: String,

        /// Package name
        #[arg(required = true)]
        name: String,
    },

    /// Look up stored packages; misses are synced before exit
    #[command(arg_required_else_help = true)]
    #[clap(name = "lookup", visible_alias = "query")]
    Lookup {
        /// Package name
        #[arg(required = true)]
        name: String,

        /// Restrict to an ecosystem
        #[arg(required = false, long, short, conflicts_with = "purl_type")]
        ecosystem: Option<String>,

        /// Package URL type, e.g. docker
        #[arg(required = false, long)]
        purl_type: Option<String>,

        /// Package URL namespace
        #[arg(required = false, long, requires = "purl_type")]
        namespace: Option<String>,

        /// Treat NAME as a repository URL and list every package built from it
        #[arg(long, conflicts_with_all = ["ecosystem", "purl_type"])]
        repository: bool,
    },

    /// Show one package of a registry with its versions
    #[command(arg_required_else_help = true)]
    Show {
        /// Registry name
        #[arg(required = true)]
        registry: String,

        /// Package name
        #[arg(required = true)]
        name: String,
    },

    /// Request a sync of a package, known or not
    #[command(arg_required_else_help = true)]
    Ping {
        /// Registry name
        #[arg(required = true)]
        registry: String,

        /// Package name
        #[arg(required = true)]
        name: String,
    },

    /// Request syncs of every package sharing a repository URL
    #[command(arg_required_else_help = true)]
    #[clap(name = "ping-repository")]
    PingRepository {
        /// Repository URL
        #[arg(required = true, value_hint = ValueHint::Url)]
        url: String,
    },

    /// Fetch repository metadata for a package
    #[command(arg_required_else_help = true)]
    #[clap(name = "refresh-repo-metadata")]
    RefreshRepoMetadata {
        /// Registry name
        #[arg(required = true)]
        registry: String,

        /// Package name
        #[arg(required = true)]
        name: String,
    },

    /// Enqueue recently updated packages of every registry and work until drained
    Worker {
        #[command(flatten)]
        selection: SelectionArgs,
    },
}
