//! CLI definition and entrypoint to executable
use crate::logs::init_tracing;
use clap::{Args, Parser, Subcommand};
use sn_config::{default_data_dir, NodeConfig, StyleNetDirs as _};
use sn_node::{launch_initiator, launch_processor, launch_rendezvous, RunningNode};
use std::{ffi::OsString, path::PathBuf};
use tokio::runtime::Builder;
use tracing::{info, info_span, Instrument as _};

/// The main stylenet cli interface.
///
/// This is the entrypoint to the executable.
#[derive(Debug, Parser)]
#[command(author, version, about = "Peer-to-peer style transfer", long_about = None)]
pub struct Cli {
    /// The command to run
    #[clap(subcommand)]
    pub command: Commands,

    /// The path to the data dir for all stylenet files and subdirectories.
    ///
    /// Defaults to the OS-specific data directory:
    ///
    /// - Linux: `$XDG_DATA_HOME/stylenet/` or `$HOME/.local/share/stylenet/`
    /// - Windows: `{FOLDERID_RoamingAppData}/stylenet/`
    /// - macOS: `$HOME/Library/Application Support/stylenet/`
    #[arg(long, value_name = "DATA_DIR", verbatim_doc_comment, global = true)]
    pub datadir: Option<PathBuf>,

    /// Path to the yaml config. Defaults to `stylenet.yaml` in the data dir.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Commands to be executed
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the rendezvous node and write the bootstrap descriptor.
    #[command(name = "rendezvous")]
    Rendezvous,

    /// Run a processor that stylizes received images.
    #[command(name = "processor")]
    Processor(IdentityArgs),

    /// Distribute a content directory for one style and collect the results.
    #[command(name = "initiator")]
    Initiator(InitiatorArgs),
}

/// Identity options for roles that join through the rendezvous node.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct IdentityArgs {
    /// Load or create `node.key` in the data dir instead of using a fresh identity.
    #[arg(long)]
    pub persist_identity: bool,
}

/// Arguments for the initiator.
#[derive(Debug, Clone, Args)]
pub struct InitiatorArgs {
    /// The style image.
    #[arg(long, value_name = "IMAGE")]
    pub style: PathBuf,

    /// Directory of content images.
    #[arg(long, value_name = "DIR")]
    pub content: PathBuf,

    #[clap(flatten)]
    pub identity: IdentityArgs,
}

impl Cli {
    /// Parsers only the default CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parsers only the default CLI arguments from the given iterator
    pub fn try_parse_args_from<I, T>(itr: I) -> Result<Self, clap::error::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(itr)
    }

    /// The data dir used by this invocation.
    pub fn datadir(&self) -> PathBuf {
        self.datadir.clone().unwrap_or_else(default_data_dir)
    }

    /// Load the node config from `--config` or the data dir.
    pub fn node_config(&self) -> eyre::Result<NodeConfig> {
        let path = self.config.clone().unwrap_or_else(|| self.datadir().config_path());
        NodeConfig::load_or_default(&path)
    }

    /// Execute the configured cli command.
    ///
    /// Runs until the node stops or ctrl-c is received.
    pub fn run(self) -> eyre::Result<()> {
        init_tracing(self.verbose)?;
        let datadir = self.datadir();
        let config = self.node_config()?;
        info!(target: "stylenet", ?datadir, "starting");

        let runtime = Builder::new_multi_thread()
            .thread_name("stylenet")
            .enable_io()
            .enable_time()
            .build()?;

        runtime.block_on(async move {
            let span = info_span!(target: "stylenet", "node-startup");
            let node = match self.command {
                Commands::Rendezvous => {
                    launch_rendezvous(&datadir, &config).instrument(span).await?
                }
                Commands::Processor(identity) => {
                    launch_processor(&datadir, &config, identity.persist_identity)
                        .instrument(span)
                        .await?
                }
                Commands::Initiator(args) => {
                    let (node, summary) = launch_initiator(
                        &datadir,
                        &config,
                        args.identity.persist_identity,
                        &args.style,
                        &args.content,
                    )
                    .instrument(span)
                    .await?;
                    info!(
                        target: "stylenet",
                        sent = summary.content_sent,
                        skipped = summary.skipped,
                        "distribution finished - collecting results until ctrl-c"
                    );
                    node
                }
            };
            run_until_shutdown(node).await
        })
    }
}

/// Wait for the node to stop or for ctrl-c.
async fn run_until_shutdown(node: RunningNode) -> eyre::Result<()> {
    tokio::select! {
        res = node.wait() => res,
        res = tokio::signal::ctrl_c() => {
            info!(target: "stylenet", "shutting down");
            Ok(res?)
        }
    }
}
