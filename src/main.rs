//! SSH agent with host-verified approval for forwarded connections.
//!
//! Usage:
//!
//!   $ loee-agent --socket ~/.ssh/agent.sock --forward-socket ~/.ssh/agent.fwd.sock \
//!         --key ~/.ssh/id_ed25519
//!   $ export SSH_AUTH_SOCK=~/.ssh/agent.sock
//!   $ ssh ...
//!
//! Clients on the `--socket` path sign without interaction. Clients on the
//! `--forward-socket` path, reached through SSH agent forwarding, are
//! asked for confirmation on the terminal, with the requesting host
//! identified through the session-bind extension and `known_hosts`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use loee_agent::agent::Agent;
use loee_agent::approval::{ApprovalPrompt, TtyPrompt};
use loee_agent::client::UpstreamClient;
use loee_agent::handler::RequestHandler;
use loee_agent::known_hosts::KnownHosts;
use loee_agent::vault::FileVault;

/// SSH agent that tells you which host is asking.
///
/// Two Unix sockets are served. The one passed with --socket is meant for
/// this machine: export it as SSH_AUTH_SOCK and signatures happen without
/// questions. The one passed with --forward-socket is meant to be the
/// target of agent forwarding (ForwardAgent); every signature requested
/// through it must be approved on this terminal, and the prompt names the
/// host behind the request whenever the client supplied a session binding.
///
/// If SSH_AUTH_SOCK already points at another agent when this one starts,
/// that agent's keys remain usable: they are listed alongside the local
/// ones and signing is forwarded to it, behind the same approval gate.
#[derive(Debug, Parser)]
#[command(name = "loee-agent", version)]
struct Cli {
    /// Unix socket for local clients (signs without prompting).
    #[arg(long)]
    socket: PathBuf,

    /// Unix socket for forwarded clients (signs after approval).
    #[arg(long)]
    forward_socket: PathBuf,

    /// OpenSSH private key file to serve; may be given multiple times.
    /// Ed25519 and ECDSA P-256 keys are supported.
    #[arg(long = "key", value_name = "PATH")]
    keys: Vec<PathBuf>,

    /// known_hosts file for identifying bound hosts.
    /// Defaults to ~/.ssh/known_hosts.
    #[arg(long, value_name = "PATH")]
    known_hosts: Option<PathBuf>,

    /// Approve forwarded sign requests without asking.
    #[arg(long)]
    auto_approve: bool,
}

fn default_known_hosts() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Capture the previous agent before our own paths go anywhere near the
    // environment.
    let upstream = UpstreamClient::from_env(&[&cli.socket, &cli.forward_socket]);
    match &upstream {
        Some(upstream) => info!("proxying unknown keys to {}", upstream.path().display()),
        None => info!("no upstream agent"),
    }

    let known_hosts = match cli.known_hosts.or_else(default_known_hosts) {
        Some(path) => match KnownHosts::load(&path) {
            Ok(store) => {
                info!("{} known_hosts entries from {}", store.len(), path.display());
                store
            }
            Err(error) => {
                warn!("could not read {}: {error}; hosts will be unknown", path.display());
                KnownHosts::empty()
            }
        },
        None => {
            warn!("no known_hosts file; hosts will be unknown");
            KnownHosts::empty()
        }
    };

    let vault = FileVault::load(&cli.keys)?;

    let approval: Option<Arc<dyn ApprovalPrompt>> = if cli.auto_approve {
        warn!("auto-approve is on; forwarded requests will NOT be confirmed");
        None
    } else {
        Some(Arc::new(TtyPrompt))
    };

    let handler = RequestHandler::new(Arc::new(vault), known_hosts, approval, upstream);

    warn!("To use this agent process:");
    warn!("export SSH_AUTH_SOCK={}", cli.socket.display());

    Agent::new(handler, cli.socket, cli.forward_socket).run().await?;
    Ok(())
}
