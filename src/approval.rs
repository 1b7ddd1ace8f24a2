//! Interactive approval of forwarded sign requests.
//!
//! Requests arriving over the forwarded socket originate on a remote
//! machine, so each signature is gated on an explicit decision. The prompt
//! may wait on the user for as long as it likes; it runs inside the
//! connection's own task and never holds the agent's locks.

use std::io::{BufRead, BufReader, Write};

use async_trait::async_trait;
use log::warn;

use crate::handler::VerifiedHostContext;
use crate::known_hosts::HostVerification;
use crate::proto::public_key::KeyAlgorithm;
use crate::proto::UserauthRequest;
use crate::vault::{ProxySignerView, Signer};

/// What the user is asked to authorize.
#[derive(Debug, Clone)]
pub enum SignerDescription {
    /// A key held by this agent.
    Local {
        /// Algorithm of the key.
        algorithm: KeyAlgorithm,
        /// Public key in SSH wire form.
        public_key_blob: Vec<u8>,
        /// `SHA256:` fingerprint of the key.
        fingerprint: String,
        /// Key comment.
        comment: String,
    },

    /// A key the request will be proxied upstream for.
    Proxy(ProxySignerView),
}

impl SignerDescription {
    /// Describe a local signer.
    pub fn local(signer: &dyn Signer) -> Self {
        Self::Local {
            algorithm: signer.algorithm(),
            public_key_blob: signer.public_key_blob().to_vec(),
            fingerprint: signer.fingerprint(),
            comment: signer.comment().to_string(),
        }
    }

    /// Fingerprint of the key being used.
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Local { fingerprint, .. } => fingerprint,
            Self::Proxy(view) => &view.fingerprint,
        }
    }
}

/// Decision callback for forwarded sign requests.
///
/// Both context arguments are best effort: a client that sent no
/// session binding, or an unparseable sign payload, leaves them `None`.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    /// Ask whether the described key may sign. Must resolve to a definite
    /// answer; `false` on any doubt.
    async fn approve(
        &self,
        signer: &SignerDescription,
        payload: Option<&UserauthRequest>,
        host: Option<&VerifiedHostContext>,
    ) -> bool;
}

/// Prompt on the controlling terminal.
///
/// The blocking read happens on a dedicated blocking thread so concurrent
/// connections keep flowing while the question is open.
#[derive(Debug, Default)]
pub struct TtyPrompt;

#[async_trait]
impl ApprovalPrompt for TtyPrompt {
    async fn approve(
        &self,
        signer: &SignerDescription,
        payload: Option<&UserauthRequest>,
        host: Option<&VerifiedHostContext>,
    ) -> bool {
        let question = render_question(signer, payload, host);
        tokio::task::spawn_blocking(move || ask_on_tty(&question))
            .await
            .unwrap_or(false)
    }
}

fn render_question(
    signer: &SignerDescription,
    payload: Option<&UserauthRequest>,
    host: Option<&VerifiedHostContext>,
) -> String {
    let mut question = String::from("forwarded sign request\n");

    match signer {
        SignerDescription::Local { fingerprint, comment, .. } => {
            question.push_str(&format!("  key: {fingerprint} ({comment})\n"));
        }
        SignerDescription::Proxy(view) => {
            question.push_str(&format!("  key: {} (via upstream agent)\n", view.fingerprint));
        }
    }

    match (payload, host) {
        (Some(payload), Some(context)) => {
            question.push_str(&format!(
                "  login: {}@{} {}\n",
                payload.username,
                context.hostname,
                describe_verification(&context.verification),
            ));
        }
        (Some(payload), None) => {
            question.push_str(&format!("  login: {} (host not identified)\n", payload.username));
        }
        _ => question.push_str("  no session context available\n"),
    }

    question
}

fn describe_verification(verification: &HostVerification) -> &'static str {
    match verification {
        HostVerification::Verified(_) => "[host key verified]",
        HostVerification::Mismatch(_) => "[HOST KEY MISMATCH, possible impersonation]",
        HostVerification::Unknown(_) => "[host not in known_hosts]",
    }
}

fn ask_on_tty(question: &str) -> bool {
    let mut tty = match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
    {
        Ok(tty) => tty,
        Err(error) => {
            warn!("cannot open /dev/tty for approval, denying: {error}");
            return false;
        }
    };

    if write!(tty, "{question}Allow? [y/N] ").and_then(|_| tty.flush()).is_err() {
        return false;
    }

    let mut answer = String::new();
    if BufReader::new(&tty).read_line(&mut answer).is_err() {
        return false;
    }

    matches!(answer.trim(), "y" | "Y" | "yes" | "YES")
}
