//! Request dispatch and the session-binding table.
//!
//! One handler is shared by every connection on both sockets. It owns the
//! mapping from session identifiers to verified host contexts: a
//! `session-bind` message proves and records *which host* a session talks
//! to, and later sign requests for that session surface the recorded host
//! to the approval prompt.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};

use crate::approval::{ApprovalPrompt, SignerDescription};
use crate::client::UpstreamClient;
use crate::host_verify;
use crate::known_hosts::{HostVerification, KnownHosts};
use crate::proto::{Identity, Request, Response, SessionBind, SignRequest, UserauthRequest};
use crate::vault::{KeyVault, ProxySignerView};

/// Which of the agent's two sockets a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    /// The socket for clients on this machine; signs without prompting.
    Local,

    /// The socket reached through SSH agent forwarding; every sign request
    /// is gated on approval.
    Forwarded,
}

/// Host identity recorded for one bound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedHostContext {
    /// Hostname the client claimed.
    pub hostname: String,

    /// How the claimed host key compared against `known_hosts`.
    pub verification: HostVerification,

    /// Whether the binding was made for agent forwarding.
    pub is_forwarded: bool,
}

/// Shared request handler. Sits behind an `Arc`, called concurrently from
/// every connection task.
pub struct RequestHandler {
    vault: Arc<dyn KeyVault>,
    known_hosts: KnownHosts,
    approval: Option<Arc<dyn ApprovalPrompt>>,
    upstream: Option<UpstreamClient>,
    /// Session id → host context. Entries live until the process exits.
    bindings: Mutex<HashMap<Vec<u8>, VerifiedHostContext>>,
}

impl RequestHandler {
    /// Assemble a handler from its collaborators.
    pub fn new(
        vault: Arc<dyn KeyVault>,
        known_hosts: KnownHosts,
        approval: Option<Arc<dyn ApprovalPrompt>>,
        upstream: Option<UpstreamClient>,
    ) -> Self {
        Self {
            vault,
            known_hosts,
            approval,
            upstream,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Answer one request. Internal errors never escape: they are logged
    /// and turned into [`Response::Failure`].
    pub async fn handle(&self, request: Request, socket_type: SocketType) -> Response {
        match request {
            Request::RequestIdentities => self.list_identities().await,
            Request::SignRequest(request) => self.sign(request, socket_type).await,
            Request::SessionBind(bind) => self.bind_session(bind),
            Request::Unknown(command) => {
                debug!("refusing unsupported request type {command}");
                Response::Failure
            }
        }
    }

    /// Vault identities first, then (when configured) the upstream
    /// agent's, in stable order.
    async fn list_identities(&self) -> Response {
        let mut identities = Vec::new();

        for id in self.vault.list() {
            // a key that fails to load is treated as absent
            let Some(signer) = self.vault.load(&id) else {
                debug!("key {} listed but not loadable, skipping", id.id);
                continue;
            };
            identities.push(Identity {
                key_blob: signer.public_key_blob().to_vec(),
                comment: signer.comment().to_string(),
            });
        }

        if let Some(upstream) = self.upstream.clone() {
            match tokio::task::spawn_blocking(move || upstream.request_identities()).await {
                Ok(upstream_identities) => identities.extend(upstream_identities),
                Err(error) => debug!("upstream identities task failed: {error}"),
            }
        }

        Response::IdentitiesAnswer(identities)
    }

    /// Record a session binding after checking its host-key proof.
    fn bind_session(&self, bind: SessionBind) -> Response {
        if !host_verify::verify_session_signature(
            &bind.host_key_blob,
            &bind.session_id,
            &bind.host_key_signature,
        ) {
            warn!(
                "rejecting session bind for {}: host key signature does not cover the session",
                bind.hostname
            );
            return Response::Failure;
        }

        let verification = self.known_hosts.verify(&bind.hostname, 22, &bind.host_key_blob);
        match &verification {
            HostVerification::Verified(hostname) => {
                info!("session bound to {hostname} (key on record)");
            }
            HostVerification::Mismatch(hostname) => {
                warn!("session bound to {hostname} with a key DIFFERENT from known_hosts");
            }
            HostVerification::Unknown(hostname) => {
                info!("session bound to {hostname} (host not in known_hosts)");
            }
        }

        let context = VerifiedHostContext {
            hostname: bind.hostname,
            verification,
            is_forwarded: bind.is_forwarded,
        };

        let Ok(mut bindings) = self.bindings.lock() else {
            error!("session binding table poisoned");
            return Response::Failure;
        };
        bindings.insert(bind.session_id, context);
        Response::Success
    }

    async fn sign(&self, request: SignRequest, socket_type: SocketType) -> Response {
        let local = self
            .vault
            .list_all_signers()
            .into_iter()
            .find(|signer| signer.public_key_blob() == request.key_blob);

        // Advisory context: which session, who, where.
        let payload = UserauthRequest::parse(&request.data).ok();
        let host_context = payload
            .as_ref()
            .and_then(|payload| self.lookup_binding(&payload.session_id));

        if socket_type == SocketType::Forwarded {
            if let Some(prompt) = &self.approval {
                let subject = match (&local, &self.upstream) {
                    (Some(signer), _) => Some(SignerDescription::local(signer.as_ref())),
                    (None, Some(_)) => Some(SignerDescription::Proxy(ProxySignerView::from_blob(
                        request.key_blob.clone(),
                    ))),
                    (None, None) => None,
                };

                if let Some(subject) = subject {
                    if !prompt
                        .approve(&subject, payload.as_ref(), host_context.as_ref())
                        .await
                    {
                        info!("denied forwarded sign request with {}", subject.fingerprint());
                        return Response::Failure;
                    }
                }
            }
        }

        if let Some(signer) = local {
            match signer.sign(&request.data) {
                Ok(signature) => Response::SignResponse(signature),
                Err(error) => {
                    error!("signing with {} failed: {error}", signer.fingerprint());
                    Response::Failure
                }
            }
        } else if let Some(upstream) = self.upstream.clone() {
            let SignRequest { key_blob, data, flags } = request;
            match tokio::task::spawn_blocking(move || upstream.sign(&key_blob, &data, flags)).await
            {
                Ok(Some(signature)) => Response::SignResponse(signature),
                Ok(None) => Response::Failure,
                Err(error) => {
                    debug!("upstream sign task failed: {error}");
                    Response::Failure
                }
            }
        } else {
            debug!("sign request for a key this agent does not hold");
            Response::Failure
        }
    }

    fn lookup_binding(&self, session_id: &[u8]) -> Option<VerifiedHostContext> {
        self.bindings.lock().ok()?.get(session_id).cloned()
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("known_hosts", &self.known_hosts.len())
            .field("approval", &self.approval.is_some())
            .field("upstream", &self.upstream.as_ref().map(|u| u.path()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use rand::rngs::OsRng;
    use signature::Signer as _;
    use ssh_encoding::Encode;
    use testresult::TestResult;

    use crate::proto::public_key::ed25519_blob;
    use crate::proto::signature::ed25519_to_ssh;
    use crate::vault::{Ed25519Signer, FileVault, Signer};

    use super::*;

    const HOST: &str = "myserver.example.com";

    struct Fixture {
        handler: RequestHandler,
        signer_blob: Vec<u8>,
        host_blob: Vec<u8>,
        session_id: Vec<u8>,
        bind: SessionBind,
    }

    /// Approval stub recording how it was called.
    #[derive(Default)]
    struct RecordingPrompt {
        allow: bool,
        calls: AtomicUsize,
        last_blob: Mutex<Option<Vec<u8>>>,
        last_host: Mutex<Option<VerifiedHostContext>>,
    }

    #[async_trait]
    impl ApprovalPrompt for RecordingPrompt {
        async fn approve(
            &self,
            signer: &SignerDescription,
            _payload: Option<&UserauthRequest>,
            host: Option<&VerifiedHostContext>,
        ) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let SignerDescription::Proxy(view) = signer {
                *self.last_blob.lock().unwrap() = Some(view.public_key_blob.clone());
            }
            *self.last_host.lock().unwrap() = host.cloned();
            self.allow
        }
    }

    fn fixture(
        approval: Option<Arc<dyn ApprovalPrompt>>,
        upstream: Option<UpstreamClient>,
    ) -> TestResult<Fixture> {
        let signer = Ed25519Signer::new(
            ed25519_dalek::SigningKey::generate(&mut OsRng),
            "vault key",
        )?;
        let signer_blob = signer.public_key_blob().to_vec();
        let mut vault = FileVault::empty();
        vault.insert(Arc::new(signer));

        let host_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let host_blob = ed25519_blob(host_key.verifying_key().as_bytes())?;
        let known_hosts = KnownHosts::parse(&format!(
            "{HOST} ssh-ed25519 {}\n",
            STANDARD.encode(&host_blob)
        ));

        let session_id = b"0123456789abcdef0123456789abcdef".to_vec();
        let bind = SessionBind {
            hostname: HOST.into(),
            host_key_blob: host_blob.clone(),
            session_id: session_id.clone(),
            host_key_signature: ed25519_to_ssh(&host_key.sign(&session_id).to_bytes())?,
            is_forwarded: true,
        };

        Ok(Fixture {
            handler: RequestHandler::new(Arc::new(vault), known_hosts, approval, upstream),
            signer_blob,
            host_blob,
            session_id,
            bind,
        })
    }

    fn userauth_payload(session_id: &[u8], key_blob: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        session_id.encode(&mut data).unwrap();
        data.push(50);
        "alice".encode(&mut data).unwrap();
        "ssh-connection".encode(&mut data).unwrap();
        "publickey".encode(&mut data).unwrap();
        data.push(1);
        "ssh-ed25519".encode(&mut data).unwrap();
        key_blob.encode(&mut data).unwrap();
        data
    }

    fn sign_request(fixture: &Fixture) -> Request {
        Request::SignRequest(SignRequest {
            key_blob: fixture.signer_blob.clone(),
            data: userauth_payload(&fixture.session_id, &fixture.signer_blob),
            flags: 0,
        })
    }

    #[tokio::test]
    async fn identities_come_from_the_vault() -> TestResult {
        let fixture = fixture(None, None)?;
        let response = fixture
            .handler
            .handle(Request::RequestIdentities, SocketType::Local)
            .await;

        let Response::IdentitiesAnswer(identities) = response else {
            panic!("expected identities answer");
        };
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].key_blob, fixture.signer_blob);
        assert_eq!(identities[0].comment, "vault key");
        Ok(())
    }

    #[tokio::test]
    async fn local_socket_signs_without_prompting() -> TestResult {
        let prompt = Arc::new(RecordingPrompt { allow: false, ..Default::default() });
        let fixture = fixture(Some(prompt.clone()), None)?;

        let response = fixture.handler.handle(sign_request(&fixture), SocketType::Local).await;
        assert!(matches!(response, Response::SignResponse(_)));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn bound_session_context_reaches_the_prompt() -> TestResult {
        let prompt = Arc::new(RecordingPrompt { allow: true, ..Default::default() });
        let fixture = fixture(Some(prompt.clone()), None)?;

        let bound = fixture
            .handler
            .handle(Request::SessionBind(fixture.bind.clone()), SocketType::Forwarded)
            .await;
        assert_eq!(bound, Response::Success);

        let response = fixture
            .handler
            .handle(sign_request(&fixture), SocketType::Forwarded)
            .await;
        assert!(matches!(response, Response::SignResponse(_)));

        let host = prompt.last_host.lock().unwrap().clone().expect("host context");
        assert_eq!(host.hostname, HOST);
        assert_eq!(host.verification, HostVerification::Verified(HOST.into()));
        assert!(host.is_forwarded);
        Ok(())
    }

    #[tokio::test]
    async fn denial_stops_signing_and_upstream() -> TestResult {
        let prompt = Arc::new(RecordingPrompt { allow: false, ..Default::default() });
        // an upstream that would fail loudly if ever contacted
        let upstream = UpstreamClient::new("/nonexistent/upstream.sock");
        let fixture = fixture(Some(prompt.clone()), Some(upstream))?;

        let response = fixture
            .handler
            .handle(sign_request(&fixture), SocketType::Forwarded)
            .await;
        assert_eq!(response, Response::Failure);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_key_prompts_with_proxy_view() -> TestResult {
        let prompt = Arc::new(RecordingPrompt { allow: false, ..Default::default() });
        let upstream = UpstreamClient::new("/nonexistent/upstream.sock");
        let fixture = fixture(Some(prompt.clone()), Some(upstream))?;

        let foreign_blob = ed25519_blob(&[0x99; 32])?;
        let request = Request::SignRequest(SignRequest {
            key_blob: foreign_blob.clone(),
            data: userauth_payload(&fixture.session_id, &foreign_blob),
            flags: 0,
        });

        let response = fixture.handler.handle(request, SocketType::Forwarded).await;
        assert_eq!(response, Response::Failure);
        assert_eq!(prompt.last_blob.lock().unwrap().clone(), Some(foreign_blob));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_bind_proof_is_rejected() -> TestResult {
        let fixture = fixture(None, None)?;

        let mut forged = fixture.bind.clone();
        forged.session_id = b"a completely different session!!".to_vec();
        let response = fixture
            .handler
            .handle(Request::SessionBind(forged), SocketType::Forwarded)
            .await;
        assert_eq!(response, Response::Failure);

        // nothing was recorded
        assert!(fixture
            .handler
            .lookup_binding(b"a completely different session!!")
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_host_key_is_recorded_not_refused() -> TestResult {
        let fixture = fixture(None, None)?;

        // rebuild the fixture's known_hosts with a different key for HOST
        let other_blob = ed25519_blob(&[0x77; 32])?;
        let handler = RequestHandler::new(
            Arc::new(FileVault::empty()),
            KnownHosts::parse(&format!("{HOST} ssh-ed25519 {}\n", STANDARD.encode(&other_blob))),
            None,
            None,
        );

        let response = handler
            .handle(Request::SessionBind(fixture.bind.clone()), SocketType::Forwarded)
            .await;
        assert_eq!(response, Response::Success);
        assert_eq!(
            handler.lookup_binding(&fixture.session_id).map(|c| c.verification),
            Some(HostVerification::Mismatch(HOST.into()))
        );

        // sanity: the bind's own blob is the one known_hosts disagrees with
        assert_ne!(fixture.host_blob, other_blob);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_requests_fail() -> TestResult {
        let fixture = fixture(None, None)?;
        for command in [17u8, 22, 250] {
            let response = fixture
                .handler
                .handle(Request::Unknown(command), SocketType::Local)
                .await;
            assert_eq!(response, Response::Failure);
        }
        Ok(())
    }

    #[tokio::test]
    async fn unheld_key_without_upstream_fails() -> TestResult {
        let fixture = fixture(None, None)?;
        let request = Request::SignRequest(SignRequest {
            key_blob: ed25519_blob(&[0x55; 32])?,
            data: b"unstructured".to_vec(),
            flags: 0,
        });
        let response = fixture.handler.handle(request, SocketType::Local).await;
        assert_eq!(response, Response::Failure);
        Ok(())
    }
}
