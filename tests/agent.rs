//! End-to-end tests speaking raw agent protocol over real Unix sockets.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use signature::Signer as _;
use ssh_encoding::{Decode, Encode};
use testresult::TestResult;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use loee_agent::agent::{bind_socket, serve_listener};
use loee_agent::handler::{RequestHandler, SocketType};
use loee_agent::known_hosts::KnownHosts;
use loee_agent::proto::public_key::ed25519_blob;
use loee_agent::proto::signature::{ed25519_to_ssh, split_blob};
use loee_agent::proto::{Request, Response, SessionBind};
use loee_agent::vault::{Ed25519Signer, FileVault, Signer as _};

const HOST: &str = "myserver.example.com";

struct TestAgent {
    _dir: tempfile::TempDir,
    stream: UnixStream,
    signer_blob: Vec<u8>,
    host_key: ed25519_dalek::SigningKey,
    host_blob: Vec<u8>,
}

/// Stand up a one-socket agent in a tempdir and connect to it.
async fn start_agent(socket_type: SocketType, vault_empty: bool) -> TestResult<TestAgent> {
    let signer = Ed25519Signer::new(ed25519_dalek::SigningKey::generate(&mut OsRng), "e2e key")?;
    let signer_blob = signer.public_key_blob().to_vec();
    let mut vault = FileVault::empty();
    if !vault_empty {
        vault.insert(Arc::new(signer));
    }

    let host_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
    let host_blob = ed25519_blob(host_key.verifying_key().as_bytes())?;
    let known_hosts = KnownHosts::parse(&format!(
        "{HOST} ssh-ed25519 {}\n",
        STANDARD.encode(&host_blob)
    ));

    let handler = RequestHandler::new(Arc::new(vault), known_hosts, None, None);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("agent.sock");
    let listener = bind_socket(&path)?;
    tokio::spawn(serve_listener(listener, socket_type, Arc::new(handler)));

    let stream = UnixStream::connect(&path).await?;
    Ok(TestAgent {
        _dir: dir,
        stream,
        signer_blob,
        host_key,
        host_blob,
    })
}

async fn send_raw(stream: &mut UnixStream, bytes: &[u8]) -> TestResult {
    stream.write_all(bytes).await?;
    Ok(())
}

async fn send_request(stream: &mut UnixStream, request: &Request) -> TestResult {
    let mut bytes = Vec::new();
    (request.encoded_len()? as u32).encode(&mut bytes)?;
    request.encode(&mut bytes)?;
    stream.write_all(&bytes).await?;
    Ok(())
}

async fn read_frame(stream: &mut UnixStream) -> TestResult<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await?;
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn read_response(stream: &mut UnixStream) -> TestResult<Response> {
    let body = read_frame(stream).await?;
    Ok(Response::decode(&mut &body[..])?)
}

fn userauth_payload(session_id: &[u8], key_blob: &[u8]) -> TestResult<Vec<u8>> {
    let mut data = Vec::new();
    session_id.encode(&mut data)?;
    data.push(50);
    "alice".encode(&mut data)?;
    "ssh-connection".encode(&mut data)?;
    "publickey".encode(&mut data)?;
    data.push(1);
    "ssh-ed25519".encode(&mut data)?;
    key_blob.encode(&mut data)?;
    Ok(data)
}

#[tokio::test]
async fn empty_vault_answers_no_identities() -> TestResult {
    let mut agent = start_agent(SocketType::Local, true).await?;

    // literal REQUEST_IDENTITIES frame
    send_raw(&mut agent.stream, &[0x00, 0x00, 0x00, 0x01, 0x0b]).await?;

    let mut reply = [0u8; 9];
    agent.stream.read_exact(&mut reply).await?;
    assert_eq!(reply, [0x00, 0x00, 0x00, 0x05, 0x0c, 0x00, 0x00, 0x00, 0x00]);
    Ok(())
}

#[tokio::test]
async fn listed_key_signs_verifiably() -> TestResult {
    let mut agent = start_agent(SocketType::Local, false).await?;

    send_request(&mut agent.stream, &Request::RequestIdentities).await?;
    let response = read_response(&mut agent.stream).await?;
    let Response::IdentitiesAnswer(identities) = response else {
        panic!("expected identities, got {response:?}");
    };
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].key_blob, agent.signer_blob);

    let message = b"login attempt".to_vec();
    send_request(
        &mut agent.stream,
        &Request::SignRequest(loee_agent::proto::SignRequest {
            key_blob: agent.signer_blob.clone(),
            data: message.clone(),
            flags: 0,
        }),
    )
    .await?;

    let Response::SignResponse(signature) = read_response(&mut agent.stream).await? else {
        panic!("expected a signature");
    };
    let (algorithm, raw) = split_blob(&signature)?;
    assert_eq!(algorithm, "ssh-ed25519");

    let public = loee_agent::proto::public_key::ed25519_public_from_blob(&agent.signer_blob)?;
    ed25519_dalek::VerifyingKey::from_bytes(&public)?
        .verify_strict(&message, &ed25519_dalek::Signature::from_slice(&raw)?)?;
    Ok(())
}

#[tokio::test]
async fn session_bind_then_sign_on_one_socket() -> TestResult {
    let mut agent = start_agent(SocketType::Forwarded, false).await?;

    let session_id = b"0123456789abcdef0123456789abcdef".to_vec();
    let bind = SessionBind {
        hostname: HOST.into(),
        host_key_blob: agent.host_blob.clone(),
        session_id: session_id.clone(),
        host_key_signature: ed25519_to_ssh(&agent.host_key.sign(&session_id).to_bytes())?,
        is_forwarded: true,
    };

    send_request(&mut agent.stream, &Request::SessionBind(bind)).await?;
    assert_eq!(read_response(&mut agent.stream).await?, Response::Success);

    // with no approval prompt configured, the forwarded socket still signs
    send_request(
        &mut agent.stream,
        &Request::SignRequest(loee_agent::proto::SignRequest {
            key_blob: agent.signer_blob.clone(),
            data: userauth_payload(&session_id, &agent.signer_blob)?,
            flags: 0,
        }),
    )
    .await?;
    assert!(matches!(
        read_response(&mut agent.stream).await?,
        Response::SignResponse(_)
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_frames_answer_failure_and_keep_the_connection() -> TestResult {
    let mut agent = start_agent(SocketType::Local, true).await?;

    // SIGN_REQUEST with a truncated body
    send_raw(&mut agent.stream, &[0x00, 0x00, 0x00, 0x02, 0x0d, 0x01]).await?;
    assert_eq!(read_response(&mut agent.stream).await?, Response::Failure);

    // unsupported type 18 (remove identity)
    send_raw(&mut agent.stream, &[0x00, 0x00, 0x00, 0x01, 0x12]).await?;
    assert_eq!(read_response(&mut agent.stream).await?, Response::Failure);

    // the connection still serves well-formed requests
    send_request(&mut agent.stream, &Request::RequestIdentities).await?;
    assert!(matches!(
        read_response(&mut agent.stream).await?,
        Response::IdentitiesAnswer(_)
    ));
    Ok(())
}

#[tokio::test]
async fn requests_are_answered_in_order() -> TestResult {
    let mut agent = start_agent(SocketType::Local, true).await?;

    // two identities requests and an unknown type, written back to back
    let mut burst = Vec::new();
    for _ in 0..2 {
        burst.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x0b]);
    }
    burst.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x14]);
    send_raw(&mut agent.stream, &burst).await?;

    assert!(matches!(
        read_response(&mut agent.stream).await?,
        Response::IdentitiesAnswer(_)
    ));
    assert!(matches!(
        read_response(&mut agent.stream).await?,
        Response::IdentitiesAnswer(_)
    ));
    assert_eq!(read_response(&mut agent.stream).await?, Response::Failure);
    Ok(())
}
