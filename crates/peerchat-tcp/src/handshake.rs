//! Connection handshake
//!
//! Both sides send a `Hello` carrying protocol name, version, display name,
//! public key and a fresh nonce, then an `Auth` with a signature over the other
//! side's nonce. The signed transcript binds the signer's own key, so a
//! signature cannot be replayed on another connection.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use peerchat_core::{IdentityKeyPair, PeerId, PeerInfo, Protocol, TransportError};
use rand_core::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

const HANDSHAKE_DOMAIN: &[u8] = b"peerchat/handshake/v1";

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    protocol: String,
    version: u32,
    name: String,
    public_key: [u8; 32],
    nonce: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
struct Auth {
    signature: Vec<u8>,
}

/// Local side of a handshake
pub(crate) struct Local<'a> {
    pub identity: &'a IdentityKeyPair,
    pub name: &'a str,
    pub protocol: Protocol,
}

/// Authenticate the remote end of a fresh connection
///
/// When dialing a static peer, `expected` is the key from its address and any
/// other key is rejected.
pub(crate) async fn perform<R, W>(
    local: &Local<'_>,
    reader: &mut FramedRead<R, LengthDelimitedCodec>,
    writer: &mut FramedWrite<W, LengthDelimitedCodec>,
    expected: Option<PeerId>,
    remote_addr: SocketAddr,
) -> peerchat_core::Result<PeerInfo>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let our_id = local.identity.peer_id();
    let mut nonce = [0u8; 32];
    rand_core::OsRng.fill_bytes(&mut nonce);

    send(
        writer,
        &Hello {
            protocol: local.protocol.name.to_string(),
            version: local.protocol.version,
            name: local.name.to_string(),
            public_key: *our_id.as_bytes(),
            nonce,
        },
    )
    .await?;
    let hello: Hello = recv(reader).await?;

    if hello.protocol != local.protocol.name || hello.version != local.protocol.version {
        return Err(TransportError::ProtocolMismatch {
            expected: format!("{}/{}", local.protocol.name, local.protocol.version),
            actual: format!("{}/{}", hello.protocol, hello.version),
        });
    }

    let their_id = PeerId::new(hello.public_key);
    if their_id == our_id {
        return Err(TransportError::handshake(remote_addr, "connected to self"));
    }
    if let Some(expected) = expected {
        if their_id != expected {
            return Err(TransportError::handshake(
                remote_addr,
                format!("expected key {}, got {}", expected.short(), their_id.short()),
            ));
        }
    }

    let signature = local.identity.sign(transcript(&hello.nonce, &our_id));
    send(
        writer,
        &Auth {
            signature: signature.to_vec(),
        },
    )
    .await?;
    let auth: Auth = recv(reader).await?;

    IdentityKeyPair::verify(&their_id, transcript(&nonce, &their_id), &auth.signature)
        .map_err(|e| TransportError::handshake(remote_addr, e))?;

    Ok(PeerInfo::new(their_id, hello.name).with_remote_addr(remote_addr))
}

fn transcript(nonce: &[u8; 32], signer: &PeerId) -> Vec<u8> {
    let mut data = Vec::with_capacity(HANDSHAKE_DOMAIN.len() + 64);
    data.extend_from_slice(HANDSHAKE_DOMAIN);
    data.extend_from_slice(nonce);
    data.extend_from_slice(signer.as_bytes());
    data
}

async fn send<W, T>(
    writer: &mut FramedWrite<W, LengthDelimitedCodec>,
    value: &T,
) -> peerchat_core::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = bincode::serialize(value).map_err(TransportError::encode)?;
    writer.send(Bytes::from(frame)).await?;
    Ok(())
}

async fn recv<R, T>(reader: &mut FramedRead<R, LengthDelimitedCodec>) -> peerchat_core::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let frame = reader.next().await.ok_or(TransportError::Eof)??;
    bincode::deserialize(&frame).map_err(TransportError::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::codec;
    use peerchat_core::CHAT_PROTOCOL;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type Reader = FramedRead<ReadHalf<DuplexStream>, LengthDelimitedCodec>;
    type Writer = FramedWrite<WriteHalf<DuplexStream>, LengthDelimitedCodec>;

    fn addr() -> SocketAddr {
        "127.0.0.1:9876".parse().unwrap()
    }

    fn streams() -> ((Reader, Writer), (Reader, Writer)) {
        let (a, b) = tokio::io::duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (
            (FramedRead::new(ar, codec(4096)), FramedWrite::new(aw, codec(4096))),
            (FramedRead::new(br, codec(4096)), FramedWrite::new(bw, codec(4096))),
        )
    }

    async fn run_pair(
        alice: &IdentityKeyPair,
        alice_protocol: Protocol,
        bob: &IdentityKeyPair,
        bob_expected_by_alice: Option<PeerId>,
    ) -> (
        peerchat_core::Result<PeerInfo>,
        peerchat_core::Result<PeerInfo>,
    ) {
        let ((mut ar, mut aw), (mut br, mut bw)) = streams();
        let alice_local = Local {
            identity: alice,
            name: "alice",
            protocol: alice_protocol,
        };
        let bob_local = Local {
            identity: bob,
            name: "bob",
            protocol: CHAT_PROTOCOL,
        };

        // Each side owns its streams so a failed side hangs up on the other
        tokio::join!(
            async move {
                perform(&alice_local, &mut ar, &mut aw, bob_expected_by_alice, addr()).await
            },
            async move { perform(&bob_local, &mut br, &mut bw, None, addr()).await },
        )
    }

    #[tokio::test]
    async fn test_mutual_authentication() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();

        let (at_alice, at_bob) = run_pair(&alice, CHAT_PROTOCOL, &bob, Some(bob.peer_id())).await;

        let seen_by_alice = at_alice.unwrap();
        assert_eq!(seen_by_alice.id, bob.peer_id());
        assert_eq!(seen_by_alice.name, "bob");
        assert_eq!(seen_by_alice.remote_addr, Some(addr()));
        assert_eq!(at_bob.unwrap().id, alice.peer_id());
    }

    #[tokio::test]
    async fn test_unexpected_key_rejected() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let someone_else = IdentityKeyPair::generate().peer_id();

        let (at_alice, _) = run_pair(&alice, CHAT_PROTOCOL, &bob, Some(someone_else)).await;
        assert!(matches!(at_alice, Err(TransportError::HandshakeFailed { .. })));
    }

    #[tokio::test]
    async fn test_protocol_version_mismatch() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let newer = Protocol {
            version: 2,
            ..CHAT_PROTOCOL
        };

        let (at_alice, at_bob) = run_pair(&alice, newer, &bob, None).await;
        assert!(matches!(at_alice, Err(TransportError::ProtocolMismatch { .. })));
        assert!(matches!(at_bob, Err(TransportError::ProtocolMismatch { .. })));
    }

    #[tokio::test]
    async fn test_self_connection_rejected() {
        let alice = IdentityKeyPair::generate();

        let (at_a, at_b) = run_pair(&alice, CHAT_PROTOCOL, &alice, None).await;
        assert!(matches!(at_a, Err(TransportError::HandshakeFailed { .. })));
        assert!(matches!(at_b, Err(TransportError::HandshakeFailed { .. })));
    }
}
