use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use super::codec::{CodecError, FrameCodec};
use crate::crypto::aead::MessageCipher;
use crate::crypto::CryptoError;

/// Channel failure; every variant is terminal for the connection.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("peer disconnected")]
    Disconnected,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Full-duplex message channel over a framed transport.
///
/// Until an AEAD pair is installed, payloads travel in plaintext frames.
/// `send` resolves once the frame has been written and flushed, which is the
/// ordering point the handshake relies on; the owner controls delivery of
/// inbound messages by choosing when to await `recv`.
pub struct Channel<T> {
    framed: Framed<T, FrameCodec>,
    encryptor: Option<MessageCipher>,
    decryptor: Option<MessageCipher>,
    peer: String,
}

/// Channel over a TCP stream.
pub type TcpChannel = Channel<TcpStream>;

impl Channel<TcpStream> {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| String::from("unknown"));
        Self::from_transport(stream, peer)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Channel<T> {
    /// Wraps an arbitrary stream transport; `peer` is used for diagnostics.
    pub fn from_transport(transport: T, peer: impl Into<String>) -> Self {
        Self {
            framed: Framed::new(transport, FrameCodec),
            encryptor: None,
            decryptor: None,
            peer: peer.into(),
        }
    }

    /// Human-readable peer address.
    pub fn peer_address(&self) -> &str {
        &self.peer
    }

    /// Installs the outbound AEAD; applies to every subsequent `send`.
    pub fn set_encryptor(&mut self, cipher: MessageCipher) {
        self.encryptor = Some(cipher);
    }

    /// Installs the inbound AEAD; applies to every subsequent `recv`.
    pub fn set_decryptor(&mut self, cipher: MessageCipher) {
        self.decryptor = Some(cipher);
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some() && self.decryptor.is_some()
    }

    /// Negotiated outbound cipher, if one is installed.
    pub fn cipher_kind(&self) -> Option<crate::crypto::aead::CipherKind> {
        self.encryptor.as_ref().map(MessageCipher::kind)
    }

    /// Sends one message; returns once it is written and flushed.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let frame = match &mut self.encryptor {
            Some(cipher) => Bytes::from(cipher.seal(payload)?),
            None => Bytes::copy_from_slice(payload),
        };
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Receives the next message, authenticating and decrypting as needed.
    pub async fn recv(&mut self) -> Result<Bytes, ChannelError> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or(ChannelError::Disconnected)??;
        match &mut self.decryptor {
            Some(cipher) => Ok(Bytes::from(cipher.open(&frame)?)),
            None => Ok(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aead::{CipherKind, IV_SIZE, KEY_SIZE};

    fn duplex_pair() -> (
        Channel<tokio::io::DuplexStream>,
        Channel<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Channel::from_transport(a, "a"),
            Channel::from_transport(b, "b"),
        )
    }

    #[tokio::test]
    async fn plaintext_round_trip() {
        let (mut left, mut right) = duplex_pair();
        left.send(b"ping").await.expect("send");
        let received = right.recv().await.expect("recv");
        assert_eq!(&received[..], b"ping");
    }

    #[tokio::test]
    async fn encrypted_round_trip() {
        let (mut left, mut right) = duplex_pair();
        let key = [5u8; KEY_SIZE];
        let iv = [6u8; IV_SIZE];
        left.set_encryptor(MessageCipher::new(CipherKind::ChaCha20Poly1305, &key, iv));
        right.set_decryptor(MessageCipher::new(CipherKind::ChaCha20Poly1305, &key, iv));

        left.send(b"secret").await.expect("send");
        let received = right.recv().await.expect("recv");
        assert_eq!(&received[..], b"secret");
    }

    #[tokio::test]
    async fn key_mismatch_surfaces_crypto_error() {
        let (mut left, mut right) = duplex_pair();
        left.set_encryptor(MessageCipher::new(
            CipherKind::Aes256Gcm,
            &[1u8; KEY_SIZE],
            [0u8; IV_SIZE],
        ));
        right.set_decryptor(MessageCipher::new(
            CipherKind::Aes256Gcm,
            &[2u8; KEY_SIZE],
            [0u8; IV_SIZE],
        ));

        left.send(b"secret").await.expect("send");
        assert!(matches!(
            right.recv().await,
            Err(ChannelError::Crypto(CryptoError::Auth))
        ));
    }

    #[tokio::test]
    async fn close_surfaces_disconnect() {
        let (a, b) = tokio::io::duplex(1024);
        drop(a);
        let mut chan = Channel::from_transport(b, "peer");
        assert!(matches!(chan.recv().await, Err(ChannelError::Disconnected)));
    }

    #[tokio::test]
    async fn messages_preserve_order() {
        let (mut left, mut right) = duplex_pair();
        for i in 0..10u8 {
            left.send(&[i]).await.expect("send");
        }
        for i in 0..10u8 {
            assert_eq!(right.recv().await.expect("recv")[0], i);
        }
    }
}
