//! Server-side authentication handshake.
//!
//! Phase order:
//!
//! ```text
//! ClientHello → ServerHello
//!   SRP:       Identify → ServerKeyExchange → ClientKeyExchange
//!   anonymous: (nothing)
//! SessionChallenge → SessionResponse
//! ```
//!
//! Every transition waits for the previous message to be fully written; any
//! parse failure, state violation, cryptographic failure, or expiry of the
//! handshake deadline drops the channel. Failure causes are not
//! distinguishable on the wire.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::aead::{CipherKind, MessageCipher, IV_SIZE};
use crate::crypto::hash::{blake2b512, blake2s256};
use crate::crypto::keypair::KeyPair;
use crate::crypto::srp::{self, SrpGroup};
use crate::crypto::{has_hardware_aes, random_array, random_bytes, CryptoError};
use crate::net::{Channel, ChannelError};
use crate::proto::{
    self, ClientHello, IdentifyMethod, ProtoError, ServerHello, SessionChallenge, SessionResponse,
    SrpClientKeyExchange, SrpIdentify, SrpServerKeyExchange, Version, ENCRYPTION_AES256_GCM,
    ENCRYPTION_CHACHA20_POLY1305,
};
use crate::users::UserList;

/// The whole handshake must finish within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

const SERVER_EPHEMERAL_SIZE: usize = 128;

/// Whether unauthenticated peers may negotiate a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnonymousAccess {
    Enable,
    Disable,
}

/// Handshake failure. Terminal; the channel is dropped.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Protocol(#[from] ProtoError),
    #[error("protocol violation: {0}")]
    State(&'static str),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("handshake timed out")]
    Timeout,
    #[error("access denied")]
    AccessDenied,
}

/// Result of a successful handshake; ownership of the channel returns to the caller.
pub struct Authenticated<T> {
    pub channel: Channel<T>,
    /// Authenticated user name; `None` for anonymous sessions.
    pub user_name: Option<String>,
    /// The single session-type bit the peer selected.
    pub session_type: u32,
    pub peer_version: Version,
}

impl<T> std::fmt::Debug for Authenticated<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticated")
            .field("channel", &"Channel { .. }")
            .field("user_name", &self.user_name)
            .field("session_type", &self.session_type)
            .field("peer_version", &self.peer_version)
            .finish()
    }
}

struct Outcome {
    user_name: Option<String>,
    session_type: u32,
    peer_version: Version,
}

/// Server-side handshake driver.
pub struct ServerAuthenticator {
    key_pair: Option<KeyPair>,
    anonymous_access: AnonymousAccess,
    session_types: u32,
    hardware_aes: bool,
}

impl Default for ServerAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerAuthenticator {
    pub fn new() -> Self {
        Self {
            key_pair: None,
            anonymous_access: AnonymousAccess::Disable,
            session_types: 0,
            hardware_aes: has_hardware_aes(),
        }
    }

    /// Installs the key-agreement private key. Must precede `authenticate`.
    pub fn set_private_key(&mut self, private_key: &[u8]) -> Result<(), AuthError> {
        if private_key.is_empty() {
            return Err(AuthError::Config("an empty private key is not valid"));
        }
        let key_pair = KeyPair::from_private_key(private_key)
            .map_err(|_| AuthError::Config("failed to load private key"))?;
        self.key_pair = Some(key_pair);
        Ok(())
    }

    /// Configures anonymous access. Enabling requires an installed private key
    /// and at least one session type offered to anonymous peers.
    pub fn set_anonymous_access(
        &mut self,
        access: AnonymousAccess,
        session_types: u32,
    ) -> Result<(), AuthError> {
        match access {
            AnonymousAccess::Enable => {
                if self.key_pair.is_none() {
                    return Err(AuthError::Config(
                        "anonymous access requires an installed private key",
                    ));
                }
                if session_types == 0 {
                    return Err(AuthError::Config(
                        "anonymous access requires at least one session type",
                    ));
                }
                self.session_types = session_types;
            }
            AnonymousAccess::Disable => {
                self.session_types = 0;
            }
        }
        self.anonymous_access = access;
        Ok(())
    }

    /// Runs the handshake to completion under the 60 second deadline.
    ///
    /// On success the channel, with its AEAD installed, is handed back inside
    /// [`Authenticated`]; on any failure the channel is dropped.
    pub async fn authenticate<T>(
        self,
        mut channel: Channel<T>,
        users: Arc<UserList>,
    ) -> Result<Authenticated<T>, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.validate_config()?;

        let peer = channel.peer_address().to_owned();
        info!(peer = %peer, "authentication started");

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.run(&mut channel, &users)).await {
            Ok(Ok(outcome)) => {
                info!(peer = %peer, "authentication completed successfully");
                Ok(Authenticated {
                    channel,
                    user_name: outcome.user_name,
                    session_type: outcome.session_type,
                    peer_version: outcome.peer_version,
                })
            }
            Ok(Err(error)) => {
                info!(peer = %peer, %error, "authentication failed");
                Err(error)
            }
            Err(_) => {
                info!(peer = %peer, "authentication timed out");
                Err(AuthError::Timeout)
            }
        }
    }

    fn validate_config(&self) -> Result<(), AuthError> {
        match self.anonymous_access {
            AnonymousAccess::Enable => {
                if self.key_pair.is_none() {
                    return Err(AuthError::Config(
                        "anonymous access requires an installed private key",
                    ));
                }
                if self.session_types == 0 {
                    return Err(AuthError::Config(
                        "anonymous access requires at least one session type",
                    ));
                }
            }
            AnonymousAccess::Disable => {
                if self.session_types != 0 {
                    return Err(AuthError::Config(
                        "session types must be empty without anonymous access",
                    ));
                }
            }
        }
        Ok(())
    }

    async fn run<T>(
        &self,
        channel: &mut Channel<T>,
        users: &UserList,
    ) -> Result<Outcome, AuthError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let buffer = channel.recv().await?;
        let hello: ClientHello = proto::decode(&buffer)?;

        if hello.encryption & (ENCRYPTION_AES256_GCM | ENCRYPTION_CHACHA20_POLY1305) == 0 {
            return Err(AuthError::State("no supported encryption method offered"));
        }
        if hello.identify == IdentifyMethod::Anonymous
            && self.anonymous_access != AnonymousAccess::Enable
        {
            return Err(AuthError::AccessDenied);
        }

        let cipher_kind = if hello.encryption & ENCRYPTION_AES256_GCM != 0 && self.hardware_aes {
            // Both sides support AES and this host accelerates it.
            CipherKind::Aes256Gcm
        } else {
            CipherKind::ChaCha20Poly1305
        };

        let mut session_key: Option<Zeroizing<[u8; 32]>> = None;
        let mut decrypt_iv = [0u8; IV_SIZE];
        let mut encrypt_iv = [0u8; IV_SIZE];

        if let Some(key_pair) = &self.key_pair {
            decrypt_iv = hello
                .iv
                .as_slice()
                .try_into()
                .map_err(|_| AuthError::State("client iv has the wrong size"))?;
            if hello.public_key.is_empty() {
                return Err(AuthError::State("missing client public key"));
            }
            let shared = Zeroizing::new(key_pair.session_key(&hello.public_key)?);
            session_key = Some(Zeroizing::new(blake2s256(&[shared.as_slice()])));
            encrypt_iv = random_array();
        }

        let server_hello = ServerHello {
            encryption: encryption_bit(cipher_kind),
            iv: if session_key.is_some() {
                encrypt_iv.to_vec()
            } else {
                Vec::new()
            },
        };
        channel.send(&proto::encode(&server_hello)?).await?;

        // ServerHello is written; everything after travels under AEAD when a
        // session key exists.
        if let Some(key) = &session_key {
            channel.set_encryptor(MessageCipher::new(cipher_kind, key, encrypt_iv));
            channel.set_decryptor(MessageCipher::new(cipher_kind, key, decrypt_iv));
        }

        let (user_name, session_types) = match hello.identify {
            IdentifyMethod::Anonymous => (None, self.session_types),
            IdentifyMethod::Srp => {
                let buffer = channel.recv().await?;
                let identify: SrpIdentify = proto::decode(&buffer)?;
                if identify.username.is_empty() {
                    return Err(AuthError::State("empty user name"));
                }

                let (group, salt, v, allowed) = srp_parameters(users, &identify.username);

                let b = BigUint::from_bytes_be(&random_bytes(SERVER_EPHEMERAL_SIZE));
                let b_public = srp::calc_b_public(&b, &v, &group);

                encrypt_iv = random_array();
                let exchange = SrpServerKeyExchange {
                    number: group.modulus.to_bytes_be(),
                    generator: group.generator.to_bytes_be(),
                    salt,
                    b: b_public.to_bytes_be(),
                    iv: encrypt_iv.to_vec(),
                };
                channel.send(&proto::encode(&exchange)?).await?;

                let buffer = channel.recv().await?;
                let key_exchange: SrpClientKeyExchange = proto::decode(&buffer)?;
                let a_public = BigUint::from_bytes_be(&key_exchange.a);
                decrypt_iv = key_exchange
                    .iv
                    .as_slice()
                    .try_into()
                    .map_err(|_| AuthError::State("client iv has the wrong size"))?;
                if !srp::verify_a_mod_n(&a_public, &group.modulus) {
                    return Err(AuthError::State("client ephemeral reduces to zero"));
                }

                let u = srp::calc_u(&a_public, &b_public, &group.modulus);
                let srp_key = srp::calc_server_key(&a_public, &v, &u, &b, &group.modulus);
                let srp_bytes = Zeroizing::new(srp_key.to_bytes_be());

                let final_key = Zeroizing::new(match &session_key {
                    Some(previous) => blake2s256(&[previous.as_slice(), &srp_bytes]),
                    None => blake2s256(&[&srp_bytes]),
                });
                channel.set_encryptor(MessageCipher::new(cipher_kind, &final_key, encrypt_iv));
                channel.set_decryptor(MessageCipher::new(cipher_kind, &final_key, decrypt_iv));

                (Some(identify.username), allowed)
            }
        };

        let challenge = SessionChallenge {
            session_types,
            version: crate::current_version(),
        };
        channel.send(&proto::encode(&challenge)?).await?;

        let buffer = channel.recv().await?;
        let response: SessionResponse = proto::decode(&buffer)?;
        if response.session_type.count_ones() != 1 {
            return Err(AuthError::State("session type must carry exactly one bit"));
        }
        if session_types & response.session_type == 0 {
            return Err(AuthError::AccessDenied);
        }

        Ok(Outcome {
            user_name,
            session_type: response.session_type,
            peer_version: response.version,
        })
    }
}

fn encryption_bit(kind: CipherKind) -> u32 {
    match kind {
        CipherKind::Aes256Gcm => ENCRYPTION_AES256_GCM,
        CipherKind::ChaCha20Poly1305 => ENCRYPTION_CHACHA20_POLY1305,
    }
}

/// Resolves SRP parameters for a user name.
///
/// Unknown, disabled, or misconfigured users receive deterministic fabricated
/// parameters from the seed key so the exchange looks and times the same as
/// for a real user; the session mask of zero guarantees the handshake still
/// fails at the session response.
fn srp_parameters(users: &UserList, username: &str) -> (SrpGroup, Vec<u8>, BigUint, u32) {
    if let Some(user) = users.find(username) {
        if user.is_enabled() {
            match srp::lookup_group(user.group) {
                Some(group) => {
                    return (
                        group,
                        user.salt.clone(),
                        BigUint::from_bytes_be(&user.verifier),
                        user.sessions,
                    );
                }
                None => warn!(user = %user.name, "user has an invalid SRP group"),
            }
        }
    }

    let group = srp::default_group();
    let salt = blake2b512(&[users.seed_key(), username.as_bytes()]).to_vec();
    let v = srp::calc_v(username, users.seed_key(), &salt, &group);
    (group, salt, v, 0)
}
