#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use serde::{Deserialize, Serialize};
use setu::auth::{AnonymousAccess, ServerAuthenticator};
use setu::crypto::{keypair::KeyPair, random_bytes};
use setu::fs::FileExecutor;
use setu::net::TcpChannel;
use setu::proto::SESSION_TYPE_FILE_TRANSFER;
use setu::transfer::serve_files;
use setu::users::{User, UserList, UserStore};

#[derive(Parser)]
#[command(name = "setu-host", about = "Setu host daemon and credential tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept connections and serve authenticated sessions.
    Serve(ServeArgs),
    /// Add or replace a user in the credential store.
    AddUser(AddUserArgs),
    /// Generate a key-agreement private key.
    GenKey(GenKeyArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:8050")]
    listen: SocketAddr,
    #[arg(long, default_value = "users.json")]
    users: PathBuf,
    /// Raw private key file; enables the key-agreement handshake leg.
    #[arg(long)]
    private_key: Option<PathBuf>,
    /// Session-type mask offered to anonymous peers; requires a private key.
    #[arg(long)]
    anonymous_sessions: Option<u32>,
}

#[derive(Args)]
struct AddUserArgs {
    #[arg(long, default_value = "users.json")]
    users: PathBuf,
    #[arg(long)]
    name: String,
    #[arg(long)]
    password: String,
    /// Session-type mask granted to this user.
    #[arg(long, default_value_t = SESSION_TYPE_FILE_TRANSFER)]
    sessions: u32,
}

#[derive(Args)]
struct GenKeyArgs {
    #[arg(long, value_name = "FILE")]
    out: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoredUser {
    name: String,
    group: u16,
    salt: String,
    verifier: String,
    sessions: u32,
    flags: u32,
}

#[derive(Default, Serialize, Deserialize)]
struct StoreFile {
    seed_key: String,
    users: Vec<StoredUser>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::AddUser(args) => add_user(args),
        Command::GenKey(args) => gen_key(args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store = UserStore::new(load_store(&args.users)?);

    let private_key = match &args.private_key {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    if args.anonymous_sessions.is_some() && private_key.is_none() {
        anyhow::bail!("--anonymous-sessions requires --private-key");
    }

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(listen = %args.listen, "setu host listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let users = store.snapshot();
        let private_key = private_key.clone();
        let anonymous_sessions = args.anonymous_sessions;
        tokio::spawn(async move {
            if let Err(error) =
                handle_connection(stream, users, private_key, anonymous_sessions).await
            {
                warn!(peer = %peer, %error, "connection ended with an error");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    users: Arc<UserList>,
    private_key: Option<Vec<u8>>,
    anonymous_sessions: Option<u32>,
) -> Result<()> {
    let channel = TcpChannel::new(stream);

    let mut authenticator = ServerAuthenticator::new();
    if let Some(key) = &private_key {
        authenticator
            .set_private_key(key)
            .context("invalid private key")?;
    }
    if let Some(sessions) = anonymous_sessions {
        authenticator
            .set_anonymous_access(AnonymousAccess::Enable, sessions)
            .context("invalid anonymous configuration")?;
    }

    let authenticated = authenticator.authenticate(channel, users).await?;
    match authenticated.session_type {
        SESSION_TYPE_FILE_TRANSFER => {
            info!(
                user = authenticated.user_name.as_deref().unwrap_or("<anonymous>"),
                "file transfer session started"
            );
            serve_files(authenticated.channel, FileExecutor::new()).await?;
        }
        other => {
            warn!(session_type = other, "session type not served by this host");
        }
    }
    Ok(())
}

fn add_user(args: AddUserArgs) -> Result<()> {
    let list = if args.users.exists() {
        load_store(&args.users)?
    } else {
        UserList::empty()
    };

    let store = UserStore::new(list);
    store.upsert(User::create(&args.name, &args.password, args.sessions));
    save_store(&args.users, &store.snapshot())?;
    println!("user '{}' stored in {}", args.name, args.users.display());
    Ok(())
}

fn gen_key(args: GenKeyArgs) -> Result<()> {
    let pair = KeyPair::generate();
    std::fs::write(&args.out, pair.private_key())
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("public key: {}", hex::encode(pair.public_key()));
    Ok(())
}

fn load_store(path: &Path) -> Result<UserList> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: StoreFile =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    let seed_key = if file.seed_key.is_empty() {
        random_bytes(64)
    } else {
        hex::decode(&file.seed_key).context("seed_key is not valid hex")?
    };

    let mut users = Vec::with_capacity(file.users.len());
    for stored in file.users {
        users.push(User {
            name: stored.name,
            group: stored.group,
            salt: hex::decode(&stored.salt).context("salt is not valid hex")?,
            verifier: hex::decode(&stored.verifier).context("verifier is not valid hex")?,
            sessions: stored.sessions,
            flags: stored.flags,
        });
    }
    Ok(UserList::new(users, seed_key))
}

fn save_store(path: &Path, list: &UserList) -> Result<()> {
    let file = StoreFile {
        seed_key: hex::encode(list.seed_key()),
        users: list
            .users()
            .iter()
            .map(|user| StoredUser {
                name: user.name.clone(),
                group: user.group,
                salt: hex::encode(&user.salt),
                verifier: hex::encode(&user.verifier),
                sessions: user.sessions,
                flags: user.flags,
            })
            .collect(),
    };
    let raw = serde_json::to_string_pretty(&file).context("failed to encode user store")?;
    std::fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
