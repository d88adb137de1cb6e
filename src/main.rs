use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use twitch_credentials::{
    logging, AuthConfig, AuthError, CredentialCodec, Credentials, OAuthFlows, TokenType,
};

#[derive(Parser)]
#[command(name = "twitch-credentials", version, about = "Obtain and manage Twitch OAuth credentials")]
struct Cli {
    /// JSON configuration file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Encrypted credential file to write results to (and read from for refresh/revoke)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Base64 AES-256 key for the credential store
    #[arg(long, global = true, env = "TWITCH_CREDENTIALS_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the implicit grant in the browser and print the user token
    Implicit,
    /// Capture an authorization code in the browser and print it
    Authorize,
    /// Exchange an authorization code for user credentials
    Exchange {
        #[arg(long)]
        code: String,
    },
    /// Request an app access token with the client secret
    AppToken,
    /// Validate an existing access token
    Validate {
        #[arg(long)]
        token: String,
        /// Treat the token as an app access token
        #[arg(long)]
        app: bool,
    },
    /// Refresh the user credentials held in --store
    Refresh,
    /// Revoke a token (defaults to the one held in --store)
    Revoke {
        #[arg(long)]
        token: Option<String>,
    },
    /// Print a fresh base64 key for --store
    Keygen,
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_file = dotenvy::dotenv();
    logging::init();
    match env_file {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AuthError>() {
                Some(auth) => eprintln!("error [{}]: {}", auth.kind(), auth.message()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Keygen = cli.command {
        println!("{}", CredentialCodec::generate_key());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => AuthConfig::load(path).await?,
        None => AuthConfig::from_env(),
    };
    debug!(?config, "Using configuration");

    let store = match &cli.store {
        Some(path) => Some(Store::open(path, cli.key.as_deref())?),
        None => None,
    };
    let flows = OAuthFlows::from_config(&config)?;

    match cli.command {
        Command::Implicit => {
            let credentials = flows.implicit(&config).await?;
            finish(&credentials, store.as_ref())?;
        }
        Command::Authorize => {
            let code = flows.authorization_code_front_end(&config).await?;
            println!("{code}");
        }
        Command::Exchange { code } => {
            let secret = client_secret(&config)?;
            let credentials = flows
                .authorization_code_exchange(&config, &code, secret)
                .await?;
            finish(&credentials, store.as_ref())?;
        }
        Command::AppToken => {
            let secret = client_secret(&config)?;
            let credentials = flows.client_credentials(&config, secret).await?;
            finish(&credentials, store.as_ref())?;
        }
        Command::Validate { token, app } => {
            let token_type = if app {
                TokenType::AppAccessToken
            } else {
                TokenType::UserAccessToken
            };
            let credentials = flows.authority().validate(&token, token_type).await?;
            finish(&credentials, store.as_ref())?;
        }
        Command::Refresh => {
            let store = store.ok_or_else(|| anyhow!("refresh needs --store"))?;
            let current = store
                .load()
                .ok_or_else(|| anyhow!("No usable credentials in {}", store.path.display()))?;
            let secret = client_secret(&config)?;
            let refreshed = flows.refresh(&current, secret).await?;
            finish(&refreshed, Some(&store))?;
        }
        Command::Revoke { token } => {
            let (client_id, token) = match (token, store.as_ref().and_then(Store::load)) {
                (Some(token), _) => (config.client_id.clone(), token),
                (None, Some(stored)) => (stored.client_id, stored.auth_token),
                (None, None) => return Err(anyhow!("Nothing to revoke: pass --token or --store")),
            };
            flows.authority().revoke(&client_id, &token).await?;
            info!("Token revoked");
            println!("revoked");
        }
        Command::Keygen => {}
    }

    Ok(())
}

/// Credential file plus the key protecting it
struct Store {
    path: PathBuf,
    key: Vec<u8>,
}

impl Store {
    fn open(path: &Path, key: Option<&str>) -> Result<Self> {
        let encoded = key.context("--store needs a key (TWITCH_CREDENTIALS_KEY or --key)")?;
        Ok(Self {
            path: path.to_path_buf(),
            key: CredentialCodec::key_from_base64(encoded)?,
        })
    }

    fn load(&self) -> Option<Credentials> {
        CredentialCodec::load_credentials(&self.path, &self.key)
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if !CredentialCodec::save_credentials(&self.path, credentials, &self.key) {
            return Err(anyhow!(
                "Failed to store credentials in {}",
                self.path.display()
            ));
        }
        info!(path = %self.path.display(), "Credentials stored");
        Ok(())
    }
}

fn client_secret(config: &AuthConfig) -> Result<&str> {
    config
        .client_secret
        .as_deref()
        .filter(|secret| !secret.trim().is_empty())
        .context("TWITCH_CLIENT_SECRET is not set")
}

/// Print the credentials, after writing them to the store when one is given
fn finish(credentials: &Credentials, store: Option<&Store>) -> Result<()> {

    println!("token:      {}", credentials.auth_token);
    if let Some(refresh_token) = &credentials.refresh_token {
        println!("refresh:    {refresh_token}");
    }
    println!("type:       {}", credentials.token_type);
    println!("client id:  {}", credentials.client_id);
    if !credentials.login.is_empty() {
        println!("login:      {} ({})", credentials.login, credentials.user_id);
    }
    let scopes: Vec<&str> = credentials.scopes.iter().map(String::as_str).collect();
    println!("scopes:     {}", scopes.join(" "));
    println!("expires at: {}", credentials.expiration_instant().to_rfc3339());

    match store {
        Some(store) => store.save(credentials),
        None => Ok(()),
    }
}
