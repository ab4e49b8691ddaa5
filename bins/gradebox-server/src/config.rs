// Server configuration read from the environment

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gradebox_common::config::QueueConfig;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ISSUER: &str = "https://accounts.google.com";

#[derive(Debug, Clone)]
pub struct OpenIdConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub cookie_key: Vec<u8>,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub server_url: String,
    pub upload_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub allow_cors: bool,
    pub grade_locally: bool,
    pub grader_command: Option<String>,
    pub grader_timeout: Duration,
    pub openid: Option<OpenIdConfig>,
    pub jwt: Option<JwtConfig>,
    pub hash_salt: String,
    pub allowed_users_file: Option<PathBuf>,
    pub audit_dir: Option<PathBuf>,
    pub poll_state_ttl: Duration,
    pub queue: QueueConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(v) => v.parse().with_context(|| format!("Invalid PORT: {}", v))?,
            None => DEFAULT_PORT,
        };
        let server_url = var("SERVER_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        let openid = if flag(&var, "USE_OPENID")? {
            let cookie_key = var("COOKIE_AUTH_KEY").context("COOKIE_AUTH_KEY is required with USE_OPENID")?;
            Some(OpenIdConfig {
                issuer: var("OPENID_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
                client_id: var("CLIENT_ID").context("CLIENT_ID is required with USE_OPENID")?,
                client_secret: var("CLIENT_SECRET").context("CLIENT_SECRET is required with USE_OPENID")?,
                cookie_key: cookie_key.into_bytes(),
                secure_cookie: flag(&var, "SECURE_COOKIE")?,
            })
        } else {
            None
        };

        let jwt = if flag(&var, "USE_JWT")? {
            let hours = number(&var, "JWT_TTL_HOURS", 720)?;
            let ttl_secs = hours
                .checked_mul(3600)
                .filter(|secs| i64::try_from(*secs).is_ok())
                .with_context(|| format!("JWT_TTL_HOURS is too large: {}", hours))?;
            Some(JwtConfig {
                private_key_path: var("JWT_KEY").context("JWT_KEY is required with USE_JWT")?.into(),
                public_key_path: var("JWT_PUBLIC_KEY")
                    .context("JWT_PUBLIC_KEY is required with USE_JWT")?
                    .into(),
                ttl: Duration::from_secs(ttl_secs),
            })
        } else {
            None
        };

        let grade_locally = flag(&var, "GRADE_LOCALLY")?;
        let grader_command = var("GRADER_COMMAND");
        if grade_locally && grader_command.is_none() {
            bail!("GRADER_COMMAND is required with GRADE_LOCALLY");
        }

        Ok(Self {
            port,
            server_url,
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()).into(),
            static_dir: var("STATIC_DIR").map(PathBuf::from),
            allow_cors: flag(&var, "ALLOW_CORS")?,
            grade_locally,
            grader_command,
            grader_timeout: Duration::from_secs(number(&var, "GRADER_TIMEOUT_SECS", 60)?),
            openid,
            jwt,
            hash_salt: var("HASH_SALT").unwrap_or_default(),
            allowed_users_file: var("ALLOWED_USERS_FILE").map(PathBuf::from),
            audit_dir: var("AUDIT_DIR").map(PathBuf::from),
            poll_state_ttl: Duration::from_secs(number(&var, "POLL_STATE_TTL_SECS", 600)?),
            queue: QueueConfig::from_lookup(&var),
        })
    }

    pub fn redirect_url(&self) -> String {
        format!("{}/callback", self.server_url.trim_end_matches('/'))
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match var(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => bail!("Invalid boolean for {}: {}", key, other),
    }
}

fn number(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match var(key) {
        Some(v) => v.parse().with_context(|| format!("Invalid {}: {}", key, v)),
        None => Ok(default),
    }
}

/// One email per line; blank lines and surrounding whitespace are ignored.
pub fn parse_allowed_users(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn load_allowed_users(path: &Path) -> Result<HashSet<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read allowed users from {}", path.display()))?;
    Ok(parse_allowed_users(&contents))
}
