use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV: &str = "MAILBRIEF_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Text-generation service (any OpenAI-compatible endpoint)
    #[serde(default)]
    pub ai: AiConfig,
    /// Knowledge-base ingestion sidecar
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    /// Login name, when it differs from the address
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
}

impl AccountConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file; defaults to `cache.db` in the data dir
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Base URL of the chat-completions API, without `/chat/completions`
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Bearer token; local servers usually need none
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Maximum tokens for summary responses
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    /// Maximum tokens for draft responses
    #[serde(default = "default_draft_max_tokens")]
    pub draft_max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key: None,
            model: default_ai_model(),
            summary_max_tokens: default_summary_max_tokens(),
            draft_max_tokens: default_draft_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the sidecar; ingestion is off when unset
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl FetchConfig {
    /// Missing limit takes the default; anything else is clamped to `[1, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_port() -> u16 {
    587
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_ai_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_ai_model() -> String {
    "phi3".to_string()
}

fn default_summary_max_tokens() -> u32 {
    400
}

fn default_draft_max_tokens() -> u32 {
    800
}

fn default_limit() -> u32 {
    20
}

fn default_max_limit() -> u32 {
    200
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailbrief");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailbrief");
        Ok(dir)
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match self.cache.path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("cache.db")),
        }
    }

    /// Load from `--config`, then `MAILBRIEF_CONFIG`, then the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::config_path()?,
            },
        };

        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at {}\n\
                 Please create a config file. Example:\n\n\
                 [account]\n\
                 email = \"you@example.com\"\n\n\
                 [account.imap]\n\
                 server = \"imap.example.com\"\n\n\
                 [account.smtp]\n\
                 server = \"smtp.example.com\"\n\n\
                 [ai]\n\
                 model = \"phi3\"",
                path.display()
            );
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.account.email.trim().is_empty() {
            anyhow::bail!("account.email must not be empty");
        }
        Ok(config)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        let cache_path = self.cache_path()?;
        if let Some(dir) = cache_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::parse(
            r#"
            [account]
            email = "me@example.com"
            display_name = "Me"

            [account.imap]
            server = "imap.example.com"

            [account.smtp]
            server = "smtp.example.com"
            "#,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::for_tests();

        assert_eq!(config.account.email, "me@example.com");
        assert_eq!(config.account.username(), "me@example.com");
        assert_eq!(config.account.mailbox, "INBOX");
        assert_eq!(config.account.imap.port, 993);
        assert_eq!(config.account.smtp.port, 587);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.ai.model, "phi3");
        assert_eq!(config.ai.base_url, "http://localhost:11434/v1");
        assert!(config.ingest.url.is_none());
        assert_eq!(config.fetch.default_limit, 20);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [account]
            email = "me@corp.example"
            username = "me"
            mailbox = "Archive"

            [account.imap]
            server = "imap.corp.example"
            port = 1993

            [account.smtp]
            server = "smtp.corp.example"
            port = 465

            [server]
            bind = "0.0.0.0:9000"

            [cache]
            path = "/tmp/mailbrief-test.db"

            [ai]
            base_url = "https://openrouter.ai/api/v1"
            api_key = "sk-test"
            model = "anthropic/claude-3-haiku"
            summary_max_tokens = 300

            [ingest]
            url = "http://127.0.0.1:8000"

            [fetch]
            default_limit = 10
            max_limit = 50
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.account.username(), "me");
        assert_eq!(config.account.mailbox, "Archive");
        assert_eq!(config.account.imap.port, 1993);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(
            config.cache_path().unwrap(),
            PathBuf::from("/tmp/mailbrief-test.db")
        );
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.ai.summary_max_tokens, 300);
        assert_eq!(config.ai.draft_max_tokens, 800);
        assert_eq!(config.ingest.url.as_deref(), Some("http://127.0.0.1:8000"));
        assert_eq!(config.fetch.max_limit, 50);
    }

    #[test]
    fn test_parse_rejects_missing_account() {
        assert!(Config::parse("[server]\nbind = \"127.0.0.1:1\"").is_err());
        assert!(
            Config::parse(
                "[account]\nemail = \" \"\n[account.imap]\nserver = \"i\"\n[account.smtp]\nserver = \"s\""
            )
            .is_err()
        );
    }

    #[test]
    fn test_clamp_limit() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.clamp_limit(None), 20);
        assert_eq!(fetch.clamp_limit(Some(0)), 1);
        assert_eq!(fetch.clamp_limit(Some(5)), 5);
        assert_eq!(fetch.clamp_limit(Some(10_000)), 200);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[account]\nemail = \"a@b.c\"\n[account.imap]\nserver = \"i\"\n[account.smtp]\nserver = \"s\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.account.email, "a@b.c");
    }
}
