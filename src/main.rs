mod ai;
mod cache;
mod config;
mod constants;
mod credentials;
mod error;
mod hydrate;
mod ingest;
mod mail;
mod retry;
mod server;
mod service;

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::ai::{ChatClient, TextGenerator};
use crate::cache::Cache;
use crate::config::Config;
use crate::credentials::{CredentialStore, Protocol, Stored};
use crate::ingest::{HttpIngestSink, IngestSink, NoopIngestSink};
use crate::mail::{ImapConnector, SmtpClient};
use crate::server::AppState;
use crate::service::{ReplyGateway, SummaryService, ThreadService};

fn setup_logging(force_stderr: bool) {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailbrief=debug"));

    let log_file = if force_stderr {
        None
    } else {
        Config::data_dir()
            .ok()
            .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
            .map(|dir| dir.join("mailbrief.log"))
            .and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .ok()
            })
    };

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailbrief - Mailbox threads, AI briefs and reply drafts over HTTP

Usage: mailbrief [options] [command]

Commands:
    serve             Start the HTTP server (default)
    setup-password    Store the mailbox password (add --imap or --smtp for just one)
    help              Show this help message

Options:
    --config <path>   Use this config file instead of ~/.config/mailbrief/config.toml
    --log-stderr      Log to stderr instead of the log file

Passwords can also be given with MAILBRIEF_PASSWORD, MAILBRIEF_IMAP_PASSWORD
and MAILBRIEF_SMTP_PASSWORD.
"#
    );
}

#[derive(Debug, Default)]
struct Args {
    command: Option<String>,
    config: Option<PathBuf>,
    log_stderr: bool,
    protocols: Vec<Protocol>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--log-stderr" => parsed.log_stderr = true,
            "--imap" => parsed.protocols.push(Protocol::Imap),
            "--smtp" => parsed.protocols.push(Protocol::Smtp),
            _ if parsed.command.is_none() => parsed.command = Some(arg),
            _ => anyhow::bail!("Unexpected argument: {}", arg),
        }
    }
    if parsed.protocols.is_empty() {
        parsed.protocols = vec![Protocol::Imap, Protocol::Smtp];
    }
    Ok(parsed)
}

fn run_setup_password(args: &Args) -> Result<()> {
    use std::io::{self, Write};

    let config = Config::load(args.config.as_deref())?;
    config.ensure_dirs()?;

    print!("Password for {}: ", config.account.email);
    io::stdout().flush()?;
    let password = rpassword_read()?;
    println!();
    if password.is_empty() {
        anyhow::bail!("Empty password, nothing stored");
    }

    let creds = CredentialStore::new(&config.account.email);
    match creds.set_password(&args.protocols, &password)? {
        Stored::Keyring => println!("Password stored in the system keyring."),
        Stored::File => println!(
            "Keyring unavailable; password stored in {}",
            creds.password_file().display()
        ),
    }
    Ok(())
}

fn rpassword_read() -> Result<String> {
    use std::io;

    // Disable echo
    let _guard = DisableEcho::new()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    Ok(password.trim().to_string())
}

struct DisableEcho {
    #[cfg(unix)]
    original: libc::termios,
}

impl DisableEcho {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = std::io::stdin().as_raw_fd();
        let mut termios = MaybeUninit::<libc::termios>::uninit();

        // SAFETY: tcgetattr initializes `termios` when it returns 0
        unsafe {
            if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
                anyhow::bail!("Failed to get terminal attributes");
            }
            let original = termios.assume_init();
            let mut new = original;
            new.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &new) != 0 {
                anyhow::bail!("Failed to set terminal attributes");
            }
            Ok(Self { original })
        }
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for DisableEcho {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = std::io::stdin().as_raw_fd();
        // SAFETY: restores attributes read from the same fd in `new`
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

async fn run_server(args: &Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    config.ensure_dirs()?;

    let creds = CredentialStore::new(&config.account.email);
    let imap_password = creds.password(Protocol::Imap);
    let smtp_password = creds.password(Protocol::Smtp);
    if imap_password.is_none() {
        tracing::warn!(
            "No IMAP password for {}; listing and hydration will fail until one is set \
             (run 'mailbrief setup-password' or set MAILBRIEF_PASSWORD)",
            config.account.email
        );
    }
    if smtp_password.is_none() {
        tracing::warn!("No SMTP password for {}; sending is disabled", config.account.email);
    }

    let cache = Cache::open(&config.cache_path()?).await?;

    let connector = Arc::new(ImapConnector::new(&config, imap_password));
    let transport = Arc::new(SmtpClient::new(&config, smtp_password)?);
    let generator = Arc::new(ChatClient::new(&config.ai));
    let ingest: Arc<dyn IngestSink> = match config.ingest.url {
        Some(ref url) => Arc::new(HttpIngestSink::new(url)),
        None => Arc::new(NoopIngestSink),
    };

    let threads = Arc::new(ThreadService::new(
        cache,
        connector,
        ingest,
        config.fetch.default_limit,
    ));
    let summaries = Arc::new(SummaryService::new(
        threads.clone(),
        generator.clone(),
        config.ai.summary_max_tokens,
    ));
    let replies = Arc::new(ReplyGateway::new(
        threads.clone(),
        summaries.clone(),
        generator.clone(),
        transport,
        config.ai.draft_max_tokens,
    ));

    let state = AppState {
        threads,
        summaries,
        replies,
        fetch: config.fetch.clone(),
        model: generator.model().to_string(),
        mailbox: config.account.mailbox.clone(),
    };

    tracing::info!(
        account = %config.account.email,
        mailbox = %config.account.mailbox,
        model = %generator.model(),
        "Starting mailbrief"
    );
    server::serve(&config.server.bind, state).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(2);
        }
    };

    match args.command.as_deref() {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("setup-password") => run_setup_password(&args),
        None | Some("serve") => {
            setup_logging(args.log_stderr);
            run_server(&args).await
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
