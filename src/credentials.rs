//! Mailbox and relay passwords: environment, then OS keyring, then a 0600 file.

use anyhow::Result;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const KEYRING_SERVICE: &str = "mailbrief";
const ENV_PASSWORD: &str = "MAILBRIEF_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Imap,
    Smtp,
}

impl Protocol {
    fn key_prefix(self) -> &'static str {
        match self {
            Protocol::Imap => "imap",
            Protocol::Smtp => "smtp",
        }
    }

    fn env_var(self) -> &'static str {
        match self {
            Protocol::Imap => "MAILBRIEF_IMAP_PASSWORD",
            Protocol::Smtp => "MAILBRIEF_SMTP_PASSWORD",
        }
    }
}

/// Where a password was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    Keyring,
    File,
}

pub struct CredentialStore {
    email: String,
    password_file: PathBuf,
}

impl CredentialStore {
    pub fn new(email: &str) -> Self {
        let dir = crate::config::Config::config_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(email, dir)
    }

    /// Store whose file fallback lives in `dir`.
    pub fn in_dir(email: &str, dir: PathBuf) -> Self {
        let safe_email = email.replace(['@', '.', '/', '\\', ':'], "_");
        Self {
            email: email.to_string(),
            password_file: dir.join(format!(".password_{}", safe_email)),
        }
    }

    fn key(&self, protocol: Protocol) -> String {
        format!("{}:{}", protocol.key_prefix(), self.email)
    }

    /// Protocol-specific variable first, then the shared one
    fn env_password(protocol: Protocol) -> Option<String> {
        env::var(protocol.env_var())
            .or_else(|_| env::var(ENV_PASSWORD))
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn keyring_get(&self, key: &str) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, key).ok()?;
        entry.get_password().ok()
    }

    fn keyring_set(&self, key: &str, password: &str) -> bool {
        match keyring::Entry::new(KEYRING_SERVICE, key) {
            Ok(entry) => entry.set_password(password).is_ok(),
            Err(_) => false,
        }
    }

    fn file_get(&self) -> Option<String> {
        fs::read_to_string(&self.password_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Create the file with restricted permissions atomically to avoid TOCTOU
    fn file_set(&self, password: &str) -> Result<()> {
        if let Some(parent) = self.password_file.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.password_file)?;
            file.write_all(password.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.password_file, password)?;
        }

        Ok(())
    }

    /// Resolve a password, `None` when no backend has one.
    pub fn password(&self, protocol: Protocol) -> Option<String> {
        if let Some(pwd) = Self::env_password(protocol) {
            return Some(pwd);
        }
        if let Some(pwd) = self.keyring_get(&self.key(protocol)) {
            return Some(pwd);
        }
        // The file fallback holds one password for both protocols
        self.file_get()
    }

    /// Save a password for the given protocols, preferring the keyring.
    pub fn set_password(&self, protocols: &[Protocol], password: &str) -> Result<Stored> {
        let keys: Vec<String> = protocols.iter().map(|p| self.key(*p)).collect();

        let all_set = keys.iter().all(|key| self.keyring_set(key, password));
        if all_set && keys.iter().all(|key| self.keyring_get(key).is_some()) {
            return Ok(Stored::Keyring);
        }

        tracing::warn!("Keyring unavailable, storing password in {}", self.password_file.display());
        self.file_set(password)?;
        Ok(Stored::File)
    }

    pub fn password_file(&self) -> &std::path::Path {
        &self.password_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent parallel test interference with env vars
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        // SAFETY: guarded by ENV_MUTEX; no other thread reads these variables
        unsafe {
            env::remove_var(ENV_PASSWORD);
            env::remove_var(Protocol::Imap.env_var());
            env::remove_var(Protocol::Smtp.env_var());
        }
    }

    fn unique_email(tag: &str) -> String {
        format!("{}_{}@example.com", tag, std::process::id())
    }

    #[test]
    fn test_protocol_env_beats_shared_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: guarded by ENV_MUTEX
        unsafe {
            env::set_var(ENV_PASSWORD, "shared");
            env::set_var(Protocol::Smtp.env_var(), "relay-only");
        }

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(&unique_email("env"), dir.path().to_path_buf());
        assert_eq!(store.password(Protocol::Imap).as_deref(), Some("shared"));
        assert_eq!(store.password(Protocol::Smtp).as_deref(), Some("relay-only"));

        clear_env();
    }

    #[test]
    fn test_env_takes_priority_over_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(&unique_email("priority"), dir.path().to_path_buf());
        store.file_set("file_password").unwrap();

        // SAFETY: guarded by ENV_MUTEX
        unsafe { env::set_var(Protocol::Imap.env_var(), "env_password") };
        assert_eq!(store.password(Protocol::Imap).as_deref(), Some("env_password"));

        clear_env();
    }

    #[test]
    fn test_file_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(&unique_email("file"), dir.path().to_path_buf());
        store.file_set("  hunter2\n").unwrap();

        assert_eq!(store.file_get(), Some("hunter2".to_string()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.password_file()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_email_specific_sanitized_file_names() {
        let dir = PathBuf::from("/tmp");
        let store1 = CredentialStore::in_dir("user1@example.com", dir.clone());
        let store2 = CredentialStore::in_dir("user.name+tag@sub.domain.com", dir);

        let name1 = store1.password_file.file_name().unwrap().to_string_lossy().to_string();
        let name2 = store2.password_file.file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(name1, ".password_user1_example_com");
        assert_ne!(name1, name2);
        assert!(!name2.contains('@'));
        assert!(!name2.contains('/'));
    }

    #[test]
    fn test_keys_are_protocol_scoped() {
        let store = CredentialStore::in_dir("me@example.com", PathBuf::from("."));
        assert_eq!(store.key(Protocol::Imap), "imap:me@example.com");
        assert_eq!(store.key(Protocol::Smtp), "smtp:me@example.com");
    }
}
