//! Wiring of one call source, one queue and one delivery worker.
//!
//! [`Daemon::run`] resolves the device token, builds the configured source,
//! starts it on a named producer thread and runs the [`DeliveryWorker`] on
//! the calling thread. Whatever ends the worker (shutdown or a revoked
//! token) triggers the shared [`ShutdownSignal`] so the producer stops too,
//! and the producer is joined before `run` returns.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use log::{error, info, warn};
use thiserror::Error;

use crate::delivery::{DeliveryError, DeliveryWorker, RegistrationError, build_agent, obtain_token};
use crate::queue::BoundedQueue;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::source::{SourceError, SourceRegistry};
use crate::timeout::TimeoutController;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no token available: set token, token_file, or device_id and registration_key")]
    NoToken,
    #[error("failed to start the call source thread: {0}")]
    Spawn(#[source] io::Error),
}

impl DaemonError {
    /// Whether the server revoked the device token.
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Delivery(DeliveryError::Revoked { .. }))
    }
}

/// Read a persisted token. A missing or blank file yields `None`.
pub fn read_token(path: &Path) -> Result<Option<String>, DaemonError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let token = text.trim();
            Ok((!token.is_empty()).then(|| token.to_owned()))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(DaemonError::TokenFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persist an issued token, creating parent directories as needed.
pub fn store_token(path: &Path, token: &str) -> Result<(), DaemonError> {
    let wrap = |source| DaemonError::TokenFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    fs::write(path, format!("{token}\n")).map_err(wrap)
}

/// Delete a revoked token so the next start registers again.
pub fn forget_token(path: &Path) -> Result<(), DaemonError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DaemonError::TokenFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub struct Daemon {
    settings: Settings,
    registry: SourceRegistry,
}

impl Daemon {
    /// `settings` should already have passed [`Settings::validate`].
    pub fn new(settings: Settings, registry: SourceRegistry) -> Self {
        Self { settings, registry }
    }

    /// Resolved settings the daemon runs with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Token from settings, then the token file, then registration.
    ///
    /// Returns `Ok(None)` when shutdown interrupts registration.
    pub fn resolve_token(&self, shutdown: &ShutdownSignal) -> Result<Option<String>, DaemonError> {
        let settings = &self.settings;
        if let Some(token) = &settings.token {
            return Ok(Some(token.clone()));
        }
        if let Some(path) = &settings.token_file
            && let Some(token) = read_token(path)?
        {
            info!("Daemon using token from {}", path.display());
            return Ok(Some(token));
        }
        let (Some(device_id), Some(key)) = (&settings.device_id, &settings.registration_key) else {
            return Err(DaemonError::NoToken);
        };

        let agent = build_agent(settings.connect_timeout).map_err(DeliveryError::from)?;
        let mut backoff = TimeoutController::new(settings.timeout.clone());
        let token = match obtain_token(
            &agent,
            &settings.domain,
            device_id,
            key,
            &mut backoff,
            shutdown,
        ) {
            Ok(token) => token,
            Err(RegistrationError::Interrupted) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if let Some(path) = &settings.token_file {
            store_token(path, &token)?;
            info!("Daemon stored token in {}", path.display());
        }
        Ok(Some(token))
    }

    /// Run until shutdown or a fatal delivery error.
    pub fn run(&self, shutdown: &ShutdownSignal) -> Result<(), DaemonError> {
        let Some(token) = self.resolve_token(shutdown)? else {
            info!("Daemon shut down before a token was issued");
            return Ok(());
        };

        let settings = &self.settings;
        let mut source = self.registry.build(&settings.plugin, settings)?;
        let queue = BoundedQueue::new(settings.queue_size, settings.overflow)
            .with_warner(RateLimitedWarner::new(settings.warn_interval));
        let mut worker =
            DeliveryWorker::new(settings.delivery_config(&token), queue.clone(), shutdown.clone())?;

        let producer = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("cdr-source-{}", source.name()))
                .spawn(move || source.entrypoint(&queue, &shutdown))
                .map_err(DaemonError::Spawn)?
        };

        let result = worker.run();
        shutdown.trigger();
        if producer.join().is_err() {
            error!("Daemon call source thread panicked");
        }

        if let Err(DeliveryError::Revoked { status }) = &result {
            warn!("Daemon token revoked (HTTP {status})");
            if let Some(path) = &settings.token_file {
                forget_token(path)?;
                info!("Daemon deleted revoked token {}", path.display());
            }
        }
        result.map_err(DaemonError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_file_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("state/token");

        assert_eq!(read_token(&path).expect("missing is fine"), None);
        store_token(&path, "abc123").expect("stored");
        assert_eq!(read_token(&path).expect("readable"), Some("abc123".into()));
        forget_token(&path).expect("deleted");
        forget_token(&path).expect("deleting twice is fine");
        assert!(!path.exists());
    }

    #[test]
    fn blank_token_file_counts_as_missing() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("token");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(read_token(&path).expect("readable"), None);
    }

    #[test]
    fn configured_token_wins() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("token");
        store_token(&path, "from-file").expect("stored");
        let settings = Settings {
            token: Some("from-settings".into()),
            token_file: Some(path),
            ..Settings::default()
        };
        let daemon = Daemon::new(settings, SourceRegistry::with_builtin());
        let token = daemon
            .resolve_token(&ShutdownSignal::new())
            .expect("resolved");
        assert_eq!(token.as_deref(), Some("from-settings"));
    }

    #[test]
    fn token_file_is_used_without_a_configured_token() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("token");
        store_token(&path, "from-file").expect("stored");
        let settings = Settings {
            token_file: Some(path),
            ..Settings::default()
        };
        let daemon = Daemon::new(settings, SourceRegistry::with_builtin());
        let token = daemon
            .resolve_token(&ShutdownSignal::new())
            .expect("resolved");
        assert_eq!(token.as_deref(), Some("from-file"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let daemon = Daemon::new(Settings::default(), SourceRegistry::with_builtin());
        let err = daemon
            .resolve_token(&ShutdownSignal::new())
            .expect_err("no token source");
        assert!(matches!(err, DaemonError::NoToken));
    }
}
