//! Client side of device registration.
//!
//! A device without a token posts its identifier and registration key to the
//! link-device endpoint. The server answers `201` with a token once an
//! operator has approved the device, or `204` while approval is pending.

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ureq::Agent;

use crate::shutdown::ShutdownSignal;
use crate::timeout::Backoff;

use super::config::{LINK_DEVICE_PATH, MIN_REQUEST_TIMEOUT, endpoint};

/// Server answer to a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Token(String),
    Pending,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration request failed: {0}")]
    Transport(String),
    #[error("registration rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid registration response: {0}")]
    InvalidResponse(String),
    #[error("device_id and registration_key are required to obtain a token")]
    MissingCredentials,
    #[error("shutdown requested before a token was issued")]
    Interrupted,
}

impl RegistrationError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => matches!(status, 404 | 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct LinkRequest<'a> {
    device_id: &'a str,
    key: &'a str,
}

#[derive(Deserialize)]
struct LinkResponse {
    token: String,
}

/// Make one registration attempt.
pub fn register_device(
    agent: &Agent,
    domain: &str,
    device_id: &str,
    key: &str,
    timeout: Duration,
) -> Result<Registration, RegistrationError> {
    let body = serde_json::to_string(&LinkRequest { device_id, key })
        .map_err(|err| RegistrationError::InvalidResponse(err.to_string()))?;
    let result = agent
        .post(&endpoint(domain, LINK_DEVICE_PATH))
        .timeout(timeout)
        .set("Content-Type", "application/json")
        .send_string(&body);
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            return Err(RegistrationError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            });
        }
        Err(ureq::Error::Transport(err)) => {
            return Err(RegistrationError::Transport(err.to_string()));
        }
    };

    match response.status() {
        204 => Ok(Registration::Pending),
        200 | 201 => {
            let text = response
                .into_string()
                .map_err(|err| RegistrationError::InvalidResponse(err.to_string()))?;
            let parsed: LinkResponse = serde_json::from_str(&text)
                .map_err(|err| RegistrationError::InvalidResponse(err.to_string()))?;
            let token = parsed.token.trim();
            if token.is_empty() {
                return Err(RegistrationError::InvalidResponse("empty token".into()));
            }
            Ok(Registration::Token(token.to_owned()))
        }
        status => Err(RegistrationError::Rejected {
            status,
            body: response.into_string().unwrap_or_default(),
        }),
    }
}

/// Keep registering until a token is issued, a permanent error occurs, or
/// shutdown fires.
pub fn obtain_token<B: Backoff>(
    agent: &Agent,
    domain: &str,
    device_id: &str,
    key: &str,
    backoff: &mut B,
    shutdown: &ShutdownSignal,
) -> Result<String, RegistrationError> {
    if device_id.trim().is_empty() || key.trim().is_empty() {
        return Err(RegistrationError::MissingCredentials);
    }
    info!("Registration requesting a token for device {device_id}");
    loop {
        if shutdown.is_triggered() {
            return Err(RegistrationError::Interrupted);
        }
        let timeout = backoff.current().max(MIN_REQUEST_TIMEOUT);
        match register_device(agent, domain, device_id, key, timeout) {
            Ok(Registration::Token(token)) => {
                backoff.reset();
                info!("Registration approved for device {device_id}");
                return Ok(token);
            }
            Ok(Registration::Pending) => {
                info!(
                    "Registration pending approval; retrying in {:?}",
                    backoff.current()
                );
            }
            Err(err) if err.is_transient() => {
                warn!("Registration attempt failed: {err}");
            }
            Err(err) => return Err(err),
        }
        if !backoff.sleep(shutdown) {
            return Err(RegistrationError::Interrupted);
        }
    }
}
