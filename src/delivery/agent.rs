//! Shared construction of the HTTPS agent.

use std::sync::Arc;
use std::time::Duration;

use native_tls::TlsConnector;
use ureq::{Agent, AgentBuilder};

/// Build a pooled agent that verifies certificates with the system trust store.
///
/// Per-request timeouts are applied by the caller; only the connect timeout is
/// fixed here.
pub fn build_agent(connect_timeout: Duration) -> Result<Agent, native_tls::Error> {
    let tls = TlsConnector::builder().build()?;
    Ok(AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .tls_connector(Arc::new(tls))
        .build())
}
