//! Acceptor side of the upgrade handshake
//!
//! ```text
//! Idle → RequestReceived → Validated → BackendDialed → Established
//!      ↘ Failed (400)     ↘ Rejected   ↘ Failed (500)
//!                           (404/426)
//! ```
//!
//! The backend dial itself belongs to the caller; this type only tracks
//! the outcome and writes the matching response.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::common::{Connection, Result};
use crate::error::Error;

use super::codec::{encode_status_line, read_request, Status, UpgradeRequest};
use super::AcceptorConfig;

/// Acceptor handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Idle,
    RequestReceived,
    Validated,
    Rejected,
    BackendDialed,
    Established,
    Failed,
}

/// Why a request was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    PathMismatch(String),
    MethodMismatch(String),
    ConnectionHeader(Option<String>),
    UpgradeHeader(Option<String>),
}

impl Rejection {
    /// Path and method mismatches are always 404. Header mismatches are 426
    /// unless hidden mode disguises them as 404.
    pub fn status(&self, hidden: bool) -> Status {
        match self {
            Rejection::PathMismatch(_) | Rejection::MethodMismatch(_) => Status::NotFound,
            Rejection::ConnectionHeader(_) | Rejection::UpgradeHeader(_) => {
                if hidden {
                    Status::NotFound
                } else {
                    Status::UpgradeRequired
                }
            }
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::PathMismatch(path) => write!(f, "unknown path {}", path),
            Rejection::MethodMismatch(method) => write!(f, "method {} not accepted", method),
            Rejection::ConnectionHeader(value) => {
                write!(f, "Connection header is {:?}, expected \"Upgrade\"", value)
            }
            Rejection::UpgradeHeader(value) => {
                write!(f, "Upgrade header {:?} not accepted", value)
            }
        }
    }
}

/// Check a request against the acceptor settings.
///
/// Order: path, method, `Connection`, `Upgrade`. The first failure wins.
pub fn validate(config: &AcceptorConfig, request: &UpgradeRequest) -> std::result::Result<(), Rejection> {
    if !request.target.eq_ignore_ascii_case(&config.path) {
        return Err(Rejection::PathMismatch(request.target.clone()));
    }
    if request.method != config.method {
        return Err(Rejection::MethodMismatch(request.method.clone()));
    }

    let connection = request.header("Connection");
    if connection != Some("Upgrade") {
        return Err(Rejection::ConnectionHeader(connection.map(str::to_string)));
    }

    let upgrade = request.header("Upgrade");
    if upgrade != Some(config.upgrade.as_str()) {
        return Err(Rejection::UpgradeHeader(upgrade.map(str::to_string)));
    }

    Ok(())
}

/// Server role of the upgrade handshake
#[derive(Debug)]
pub struct AcceptorHandshake {
    config: Arc<AcceptorConfig>,
    state: AcceptorState,
    /// Response owed to a rejected request
    rejection: Option<Status>,
}

impl AcceptorHandshake {
    pub fn new(config: Arc<AcceptorConfig>) -> Self {
        Self {
            config,
            state: AcceptorState::Idle,
            rejection: None,
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.state
    }

    /// Read one request from `conn`. A malformed request is answered with 400.
    pub async fn receive(&mut self, conn: &mut Connection) -> Result<UpgradeRequest> {
        self.expect(AcceptorState::Idle)?;

        match read_request(conn).await {
            Ok((request, rest)) => {
                conn.unread(rest);
                self.transition(AcceptorState::RequestReceived);
                Ok(request)
            }
            Err(e) => {
                self.transition(AcceptorState::Failed);
                // Best effort, the peer may already be gone
                let _ = respond(conn, Status::BadRequest).await;
                Err(e)
            }
        }
    }

    /// Validate a received request without answering it.
    ///
    /// A rejection comes back as [`Error::ValidationRejected`]; send the
    /// matching 404 or 426 with [`AcceptorHandshake::reject`].
    pub fn validate(&mut self, request: &UpgradeRequest) -> Result<()> {
        self.expect(AcceptorState::RequestReceived)?;

        match validate(&self.config, request) {
            Ok(()) => {
                self.transition(AcceptorState::Validated);
                Ok(())
            }
            Err(rejection) => {
                self.transition(AcceptorState::Rejected);
                let status = rejection.status(self.config.hidden);
                self.rejection = Some(status);
                Err(Error::ValidationRejected {
                    status: status.code(),
                    reason: rejection.to_string(),
                })
            }
        }
    }

    /// Answer a rejected request with its 404 or 426.
    pub async fn reject(&mut self, conn: &mut Connection) -> Result<()> {
        self.expect(AcceptorState::Rejected)?;
        match self.rejection.take() {
            Some(status) => respond(conn, status).await,
            None => Err(Error::Config("rejection already answered".into())),
        }
    }

    /// The backend could not be reached: answer 500.
    pub async fn backend_failed(&mut self, conn: &mut Connection) -> Result<()> {
        self.expect(AcceptorState::Validated)?;
        self.transition(AcceptorState::Failed);
        respond(conn, Status::InternalServerError).await
    }

    /// The backend is connected: answer 101 and hand the connection over.
    pub async fn establish(&mut self, conn: &mut Connection) -> Result<()> {
        self.expect(AcceptorState::Validated)?;
        self.transition(AcceptorState::BackendDialed);
        if let Err(e) = respond(conn, Status::SwitchingProtocols).await {
            self.transition(AcceptorState::Failed);
            return Err(e);
        }
        self.transition(AcceptorState::Established);
        Ok(())
    }

    fn expect(&self, state: AcceptorState) -> Result<()> {
        if self.state != state {
            return Err(Error::Config(format!(
                "acceptor handshake is {:?}, expected {:?}",
                self.state, state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: AcceptorState) {
        trace!("Acceptor handshake {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

async fn respond(conn: &mut Connection, status: Status) -> Result<()> {
    conn.write_all(&encode_status_line(status)).await?;
    conn.flush().await?;
    Ok(())
}
