//! Initiator side of the upgrade handshake
//!
//! ```text
//! Idle → RequestSent → AwaitingResponse → Established
//!                                       ↘ Failed
//! ```
//!
//! One attempt per handshake, no retries.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::common::{Connection, Result};
use crate::error::Error;

use super::codec::{decode_response_status_line, encode_request, find_head_end, StatusLine};
use super::InitiatorConfig;

/// Fixed wait for the upgrade response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Most bytes read while looking for the end of the response head
pub const MAX_RESPONSE_HEAD: usize = 1024;

/// Initiator handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    RequestSent,
    AwaitingResponse,
    Established,
    Failed,
}

/// Client role of the upgrade handshake
#[derive(Debug)]
pub struct InitiatorHandshake {
    config: InitiatorConfig,
    state: InitiatorState,
}

impl InitiatorHandshake {
    pub fn new(config: InitiatorConfig) -> Self {
        Self {
            config,
            state: InitiatorState::Idle,
        }
    }

    pub fn state(&self) -> InitiatorState {
        self.state
    }

    /// Send the upgrade request on `conn` and wait for `101 Switching Protocols`.
    ///
    /// On success any bytes that followed the response head are pushed back
    /// into `conn`, so the relay sees them first.
    pub async fn perform(&mut self, conn: &mut Connection) -> Result<()> {
        if self.state != InitiatorState::Idle {
            return Err(Error::Config("handshake already attempted".into()));
        }

        match self.exchange(conn).await {
            Ok(()) => {
                self.transition(InitiatorState::Established);
                Ok(())
            }
            Err(e) => {
                self.transition(InitiatorState::Failed);
                Err(e)
            }
        }
    }

    async fn exchange(&mut self, conn: &mut Connection) -> Result<()> {
        let request = encode_request(&self.config.path, &self.config.host, &self.config.upgrade);
        conn.write_all(&request).await?;
        conn.flush().await?;
        self.transition(InitiatorState::RequestSent);

        // The deadline covers the response read only
        self.transition(InitiatorState::AwaitingResponse);
        let timeout = self.config.response_timeout;
        let (status, rest) = tokio::time::timeout(timeout, read_response_head(conn))
            .await
            .map_err(|_| Error::ReadTimeout(timeout))??;

        if !status.is_switching_protocols() {
            return Err(Error::UnexpectedStatus {
                code: status.code,
                reason: status.reason,
            });
        }

        if !rest.is_empty() {
            debug!("{} bytes arrived with the upgrade response", rest.len());
        }
        conn.unread(rest);
        Ok(())
    }

    fn transition(&mut self, next: InitiatorState) {
        trace!("Initiator handshake {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Read until the blank line ending the response head, EOF, or
/// [`MAX_RESPONSE_HEAD`] bytes.
async fn read_response_head(conn: &mut Connection) -> Result<(StatusLine, Bytes)> {
    let mut buf = vec![0u8; MAX_RESPONSE_HEAD];
    let mut filled = 0;

    while filled < buf.len() {
        let n = conn.read(&mut buf[filled..]).await.map_err(Error::ReadFailed)?;
        if n == 0 {
            if filled == 0 {
                return Err(Error::ReadFailed(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before the upgrade response",
                )));
            }
            // Peer hung up mid-head; judge it by its status line
            let status = decode_response_status_line(&buf[..filled])?;
            return Ok((status, Bytes::new()));
        }
        filled += n;

        if let Some(end) = find_head_end(&buf[..filled]) {
            let status = decode_response_status_line(&buf[..end])?;
            return Ok((status, Bytes::copy_from_slice(&buf[end..filled])));
        }
    }

    Err(Error::MalformedResponse(format!(
        "response head exceeds {} bytes",
        MAX_RESPONSE_HEAD
    )))
}
