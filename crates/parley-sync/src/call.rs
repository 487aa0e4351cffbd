//! Call session wiring over an opaque audio/video transport.
//!
//! Only the three transport operations are driven from here; ringing and
//! accept/reject UI state live with the caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use parley_shared::{ConversationId, MediaKind, UserId};

use crate::error::CallError;

/// Real-time call transport.
#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn join(&self, channel: &str, kind: MediaKind) -> Result<(), CallError>;
    async fn leave(&self) -> Result<(), CallError>;
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), CallError>;
}

/// One call between two users on their shared call channel.
pub struct CallSession {
    transport: Arc<dyn CallTransport>,
    channel: String,
    kind: MediaKind,
    joined: bool,
    microphone_on: bool,
}

impl CallSession {
    pub fn new(
        transport: Arc<dyn CallTransport>,
        me: &UserId,
        correspondent: &UserId,
        kind: MediaKind,
    ) -> Self {
        Self {
            transport,
            channel: ConversationId::for_pair(me, correspondent).call_channel(),
            kind,
            joined: false,
            microphone_on: true,
        }
    }

    /// Join the call channel. A second join while joined is a no-op.
    ///
    /// The session only counts as joined once the transport accepts, so a
    /// join that fails or is cancelled mid-flight can be retried.
    pub async fn join(&mut self) -> Result<(), CallError> {
        if self.joined {
            return Ok(());
        }

        if let Err(e) = self.transport.join(&self.channel, self.kind).await {
            warn!(channel = %self.channel, error = %e, "failed to join call");
            return Err(e);
        }
        self.joined = true;

        info!(channel = %self.channel, video = self.kind.is_video(), "joined call");
        Ok(())
    }

    /// Flip the microphone; the local state only changes once the transport accepts it.
    pub async fn toggle_microphone(&mut self) -> Result<bool, CallError> {
        let enabled = !self.microphone_on;
        self.transport.set_microphone_enabled(enabled).await?;
        self.microphone_on = enabled;
        Ok(enabled)
    }

    /// Leave the call channel. Idempotent.
    pub async fn leave(&mut self) -> Result<(), CallError> {
        if !self.joined {
            return Ok(());
        }
        self.transport.leave().await?;
        self.joined = false;
        info!(channel = %self.channel, "left call");
        Ok(())
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_microphone_on(&self) -> bool {
        self.microphone_on
    }
}
