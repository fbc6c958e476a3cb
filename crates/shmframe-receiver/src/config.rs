use std::time::Duration;

use shmframe_wire::DEFAULT_MAX_PAYLOAD;

use crate::error::{ReceiverError, Result};
use crate::sink::ScaleFactor;

/// Shared-memory name used when none is configured.
pub const DEFAULT_SHM_NAME: &str = "/psm_default";

/// Control address used when none is configured.
pub const DEFAULT_CONTROL_ADDRESS: &str = "ipc:///tmp/0";

/// Default sleep between empty polls of the control channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default minimum delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Control channel behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Keep only the newest pending message on every poll.
    pub conflate: bool,
    /// Minimum delay between reconnect attempts after the connection drops.
    pub reconnect_interval: Duration,
    /// Maximum accepted envelope payload in bytes.
    pub max_payload_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            conflate: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Everything a [`FrameReceiver`](crate::FrameReceiver) needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// Name of the producer's shared-memory object.
    pub shm_name: String,
    /// Control channel address (`ipc:///path`, `unix:///path` or a path).
    pub control_address: String,
    /// Sleep between polls that returned nothing.
    pub poll_interval: Duration,
    /// Output scale for converting sinks. Not applied by the receiver itself.
    pub scale_factor: Option<f32>,
    pub channel: ChannelConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SHM_NAME, DEFAULT_CONTROL_ADDRESS)
    }
}

impl ReceiverConfig {
    pub fn new(shm_name: impl Into<String>, control_address: impl Into<String>) -> Self {
        Self {
            shm_name: shm_name.into(),
            control_address: control_address.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            scale_factor: None,
            channel: ChannelConfig::default(),
        }
    }

    /// Override the empty-poll sleep.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the output scale factor handed to converting sinks.
    pub fn with_scale_factor(mut self, scale: f32) -> Self {
        self.scale_factor = Some(scale);
        self
    }

    /// Enable or disable conflation on the control channel.
    pub fn with_conflate(mut self, conflate: bool) -> Self {
        self.channel.conflate = conflate;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.channel.reconnect_interval = interval;
        self
    }

    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// The validated scale factor (full size when unset).
    pub fn scale(&self) -> Result<ScaleFactor> {
        self.scale_factor
            .map(ScaleFactor::new)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Check the configuration before any resource is acquired.
    pub fn validate(&self) -> Result<()> {
        if self.shm_name.trim_start_matches('/').is_empty() {
            return Err(ReceiverError::InvalidConfig(
                "shared memory name must not be empty".to_string(),
            ));
        }
        if self.control_address.is_empty() {
            return Err(ReceiverError::InvalidConfig(
                "control address must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ReceiverError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.channel.max_payload_size == 0 {
            return Err(ReceiverError::InvalidConfig(
                "max payload size must be greater than zero".to_string(),
            ));
        }
        self.scale()?;
        Ok(())
    }
}
