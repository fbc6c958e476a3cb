use std::time::Instant;

use bytes::Bytes;
use shmframe_transport::{ControlAddress, IpcStream, UnixDomainSocket};
use shmframe_wire::{FrameConfig, FrameReader, WireError};
use tracing::{debug, info, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{ReceiverError, Result};

/// Subscriber end of the control channel.
///
/// Connects to the producer's socket, filters payloads by their leading
/// topic byte and hands them out without blocking. With conflation on,
/// every poll drains what the socket has buffered and keeps only the
/// newest matching payload.
///
/// A connection that closes or delivers a broken envelope is dropped. Later
/// polls reconnect, at most once per `reconnect_interval`.
#[derive(Debug)]
pub struct ControlClient {
    address: ControlAddress,
    config: ChannelConfig,
    topics: Vec<u8>,
    reader: Option<FrameReader<IpcStream>>,
    last_attempt: Option<Instant>,
    reconnects: u64,
    conflated: u64,
}

impl ControlClient {
    /// Connect to the producer. Nothing is delivered until a topic is
    /// subscribed.
    pub fn connect(address: &ControlAddress, config: ChannelConfig) -> Result<Self> {
        let reader = open_reader(address, &config)?;
        debug!(address = %address, conflate = config.conflate, "control channel connected");
        Ok(Self {
            address: address.clone(),
            config,
            topics: Vec::new(),
            reader: Some(reader),
            last_attempt: None,
            reconnects: 0,
            conflated: 0,
        })
    }

    /// Deliver payloads whose first byte is `topic`.
    pub fn subscribe(&mut self, topic: u8) {
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
    }

    pub fn unsubscribe(&mut self, topic: u8) {
        self.topics.retain(|t| *t != topic);
    }

    /// Next matching payload, if one is available right now.
    ///
    /// An error means the connection broke during this call and has been
    /// dropped; the caller may keep polling.
    pub fn try_receive(&mut self) -> Result<Option<Bytes>> {
        if self.reader.is_none() {
            self.reconnect();
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut newest: Option<Bytes> = None;
        let failure = loop {
            match reader.try_read_frame() {
                Ok(Some(frame)) => {
                    if !accepts(&self.topics, &frame.payload) {
                        trace!(len = frame.payload.len(), "payload filtered by topic");
                        continue;
                    }
                    if newest.replace(frame.payload).is_some() {
                        self.conflated += 1;
                    }
                    if !self.config.conflate {
                        break None;
                    }
                }
                Ok(None) => break None,
                Err(err) => break Some(err),
            }
        };

        if let Some(err) = failure {
            self.disconnect(&err);
            if newest.is_none() {
                return Err(ReceiverError::Wire(err));
            }
        }
        Ok(newest)
    }

    /// Drop the connection without scheduling a reconnect delay.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.get_ref().shutdown();
            debug!(address = %self.address, "control channel closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    pub fn address(&self) -> &ControlAddress {
        &self.address
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Successful reconnects since `connect`.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Matching payloads discarded in favor of a newer one.
    pub fn conflated(&self) -> u64 {
        self.conflated
    }

    fn disconnect(&mut self, err: &WireError) {
        match err {
            WireError::ConnectionClosed => {
                warn!(address = %self.address, "control channel closed by producer")
            }
            other => {
                warn!(address = %self.address, error = %other, "dropping control connection")
            }
        }
        self.reader = None;
        self.last_attempt = Some(Instant::now());
    }

    fn reconnect(&mut self) {
        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.config.reconnect_interval {
                return;
            }
        }
        self.last_attempt = Some(Instant::now());

        match open_reader(&self.address, &self.config) {
            Ok(reader) => {
                self.reader = Some(reader);
                self.reconnects += 1;
                info!(address = %self.address, "control channel reconnected");
            }
            Err(err) => debug!(address = %self.address, error = %err, "reconnect attempt failed"),
        }
    }
}

fn accepts(topics: &[u8], payload: &[u8]) -> bool {
    payload.first().is_some_and(|topic| topics.contains(topic))
}

fn open_reader(address: &ControlAddress, config: &ChannelConfig) -> Result<FrameReader<IpcStream>> {
    let stream =
        UnixDomainSocket::connect(address.path()).map_err(|source| ReceiverError::Connect {
            address: address.to_string(),
            source,
        })?;
    let frame_config = FrameConfig {
        max_payload_size: config.max_payload_size,
        read_timeout: None,
        write_timeout: None,
    };
    Ok(FrameReader::nonblocking_ipc(stream, frame_config)?)
}
