//! JSON configuration for the `noaaport` binary.
use std::fs::File;
use std::io::BufReader;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::{Capacity, Overflow, PipelineOptions};
use crate::sbn::MAX_DATAGRAM_LEN;
use crate::source::{MulticastOptions, PortMap};

/// Top-level configuration. Every field has a default, so `{}` is a valid config.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub multicast: MulticastConfig,
    /// Last octet of the multicast group to UDP port
    pub ports: PortMap,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MulticastConfig {
    pub group: Ipv4Addr,
    pub interface: Ipv4Addr,
    /// Overrides the port looked up in [Config::ports].
    pub port: Option<u16>,
    /// Stop ingesting after this long without a datagram.
    pub read_timeout_ms: Option<u64>,
    pub max_datagram: usize,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        MulticastConfig {
            group: Ipv4Addr::new(224, 0, 1, 1),
            interface: Ipv4Addr::UNSPECIFIED,
            port: None,
            read_timeout_ms: None,
            max_datagram: MAX_DATAGRAM_LEN,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub backoff_ms: u64,
    pub inbound: QueueConfig,
    pub outbound: QueueConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            backoff_ms: 50,
            inbound: QueueConfig::default(),
            outbound: QueueConfig::default(),
        }
    }
}

/// Queue capacity. A `null` capacity is unbounded.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: Option<usize>,
    pub overflow: Overflow,
}

impl QueueConfig {
    /// # Errors
    /// [Error::Config] for a zero capacity.
    pub fn capacity(&self) -> Result<Capacity> {
        match self.capacity {
            None => Ok(Capacity::Unbounded),
            Some(0) => Err(Error::Config("queue capacity must be non-zero".into())),
            Some(size) => Ok(Capacity::Bounded {
                size,
                overflow: self.overflow,
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Inflate compressed fragments before writing
    pub decompress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("products"),
            decompress: true,
        }
    }
}

impl Config {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// If the file cannot be opened or is not valid config JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    #[must_use]
    pub fn multicast_options(&self) -> MulticastOptions {
        MulticastOptions {
            group: self.multicast.group,
            interface: self.multicast.interface,
            port: self.multicast.port,
            ports: self.ports.clone(),
            idle_timeout: self.multicast.read_timeout_ms.map(Duration::from_millis),
            poll_interval: Duration::from_millis(100),
            max_datagram: self.multicast.max_datagram,
        }
    }

    /// # Errors
    /// [Error::Config] if a queue capacity is invalid.
    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        Ok(PipelineOptions::builder()
            .backoff(Duration::from_millis(self.pipeline.backoff_ms))
            .inbound(self.pipeline.inbound.capacity()?)
            .outbound(self.pipeline.outbound.capacity()?)
            .build())
    }
}
