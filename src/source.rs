//! Datagram sources feeding a [Pipeline](crate::pipeline::Pipeline).
use std::collections::BTreeMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::error::{Error, Result};
use crate::sbn::{MAX_DATAGRAM_LEN, MIN_DATAGRAM_LEN};

/// A raw datagram as received from the network.
pub type Datagram = Vec<u8>;

/// Result of [PacketSource::recv].
#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    Datagram(Datagram),
    /// Nothing arrived this time around; poll again.
    Pending,
    /// The source is finished and will produce nothing more.
    Closed,
}

/// Produces datagrams in arrival order.
///
/// Implementations should only return [Recv::Pending] after having waited a short
/// while for data, since the caller polls again immediately.
pub trait PacketSource: Send + 'static {
    /// Get the next datagram.
    ///
    /// # Errors
    /// Any error reading the underlying transport. The source is not polled again.
    fn recv(&mut self) -> Result<Recv>;
}

/// A [PacketSource] over an iterator of datagrams, e.g., a replayed capture.
pub struct IterSource<I> {
    datagrams: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Datagram> + Send + 'static,
{
    pub fn new<T>(datagrams: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        IterSource {
            datagrams: datagrams.into_iter(),
        }
    }
}

impl<I> PacketSource for IterSource<I>
where
    I: Iterator<Item = Datagram> + Send + 'static,
{
    fn recv(&mut self) -> Result<Recv> {
        Ok(self.datagrams.next().map_or(Recv::Closed, Recv::Datagram))
    }
}

/// Maps the last octet of a NOAAPort multicast group address to its UDP port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct PortMap(BTreeMap<u8, u16>);

impl Default for PortMap {
    /// Groups 224.0.1.1 through 224.0.1.8 on ports 1201 through 1208.
    fn default() -> Self {
        PortMap((1..=8u8).map(|n| (n, 1200 + u16::from(n))).collect())
    }
}

impl PortMap {
    #[must_use]
    pub fn new(ports: BTreeMap<u8, u16>) -> Self {
        PortMap(ports)
    }

    /// Port for `group`, or `None` if its last octet is not mapped.
    #[must_use]
    pub fn port_for(&self, group: Ipv4Addr) -> Option<u16> {
        self.0.get(&group.octets()[3]).copied()
    }
}

/// Options for [MulticastSource::open].
#[derive(Debug, Clone, TypedBuilder)]
pub struct MulticastOptions {
    /// Multicast group to join
    pub group: Ipv4Addr,
    /// Local interface address to join on. Unspecified lets the OS choose.
    #[builder(default = Ipv4Addr::UNSPECIFIED)]
    pub interface: Ipv4Addr,
    /// Port to bind. Looked up in `ports` when not set.
    #[builder(default, setter(strip_option))]
    pub port: Option<u16>,
    #[builder(default)]
    pub ports: PortMap,
    /// Close the source once nothing has been received for this long.
    #[builder(default, setter(strip_option))]
    pub idle_timeout: Option<Duration>,
    /// How long a single read waits before checking back with the caller.
    #[builder(default = Duration::from_millis(100))]
    pub poll_interval: Duration,
    #[builder(default = MAX_DATAGRAM_LEN)]
    pub max_datagram: usize,
}

/// Receives SBN datagrams from a NOAAPort multicast group.
pub struct MulticastSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    idle_timeout: Option<Duration>,
    last_received: Instant,
}

impl MulticastSource {
    /// Bind the group's port with `SO_REUSEADDR` and join the group.
    ///
    /// # Errors
    /// [Error::Config] if the group is not multicast, no port can be determined, or
    /// the poll interval is zero. [Error::Io] for socket errors.
    pub fn open(opts: MulticastOptions) -> Result<Self> {
        if !opts.group.is_multicast() {
            return Err(Error::Config(format!("{} is not a multicast address", opts.group)));
        }
        if opts.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".into()));
        }
        let port = opts
            .port
            .or_else(|| opts.ports.port_for(opts.group))
            .ok_or_else(|| Error::Config(format!("no port configured for group {}", opts.group)))?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket.into();
        socket.join_multicast_v4(&opts.group, &opts.interface)?;
        socket.set_read_timeout(Some(opts.poll_interval))?;
        info!(group = %opts.group, interface = %opts.interface, port, "joined multicast group");

        Ok(MulticastSource {
            socket,
            buf: vec![0u8; opts.max_datagram],
            idle_timeout: opts.idle_timeout,
            last_received: Instant::now(),
        })
    }

    /// # Errors
    /// If the socket address cannot be determined.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for MulticastSource {
    fn recv(&mut self) -> Result<Recv> {
        match self.socket.recv(&mut self.buf) {
            Ok(n) => {
                self.last_received = Instant::now();
                if n < MIN_DATAGRAM_LEN {
                    debug!(len = n, "short datagram");
                }
                Ok(Recv::Datagram(self.buf[..n].to_vec()))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                match self.idle_timeout {
                    Some(timeout) if self.last_received.elapsed() >= timeout => {
                        info!("no datagrams for {timeout:?}, closing");
                        Ok(Recv::Closed)
                    }
                    _ => Ok(Recv::Pending),
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}
