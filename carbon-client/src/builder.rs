use std::{
    fmt, io,
    net::{TcpStream, ToSocketAddrs as _},
    sync::Arc,
    time::Duration,
};

use crate::{
    client::CarbonClient,
    host::{HostResolver, SystemHostResolver},
    Error,
};

const DEFAULT_SERVER: &str = "carbon";
const DEFAULT_PORT: u16 = 2003;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_BATCH_SIZE: usize = 500;

/// Connection configuration of a session.
#[derive(Clone, Debug)]
pub(crate) struct ClientConfiguration {
    pub server: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
    pub debug: bool,
}

impl ClientConfiguration {
    /// Returns the server address in the form of `<server>:<port>`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Opens a TCP connection to the server.
    ///
    /// Every address the server name resolves to is tried in turn, each one bounded by the connect
    /// timeout. The error of the last attempt is returned if none of them succeed.
    pub fn open_stream(&self) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in (self.server.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(self.write_timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "server name resolved to no addresses")
        }))
    }
}

/// Builder for a [`CarbonClient`].
///
/// Building a client performs no I/O: the connection is only opened when the client is first asked
/// to connect or to submit data.
#[derive(Clone)]
pub struct CarbonBuilder {
    server: String,
    port: u16,
    connect_timeout: Duration,
    write_timeout: Option<Duration>,
    debug: bool,
    batch_size: usize,
    resolver: Arc<dyn HostResolver>,
}

impl CarbonBuilder {
    /// Creates a new `CarbonBuilder` with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name or IP address of the carbon server.
    ///
    /// Defaults to `carbon`.
    #[must_use]
    pub fn with_server<S: Into<String>>(mut self, server: S) -> Self {
        self.server = server.into();
        self
    }

    /// Sets the port of the carbon server.
    ///
    /// Defaults to 2003, the standard port of the plaintext protocol.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connect timeout.
    ///
    /// The timeout applies to each address the server name resolves to. A zero timeout causes every
    /// connection attempt to fail.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    ///
    /// When the write timeout is reached, the submission fails with a connection error. Passing
    /// `None`, or a zero duration, lets writes block for as long as the operating system allows.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    /// Sets whether or not the session reports its progress at the `debug` level.
    ///
    /// When disabled, the same events are still emitted, but at the `trace` level.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the maximum number of data points sent in a single payload by [`bulk_update`][crate::bulk_update].
    ///
    /// A payload is written as soon as `batch_size` data points are pending, so no payload ever
    /// holds more than `batch_size` lines and `N` data points are sent in `ceil(N / batch_size)`
    /// payloads. Must be greater than zero.
    ///
    /// Defaults to 500.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the resolver used to look up the local host name.
    ///
    /// Defaults to [`SystemHostResolver`].
    #[must_use]
    pub fn with_host_resolver<R>(mut self, resolver: R) -> Self
    where
        R: HostResolver + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Returns the configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// If the batch size is zero, [`Error::InvalidBatchSize`] is returned.
    pub fn build(self) -> Result<CarbonClient, Error> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }

        let config = ClientConfiguration {
            server: self.server,
            port: self.port,
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
            debug: self.debug,
        };

        Ok(CarbonClient::new(config, self.resolver))
    }
}

impl Default for CarbonBuilder {
    fn default() -> Self {
        CarbonBuilder {
            server: DEFAULT_SERVER.to_owned(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            debug: false,
            batch_size: DEFAULT_BATCH_SIZE,
            resolver: Arc::new(SystemHostResolver),
        }
    }
}

impl fmt::Debug for CarbonBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarbonBuilder")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("connect_timeout", &self.connect_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("debug", &self.debug)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
