use std::{
    io::{self, Write as _},
    net::{Shutdown, TcpStream},
    sync::Arc,
};

use tracing::{error, warn};

use crate::{
    builder::ClientConfiguration,
    host::HostResolver,
    point::Point,
    stats::SessionStats,
    writer::{Payload, PayloadWriter},
    Error,
};

/// Emits a progress event at `debug` when the session is in debug mode, and at `trace` otherwise.
macro_rules! progress {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            ::tracing::debug!($($arg)+);
        } else {
            ::tracing::trace!($($arg)+);
        }
    };
}

/// Connection state of a session, as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is open.
    Disconnected,

    /// A connection is open and ready to send payloads.
    Connected,
}

enum ClientState {
    // No connection has been established yet, or the last attempt failed.
    Disconnected,

    // Connection is open.
    Connected(TcpStream),

    // Session was disconnected and will not connect again.
    Closed,
}

/// An explicit batch of lines to submit, bypassing the pending buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Batch {
    /// Individual lines, which get joined with newlines and terminated by a trailing newline.
    Lines(Vec<String>),

    /// Pre-formatted text, sent as is.
    Raw(String),
}

impl Batch {
    fn into_payload(self) -> Payload {
        match self {
            Batch::Lines(lines) => Payload::from_lines(lines),
            Batch::Raw(raw) => Payload::from_raw(&raw),
        }
    }
}

impl From<Vec<String>> for Batch {
    fn from(lines: Vec<String>) -> Self {
        Batch::Lines(lines)
    }
}

impl From<String> for Batch {
    fn from(raw: String) -> Self {
        Batch::Raw(raw)
    }
}

impl From<&str> for Batch {
    fn from(raw: &str) -> Self {
        Batch::Raw(raw.to_owned())
    }
}

/// A session with a carbon server.
///
/// A session owns a single TCP connection and a buffer of pending lines. Data points are appended
/// to the buffer without any network I/O, and are written out as a single payload when the
/// session is submitted. The connection is opened lazily by the first submission, so a session
/// that only buffers data never holds a socket.
///
/// All operations block until they complete. Sessions are meant to be used by one caller at a
/// time; concurrent callers should each build their own.
///
/// Sessions are single-use: once [`disconnect`][CarbonClient::disconnect] has closed the
/// connection, the session refuses to connect again.
///
/// Dropping a connected session disconnects it, flushing any pending lines first. Dropping a
/// session that is not connected never opens a connection, so its pending lines are lost.
pub struct CarbonClient {
    config: ClientConfiguration,
    resolver: Arc<dyn HostResolver>,
    writer: PayloadWriter,
    state: ClientState,
    stats: SessionStats,
}

impl CarbonClient {
    pub(crate) fn new(config: ClientConfiguration, resolver: Arc<dyn HostResolver>) -> Self {
        CarbonClient {
            config,
            resolver,
            writer: PayloadWriter::new(),
            state: ClientState::Disconnected,
            stats: SessionStats::default(),
        }
    }

    /// Returns the server address in the form of `<server>:<port>`.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        match self.state {
            ClientState::Connected(_) => ConnectionState::Connected,
            ClientState::Disconnected | ClientState::Closed => ConnectionState::Disconnected,
        }
    }

    /// Returns `true` if the session was disconnected and can no longer connect.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ClientState::Closed)
    }

    /// Returns the number of data points waiting to be submitted.
    pub fn pending(&self) -> usize {
        self.writer.len()
    }

    /// Returns what the session has sent so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Connects to the server.
    ///
    /// Does nothing if the session is already connected.
    ///
    /// # Errors
    ///
    /// If the connection cannot be established within the connect timeout, [`Error::Connection`]
    /// is returned and the session stays disconnected. If the session was already disconnected
    /// once, [`Error::Connection`] is returned with an I/O error of kind
    /// [`io::ErrorKind::NotConnected`].
    pub fn connect(&mut self) -> Result<(), Error> {
        match self.state {
            ClientState::Connected(_) => return Ok(()),
            ClientState::Closed => {
                let source = io::Error::new(io::ErrorKind::NotConnected, "session was disconnected");
                return Err(Error::connection(self.address(), source));
            }
            ClientState::Disconnected => {}
        }

        progress!(
            self.config.debug,
            address = %self.address(),
            timeout = ?self.config.connect_timeout,
            "Connecting to carbon server."
        );

        let stream =
            self.config.open_stream().map_err(|e| Error::connection(self.address(), e))?;
        self.state = ClientState::Connected(stream);

        progress!(self.config.debug, address = %self.address(), "Connected to carbon server.");
        Ok(())
    }

    /// Appends a data point to the pending buffer.
    ///
    /// Missing fields are filled in as described in [`Point`]. No network I/O happens until the
    /// session is submitted.
    ///
    /// # Errors
    ///
    /// If the data point has no value, [`Error::MissingValue`] is returned. If the value is not a
    /// finite number, [`Error::InvalidValue`] is returned. Either way, nothing is buffered.
    pub fn append(&mut self, point: Point) -> Result<(), Error> {
        let point = point.resolve(self.resolver.as_ref())?;
        self.writer.write_point(&point);

        progress!(
            self.config.debug,
            group = point.group(),
            host = point.host(),
            metric = point.metric(),
            pending = self.writer.len(),
            "Appended data point."
        );
        Ok(())
    }

    /// Drops all pending data points without sending them.
    ///
    /// Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.writer.len();
        self.writer.clear();

        if discarded > 0 {
            progress!(
                self.config.debug,
                address = %self.address(),
                discarded,
                "Discarded pending data points."
            );
        }
        discarded
    }

    /// Submits all pending data points as a single payload.
    ///
    /// Connects first if needed. Does nothing, and does not connect, if nothing is pending.
    ///
    /// # Errors
    ///
    /// If connecting or writing fails, [`Error::Connection`] is returned and the data points are
    /// kept pending, ahead of any appended afterwards, so that the submission can be retried.
    pub fn submit(&mut self) -> Result<(), Error> {
        if self.writer.is_empty() {
            progress!(self.config.debug, address = %self.address(), "Nothing to submit.");
            return Ok(());
        }

        let payload = self.writer.take_payload();
        if let Err(e) = self.send(&payload) {
            self.writer.restore(payload);
            return Err(e);
        }

        Ok(())
    }

    /// Submits an explicit batch, leaving the pending buffer untouched.
    ///
    /// The batch is lowercased before it is sent. Connects first if needed. Does nothing if the
    /// batch is empty.
    ///
    /// # Errors
    ///
    /// If connecting or writing fails, [`Error::Connection`] is returned.
    pub fn submit_batch<B: Into<Batch>>(&mut self, batch: B) -> Result<(), Error> {
        let payload = batch.into().into_payload();
        if payload.is_empty() {
            return Ok(());
        }

        self.send(&payload)
    }

    /// Disconnects from the server.
    ///
    /// Pending data points are submitted first. The write side of the socket is then shut down,
    /// and the session is closed for good. Does nothing if the session is not connected.
    ///
    /// # Errors
    ///
    /// If submitting the pending data points fails, [`Error::Connection`] is returned and the
    /// session stays connected.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if !matches!(self.state, ClientState::Connected(_)) {
            progress!(self.config.debug, address = %self.address(), "Not connected to carbon server.");
            return Ok(());
        }

        if !self.writer.is_empty() {
            self.submit()?;
        }

        if let ClientState::Connected(stream) = std::mem::replace(&mut self.state, ClientState::Closed) {
            // Everything was already written, so a failed shutdown loses nothing.
            if let Err(e) = stream.shutdown(Shutdown::Write) {
                warn!(address = %self.address(), error = %e, "Failed to shut down connection.");
            }
        }

        progress!(self.config.debug, address = %self.address(), "Disconnected from carbon server.");
        Ok(())
    }

    fn send(&mut self, payload: &Payload) -> Result<(), Error> {
        self.connect()?;

        let ClientState::Connected(stream) = &mut self.state else {
            let source = io::Error::new(io::ErrorKind::NotConnected, "socket is not connected");
            return Err(Error::connection(self.config.address(), source));
        };

        progress!(
            self.config.debug,
            address = %self.config.address(),
            lines = payload.len(),
            bytes = payload.as_bytes().len(),
            "Sending payload to carbon server."
        );

        match stream.write_all(payload.as_bytes()).and_then(|()| stream.flush()) {
            Ok(()) => {
                self.stats.track_send_succeeded(payload.len(), payload.as_bytes().len());
                Ok(())
            }
            Err(e) => {
                self.stats.track_send_failed();
                error!(address = %self.config.address(), error = %e, "Failed to send payload.");
                Err(Error::connection(self.config.address(), e))
            }
        }
    }
}

impl Drop for CarbonClient {
    fn drop(&mut self) {
        if !matches!(self.state, ClientState::Connected(_)) && !self.writer.is_empty() {
            warn!(
                address = %self.address(),
                pending = self.writer.len(),
                "Dropping session that is not connected, pending data points were lost."
            );
            return;
        }

        if let Err(e) = self.disconnect() {
            error!(
                address = %self.address(),
                pending = self.writer.len(),
                error = %e,
                "Failed to disconnect from carbon server, pending data points were lost."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read as _},
        net::TcpListener,
        sync::{Arc, Mutex},
        thread::{self, JoinHandle},
        time::Duration,
    };

    use super::{Batch, ConnectionState};
    use crate::{host::StaticHostResolver, CarbonBuilder, CarbonClient, Error, Point};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn listen() -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            received
        });

        (port, handle)
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn client(port: u16) -> CarbonClient {
        CarbonBuilder::new()
            .with_server("127.0.0.1")
            .with_port(port)
            .with_host_resolver(StaticHostResolver::new("myhost"))
            .build()
            .unwrap()
    }

    fn point(metric: &str, value: i32) -> Point {
        Point::new(metric).with_group("g").with_value(value).with_timestamp(100)
    }

    #[test]
    fn append_does_not_connect() {
        let mut client = client(closed_port());
        client.append(point("a", 1)).unwrap();
        client.append(point("b", 2)).unwrap();

        assert_eq!(client.pending(), 2);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn append_rejects_missing_value() {
        let mut client = client(closed_port());
        let result = client.append(Point::new("a"));

        assert!(matches!(result, Err(Error::MissingValue { .. })));
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn submit_connects_lazily_and_drains() {
        let (port, server) = listen();
        let mut client = client(port);
        client.append(point("a", 1)).unwrap();
        client.append(point("b", 2)).unwrap();

        client.submit().unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.pending(), 0);

        // A second submission has nothing left to send.
        client.submit().unwrap();
        assert_eq!(client.stats().payloads_sent(), 1);
        assert_eq!(client.stats().lines_sent(), 2);

        client.disconnect().unwrap();
        assert_eq!(server.join().unwrap(), "g.myhost.a 1.000000 100\ng.myhost.b 2.000000 100\n");
    }

    #[test]
    fn empty_submit_does_not_connect() {
        let mut client = client(closed_port());
        client.submit().unwrap();
        client.submit_batch(Vec::<String>::new()).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_is_idempotent() {
        let (port, server) = listen();
        let mut client = client(port);
        client.connect().unwrap();
        client.connect().unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);

        client.disconnect().unwrap();
        assert_eq!(server.join().unwrap(), "");
    }

    #[test]
    fn failed_connect_keeps_buffer() {
        let port = closed_port();
        let mut client = client(port);
        client.append(point("a", 1)).unwrap();

        let result = client.submit();
        match result {
            Err(Error::Connection { address, .. }) => assert_eq!(address, format!("127.0.0.1:{port}")),
            other => panic!("expected connection error, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pending(), 1);

        client.append(point("b", 2)).unwrap();
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn disconnect_flushes_pending() {
        let (port, server) = listen();
        let mut client = client(port);
        client.connect().unwrap();
        client.append(point("Late", 3)).unwrap();

        client.disconnect().unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.is_closed());
        assert_eq!(server.join().unwrap(), "g.myhost.late 3.000000 100\n");
    }

    #[test]
    fn disconnect_when_disconnected_is_noop() {
        let mut client = client(closed_port());
        client.append(point("a", 1)).unwrap();
        client.disconnect().unwrap();

        assert!(!client.is_closed());
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn closed_session_does_not_reconnect() {
        let (port, server) = listen();
        let mut client = client(port);
        client.connect().unwrap();
        client.disconnect().unwrap();
        server.join().unwrap();

        for result in [client.connect(), client.submit_batch("a.b 1 2")] {
            match result {
                Err(Error::Connection { source, .. }) => {
                    assert_eq!(source.kind(), io::ErrorKind::NotConnected);
                }
                other => panic!("expected connection error, got {other:?}"),
            }
        }

        client.append(point("a", 1)).unwrap();
        assert!(matches!(client.submit(), Err(Error::Connection { .. })));
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn failed_write_keeps_buffer_and_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            // Close right away, so the client's writes end up being reset.
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut client = client(port);
        client.connect().unwrap();
        server.join().unwrap();

        // The first writes can still land in the socket buffer before the reset arrives.
        let mut failure = None;
        for value in 0..200 {
            client.append(point("lost", value)).unwrap();
            match client.submit() {
                Ok(()) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(Error::Connection { address, .. }) => assert_eq!(address, format!("127.0.0.1:{port}")),
            other => panic!("expected connection error, got {other:?}"),
        }
        assert_eq!(client.pending(), 1);
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.stats().payloads_failed(), 1);

        assert!(matches!(client.disconnect(), Err(Error::Connection { .. })));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(!client.is_closed());
        assert_eq!(client.pending(), 1);
        assert_eq!(client.stats().payloads_failed(), 2);
    }

    #[test]
    fn discard_pending_drops_buffer() {
        let mut client = client(closed_port());
        client.append(point("a", 1)).unwrap();
        client.append(point("b", 2)).unwrap();

        assert_eq!(client.discard_pending(), 2);
        assert_eq!(client.pending(), 0);
        assert_eq!(client.discard_pending(), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn explicit_batches() {
        let (port, server) = listen();
        let mut client = client(port);
        client.append(point("buffered", 1)).unwrap();

        client.submit_batch(vec!["A.B 1 2".to_owned(), "C.D 3 4".to_owned()]).unwrap();
        client.submit_batch(Batch::Raw("E.F 5 6\n".to_owned())).unwrap();
        assert_eq!(client.pending(), 1);

        client.disconnect().unwrap();
        assert_eq!(
            server.join().unwrap(),
            "a.b 1 2\nc.d 3 4\ne.f 5 6\ng.myhost.buffered 1.000000 100\n"
        );
    }

    #[test]
    fn drop_flushes_pending() {
        let (port, server) = listen();
        {
            let mut client = client(port);
            client.connect().unwrap();
            client.append(point("dropped", 1)).unwrap();
        }

        assert_eq!(server.join().unwrap(), "g.myhost.dropped 1.000000 100\n");
    }

    #[test]
    fn drop_without_connection_warns_about_pending() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt().with_ansi(false).with_writer(move || writer.clone()).finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut client = client(closed_port());
            client.append(point("never_sent", 1)).unwrap();
        });

        let logs = logs.contents();
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("pending data points were lost"), "logs: {logs}");
        assert!(logs.contains("pending=1"), "logs: {logs}");
    }

    #[test]
    fn drop_without_pending_is_quiet() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt().with_ansi(false).with_writer(move || writer.clone()).finish();

        tracing::subscriber::with_default(subscriber, || drop(client(closed_port())));

        assert_eq!(logs.contents(), "");
    }
}
