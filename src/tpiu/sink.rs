//! Trace-output sinks: an append-binary file and a TCP broadcast service
//! (spec §4.4 "Sink setup", §4.4 "poll_trace").

use std::fs::{File, OpenOptions};
use std::io::Write;

use crate::error::{Error, Result};

/// Opens `path` for append-binary writing, matching `arm_tpiu_swo.c`'s
/// `fopen(obj->out_filename, "ab")`.
pub fn open_file_sink(path: &str) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::Sink)
}

/// Writes `buf` to the sink file and flushes it. A write or flush failure is
/// fatal for the poll tick (spec §4.4: "failure is fatal for this tick").
pub fn write_file_sink(file: &mut File, buf: &[u8]) -> Result<()> {
    file.write_all(buf).map_err(Error::Io)?;
    file.flush().map_err(Error::Io)
}

/// A broadcast TCP service bound to a single port, fanning captured trace
/// bytes out to every connected client (spec §4.4, `:<port>` output).
///
/// Grounded on `arm_tpiu_swo.c`'s `arm_tpiu_swo_service_driver` connection
/// list: `net`-feature-gated since the generic TCP listener role is named
/// out of scope as "the generic TCP service registry" (spec §1) but this
/// crate's own broadcast fan-out is explicitly in scope (spec §4.4 DESIGN
/// NOTES, distinguishing it from `collab::ServiceRegistry`).
#[cfg(feature = "net")]
pub struct BroadcastService {
    listener: std::net::TcpListener,
    port: u16,
    connections: Vec<std::net::TcpStream>,
}

#[cfg(feature = "net")]
impl BroadcastService {
    /// Binds a new broadcast listener on `port`.
    pub fn bind(port: u16) -> Result<Self> {
        let listener = std::net::TcpListener::bind(("0.0.0.0", port)).map_err(Error::Sink)?;
        listener.set_nonblocking(true).map_err(Error::Sink)?;
        Ok(Self {
            listener,
            port,
            connections: Vec::new(),
        })
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts any pending client connections without blocking. Call this
    /// from the host's event loop on each tick, mirroring `arm_tpiu_swo.c`'s
    /// `arm_tpiu_swo_service_new_connection` callback.
    pub fn accept_pending(&mut self) {
        while let Ok((stream, _)) = self.listener.accept() {
            let _ = stream.set_nodelay(true);
            self.connections.push(stream);
        }
    }

    /// The number of currently tracked client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Broadcasts `buf` to every connected client. A per-client write
    /// failure is logged but does not drop the client from the list or stop
    /// the broadcast to the remaining clients (spec §4.4, §8 property 8).
    pub fn broadcast(&mut self, buf: &[u8]) {
        for conn in &mut self.connections {
            if let Err(e) = conn.write_all(buf) {
                tracing::error!(port = self.port, error = %e, "error writing to TPIU/SWO trace connection");
            }
        }
    }
}

#[cfg(all(test, feature = "net"))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;

    #[test]
    fn broadcast_fan_out_reaches_all_clients_in_order() {
        let mut service = BroadcastService::bind(0).unwrap();
        let port = service.port();
        // port 0 binds an ephemeral port; re-resolve it via local_addr for
        // the test clients instead of relying on the requested `port` value.
        let addr = service.listener.local_addr().unwrap();

        let client_a = TcpStream::connect(addr).unwrap();
        let client_b = TcpStream::connect(addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        service.accept_pending();
        assert_eq!(service.connection_count(), 2);

        service.broadcast(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut buf_a = [0u8; 4];
        let mut buf_b = [0u8; 4];
        let mut a = client_a;
        let mut b = client_b;
        a.read_exact(&mut buf_a).unwrap();
        b.read_exact(&mut buf_b).unwrap();
        assert_eq!(buf_a, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(buf_b, [0xDE, 0xAD, 0xBE, 0xEF]);
        let _ = port;
    }
}
