//! Readiness multiplexing over raw socket handles
//!
//! The scheduler consumes exactly one external primitive for I/O: given a set
//! of read-interest handles, a set of write-interest handles, and a timeout,
//! report which handles can be used without blocking. [`Multiplexer`] is the
//! seam; [`PollMultiplexer`] is the default `poll(2)` implementation. Tests
//! inject a fake to drive readiness deterministically.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// How long a multiplexing call may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until at least one handle is ready (or a signal interrupts).
    Block,
    /// Report current readiness without blocking.
    Immediate,
    /// Block up to the given duration.
    Bounded(Duration),
}

/// Handles reported ready by one multiplexing call.
#[derive(Debug, Default)]
pub struct PollEvents {
    /// Handles that can be read (or accepted) without blocking. Includes
    /// hung-up and errored handles so waiters wake up and observe the
    /// condition.
    pub readable: Vec<RawFd>,
    /// Handles that can be written without blocking.
    pub writable: Vec<RawFd>,
}

impl PollEvents {
    /// True when no handle was reported ready.
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }
}

/// The readiness-multiplexing boundary.
pub trait Multiplexer {
    /// Wait up to `timeout` for readiness on the given interest sets.
    ///
    /// An interrupted wait reports no events rather than an error; a handle
    /// present in both sets may be reported in both directions.
    fn poll(&mut self, read: &[RawFd], write: &[RawFd], timeout: Timeout)
        -> io::Result<PollEvents>;
}

/// Default multiplexer over `poll(2)`.
#[derive(Debug, Default)]
pub struct PollMultiplexer;

#[cfg(unix)]
impl Multiplexer for PollMultiplexer {
    fn poll(
        &mut self,
        read: &[RawFd],
        write: &[RawFd],
        timeout: Timeout,
    ) -> io::Result<PollEvents> {
        if read.is_empty() && write.is_empty() {
            return Ok(PollEvents::default());
        }

        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(read.len() + write.len());
        for &fd in read {
            fds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            });
        }
        for &fd in write {
            fds.push(libc::pollfd {
                fd,
                events: libc::POLLOUT,
                revents: 0,
            });
        }

        let timeout_ms: libc::c_int = match timeout {
            Timeout::Block => -1,
            Timeout::Immediate => 0,
            Timeout::Bounded(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(PollEvents::default());
            }
            return Err(err);
        }

        let mut events = PollEvents::default();
        for (i, pfd) in fds.iter().enumerate() {
            let hup = (pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL)) != 0;
            if i < read.len() {
                if (pfd.revents & libc::POLLIN) != 0 || hup {
                    events.readable.push(pfd.fd);
                }
            } else if (pfd.revents & libc::POLLOUT) != 0 || hup {
                events.writable.push(pfd.fd);
            }
        }
        Ok(events)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn empty_interest_sets_report_nothing() {
        let mut poller = PollMultiplexer;
        let events = poller.poll(&[], &[], Timeout::Immediate).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn listener_becomes_readable_when_a_client_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_raw_fd();
        let mut poller = PollMultiplexer;

        let events = poller.poll(&[fd], &[], Timeout::Immediate).unwrap();
        assert!(events.readable.is_empty());

        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let events = poller
            .poll(&[fd], &[], Timeout::Bounded(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(events.readable, vec![fd]);
    }

    #[test]
    fn connected_stream_is_immediately_writable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let fd = client.as_raw_fd();
        let mut poller = PollMultiplexer;

        let events = poller
            .poll(&[], &[fd], Timeout::Bounded(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(events.writable, vec![fd]);
    }
}
