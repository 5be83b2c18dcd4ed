//! Coroutine-shaped wrapper around non-blocking TCP sockets
//!
//! A [`Socket`] wraps one non-blocking listener or stream and exposes
//! `accept`/`read`/`write` as coroutines: each yields a readiness system call,
//! suspends until the I/O poll task observes the socket ready, performs the
//! actual non-blocking operation, and returns the result to the delegating
//! parent. `close` is direct and best-effort.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::coroutine::{BoxCoroutine, Coroutine, Step};
use crate::error::TaskError;
use crate::syscall::SystemCall;
use crate::value::Value;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Stable socket identity, issued once at wrap time.
///
/// Used as the wait-set key instead of the raw OS handle, so identity
/// survives close and never depends on fd reuse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Stream {
    Listener(TcpListener),
    Connected(TcpStream),
}

struct Inner {
    id: SocketId,
    fd: RawFd,
    stream: RefCell<Option<Stream>>,
}

/// A non-blocking byte-stream handle with coroutine-shaped operations.
///
/// Cheap to clone; all clones refer to the same underlying stream and share
/// its identity.
#[derive(Clone)]
pub struct Socket {
    inner: Rc<Inner>,
}

impl Socket {
    fn wrap(stream: Stream) -> Socket {
        let fd = match &stream {
            Stream::Listener(l) => l.as_raw_fd(),
            Stream::Connected(s) => s.as_raw_fd(),
        };
        Socket {
            inner: Rc::new(Inner {
                id: SocketId::next(),
                fd,
                stream: RefCell::new(Some(stream)),
            }),
        }
    }

    /// Wrap an existing listener, switching it to non-blocking mode.
    pub fn from_listener(listener: TcpListener) -> io::Result<Socket> {
        listener.set_nonblocking(true)?;
        Ok(Socket::wrap(Stream::Listener(listener)))
    }

    /// Wrap an existing stream, switching it to non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> io::Result<Socket> {
        stream.set_nonblocking(true)?;
        Ok(Socket::wrap(Stream::Connected(stream)))
    }

    /// Bind a listening socket and wrap it.
    pub fn listen<A: ToSocketAddrs>(addr: A) -> io::Result<Socket> {
        Socket::from_listener(TcpListener::bind(addr)?)
    }

    /// Connect to a remote peer and wrap the stream.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Socket> {
        Socket::from_stream(TcpStream::connect(addr)?)
    }

    /// Stable identity, used as the wait-set key.
    pub fn id(&self) -> SocketId {
        self.inner.id
    }

    /// The raw handle handed to the readiness multiplexer.
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.inner.fd
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &*self.inner.stream.borrow() {
            Some(Stream::Listener(l)) => l.local_addr(),
            Some(Stream::Connected(s)) => s.local_addr(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed")),
        }
    }

    /// Accept one pending connection as a coroutine.
    ///
    /// Suspends on read readiness, then accepts, configures the connection
    /// non-blocking, and returns it wrapped as a new `Socket`.
    pub fn accept(&self) -> BoxCoroutine {
        Box::new(AcceptCoroutine {
            socket: self.clone(),
            stage: IoStage::Init,
        })
    }

    /// Read up to `size` bytes as a coroutine.
    ///
    /// Suspends on read readiness; returns the bytes read. Empty bytes
    /// indicate end of stream.
    pub fn read(&self, size: usize) -> BoxCoroutine {
        Box::new(ReadCoroutine {
            socket: self.clone(),
            size,
            stage: IoStage::Init,
        })
    }

    /// Write `bytes` as a coroutine.
    ///
    /// Suspends on write readiness; returns the number of bytes written,
    /// which may be less than `bytes.len()`.
    pub fn write(&self, bytes: Vec<u8>) -> BoxCoroutine {
        Box::new(WriteCoroutine {
            socket: self.clone(),
            bytes,
            stage: IoStage::Init,
        })
    }

    /// Release the underlying stream. Best-effort: already-closed is a no-op
    /// and OS-level failures are swallowed.
    pub fn close(&self) {
        self.inner.stream.borrow_mut().take();
    }

    fn accept_raw(&self) -> Result<Socket, TaskError> {
        match &*self.inner.stream.borrow() {
            Some(Stream::Listener(listener)) => {
                let (conn, _addr) = listener.accept().map_err(TaskError::Io)?;
                Socket::from_stream(conn).map_err(TaskError::Io)
            }
            Some(Stream::Connected(_)) => Err(TaskError::NotAListener),
            None => Err(TaskError::SocketClosed),
        }
    }

    fn read_raw(&self, size: usize) -> Result<Vec<u8>, TaskError> {
        match &mut *self.inner.stream.borrow_mut() {
            Some(Stream::Connected(stream)) => {
                let mut buf = vec![0u8; size];
                match stream.read(&mut buf) {
                    Ok(n) => {
                        buf.truncate(n);
                        Ok(buf)
                    }
                    // Reported as empty bytes, indistinguishable from
                    // end-of-stream.
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
                    Err(e) => Err(TaskError::Io(e)),
                }
            }
            Some(Stream::Listener(_)) => Err(TaskError::NotAStream),
            None => Err(TaskError::SocketClosed),
        }
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<usize, TaskError> {
        match &mut *self.inner.stream.borrow_mut() {
            Some(Stream::Connected(stream)) => match stream.write(bytes) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(TaskError::Io(e)),
            },
            Some(Stream::Listener(_)) => Err(TaskError::NotAStream),
            None => Err(TaskError::SocketClosed),
        }
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("fd", &self.inner.fd)
            .field("closed", &self.inner.stream.borrow().is_none())
            .finish()
    }
}

// ============================================================================
// Socket operation coroutines
// ============================================================================

/// Shared stage machine for the two-step socket coroutines: request
/// readiness, then perform the operation, then report exhaustion.
enum IoStage {
    Init,
    Ready,
    Finished,
}

struct AcceptCoroutine {
    socket: Socket,
    stage: IoStage,
}

impl Coroutine for AcceptCoroutine {
    fn resume(&mut self, _input: Value) -> Result<Step, TaskError> {
        match self.stage {
            IoStage::Init => {
                self.stage = IoStage::Ready;
                Ok(Step::Syscall(SystemCall::wait_for_read(self.socket.clone())))
            }
            IoStage::Ready => {
                self.stage = IoStage::Finished;
                let conn = self.socket.accept_raw()?;
                Ok(Step::Return(Value::Socket(conn)))
            }
            IoStage::Finished => Ok(Step::Done),
        }
    }
}

struct ReadCoroutine {
    socket: Socket,
    size: usize,
    stage: IoStage,
}

impl Coroutine for ReadCoroutine {
    fn resume(&mut self, _input: Value) -> Result<Step, TaskError> {
        match self.stage {
            IoStage::Init => {
                self.stage = IoStage::Ready;
                Ok(Step::Syscall(SystemCall::wait_for_read(self.socket.clone())))
            }
            IoStage::Ready => {
                self.stage = IoStage::Finished;
                let bytes = self.socket.read_raw(self.size)?;
                Ok(Step::Return(Value::Bytes(bytes)))
            }
            IoStage::Finished => Ok(Step::Done),
        }
    }
}

struct WriteCoroutine {
    socket: Socket,
    bytes: Vec<u8>,
    stage: IoStage,
}

impl Coroutine for WriteCoroutine {
    fn resume(&mut self, _input: Value) -> Result<Step, TaskError> {
        match self.stage {
            IoStage::Init => {
                self.stage = IoStage::Ready;
                Ok(Step::Syscall(SystemCall::wait_for_write(
                    self.socket.clone(),
                )))
            }
            IoStage::Ready => {
                self.stage = IoStage::Finished;
                let written = std::mem::take(&mut self.bytes);
                let n = self.socket.write_raw(&written)?;
                Ok(Step::Return(Value::Int(n as i64)))
            }
            IoStage::Finished => Ok(Step::Done),
        }
    }
}
