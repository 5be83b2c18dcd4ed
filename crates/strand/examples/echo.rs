//! TCP echo server on a single-threaded cooperative scheduler.
//!
//! Run with `cargo run --example echo`, then connect with e.g.
//! `nc 127.0.0.1 8000`. Every connection gets its own task; all of them are
//! multiplexed over one thread by the I/O poll task.

use strand::{Coroutine, Scheduler, Socket, Step, SystemCall, TaskError, Value};
use tracing::info;

/// Accept connections forever, spawning an [`EchoConn`] task for each.
struct AcceptLoop {
    server: Socket,
    accepted: bool,
}

impl Coroutine for AcceptLoop {
    fn resume(&mut self, input: Value) -> Result<Step, TaskError> {
        if self.accepted {
            self.accepted = false;
            let conn = input
                .into_socket()
                .ok_or_else(|| TaskError::other("accept did not produce a socket"))?;
            info!("connection accepted");
            Ok(Step::Syscall(SystemCall::new_task(Box::new(EchoConn {
                conn,
                reading: false,
            }))))
        } else {
            self.accepted = true;
            Ok(Step::Delegate(self.server.accept()))
        }
    }
}

/// Echo everything a connection sends until the peer hangs up.
struct EchoConn {
    conn: Socket,
    reading: bool,
}

impl Coroutine for EchoConn {
    fn resume(&mut self, input: Value) -> Result<Step, TaskError> {
        if self.reading {
            self.reading = false;
            let bytes = input
                .into_bytes()
                .ok_or_else(|| TaskError::other("read did not produce bytes"))?;
            if bytes.is_empty() {
                info!("peer disconnected");
                self.conn.close();
                return Ok(Step::Done);
            }
            Ok(Step::Delegate(self.conn.write(bytes)))
        } else {
            self.reading = true;
            Ok(Step::Delegate(self.conn.read(1024)))
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let server = Socket::listen("127.0.0.1:8000")?;
    info!("echo server listening on {}", server.local_addr()?);

    let mut scheduler = Scheduler::new().with_io_poll();
    scheduler.new_task(Box::new(AcceptLoop {
        server,
        accepted: false,
    }));
    scheduler.run()?;
    Ok(())
}
