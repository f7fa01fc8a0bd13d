//! Transport adapter: a uniform duplex channel over a spawned server
//! process' stdio pipes, a TCP socket, or (in tests) an in-memory pipe.
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::process::{Child, Command};

use crate::error::SessionError;

/// How to launch a language server under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Executable command name.
    pub command: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Root URI of the workspace advertised at initialize.
    pub root_uri: Option<String>,
}

/// Boxed read half of a transport.
pub type TransportReader = Box<dyn AsyncBufRead + Send + Unpin>;
/// Boxed write half of a transport.
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected duplex channel to a language server.
///
/// When the transport owns a spawned child process, the session that takes
/// the transport also takes responsibility for terminating and reaping it
/// on every exit path.
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,
    child: Option<Child>,
}

impl Transport {
    /// Wrap an arbitrary duplex pair. Used for socket and in-memory channels.
    pub fn from_parts(reader: TransportReader, writer: TransportWriter) -> Self {
        Self {
            reader,
            writer,
            child: None,
        }
    }

    /// Spawn a server process and connect over its stdio pipes.
    pub fn spawn(config: &ServerConfig) -> Result<Self, SessionError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {}", config.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("could not capture stdout".into()))?;

        Ok(Self {
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }

    /// Connect to a server listening on a TCP socket.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: Box::new(BufReader::new(read_half)),
            writer: Box::new(write_half),
            child: None,
        })
    }

    /// Split into the pieces the session engine owns.
    pub fn into_parts(self) -> (TransportReader, TransportWriter, Option<Child>) {
        (self.reader, self.writer, self.child)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("has_child", &self.child.is_some())
            .finish()
    }
}
