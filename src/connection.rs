use std::{
    fs,
    io::{self, Read, Write},
    net::Shutdown,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
};

use crate::error::Error;

/// Byte stream a [`Connection`] runs over.
pub trait Transport: Read + Write {
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for UnixStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match UnixStream::shutdown(self, Shutdown::Both) {
            // the daemon hung up first
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

/// One connection to the p0f API socket.
///
/// After [`Connection::close`] every read and write fails with
/// [`io::ErrorKind::NotConnected`]; closing again is a no-op.
pub struct Connection<T = UnixStream> {
    transport: Option<T>,
    path: Option<PathBuf>,
}

impl Connection<UnixStream> {
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let setup = |source| Error::Setup {
            path: path.to_path_buf(),
            source,
        };

        // The socket may still vanish before the dial; both cases end up as
        // the same error.
        fs::metadata(path).map_err(setup)?;
        let socket = UnixStream::connect(path).map_err(setup)?;

        tracing::debug!(path = %path.display(), "connected to p0f socket");
        Ok(Connection {
            transport: Some(socket),
            path: Some(path.to_path_buf()),
        })
    }

    /// Dials the socket this connection was opened on again and drops the
    /// old stream. On failure the old stream is left as it was.
    pub fn reconnect(&mut self) -> Result<(), Error> {
        let path = self.path.clone().ok_or_else(|| {
            Error::Communication(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection was not opened from a socket path",
            ))
        })?;
        let fresh = Connection::connect(&path)?;
        if let Err(err) = self.close() {
            tracing::debug!(%err, "closing stale p0f connection failed");
        }
        *self = fresh;
        Ok(())
    }
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Connection {
            transport: Some(transport),
            path: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Socket path, when opened with [`Connection::connect`].
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.transport()?.write_all(bytes)
    }

    /// A single read; may return fewer bytes than `buf` holds.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.transport()?.read(buf)
    }

    pub fn close(&mut self) -> io::Result<()> {
        match self.transport.take() {
            Some(mut transport) => {
                tracing::debug!("closing p0f connection");
                transport.shutdown()
            }
            None => Ok(()),
        }
    }

    fn transport(&mut self) -> io::Result<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}
