use std::{
    io::{self, ErrorKind},
    net::IpAddr,
    os::unix::net::UnixStream,
    path::Path,
};

use parking_lot::Mutex;

use crate::{
    codec::{self, Query, RESPONSE_MAGIC, RESPONSE_SIZE},
    connection::{Connection, Transport},
    error::{Error, ProtocolError},
    response::{Response, Status},
};

/// A p0f API client.
///
/// The protocol has no request identifiers, so a reply can only be matched to
/// its query by order. The connection lock is therefore held from the write
/// until the whole reply has been read, which makes the client safe to share
/// between threads.
///
/// Nothing is retried. On [`Error::Communication`] the caller decides whether
/// to [`reconnect`](P0f::reconnect) and try again.
pub struct P0f<T = UnixStream> {
    connection: Mutex<Connection<T>>,
}

impl P0f<UnixStream> {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(P0f::from_connection(Connection::connect(path)?))
    }

    /// Replaces the connection with a fresh one to the same socket path,
    /// waiting for any in-flight query first.
    pub fn reconnect(&self) -> Result<(), Error> {
        self.connection.lock().reconnect()
    }
}

impl<T: Transport> P0f<T> {
    pub fn from_transport(transport: T) -> Self {
        P0f::from_connection(Connection::new(transport))
    }

    pub fn from_connection(connection: Connection<T>) -> Self {
        P0f {
            connection: Mutex::new(connection),
        }
    }

    /// Asks p0f what it knows about `address`.
    ///
    /// A returned response may still have [`Status::NoMatch`].
    pub fn query<A: Into<IpAddr>>(&self, address: A) -> Result<Response, Error> {
        self.exchange(Query::new(address))
    }

    pub fn query_str(&self, address: &str) -> Result<Response, Error> {
        self.exchange(address.parse()?)
    }

    pub fn query_octets(&self, octets: &[u8]) -> Result<Response, Error> {
        self.exchange(Query::from_octets(octets)?)
    }

    /// Closes the connection once any in-flight query has finished.
    pub fn close(&self) -> Result<(), Error> {
        self.connection.lock().close().map_err(Error::Communication)
    }

    fn exchange(&self, query: Query) -> Result<Response, Error> {
        let request = codec::encode_query(&query);
        let mut buf = [0; RESPONSE_SIZE];

        let read = {
            let mut connection = self.connection.lock();
            connection.write(&request).map_err(Error::Communication)?;
            read_response(&mut connection, &mut buf).map_err(Error::Communication)?
        };

        let response = codec::decode_response(&buf[..read])?;
        if response.magic != RESPONSE_MAGIC {
            return Err(ProtocolError::BadMagic(response.magic).into());
        }

        tracing::debug!(address = %query.ip(), status = ?response.status, "p0f replied");
        match response.status {
            Status::Ok | Status::NoMatch => Ok(response),
            Status::BadQuery => Err(Error::BadQuery),
            Status::Unknown(code) => Err(ProtocolError::UnknownStatus(code).into()),
        }
    }
}

/// Reads until `buf` is full or the daemon closes the stream. A stream closed
/// before any byte arrived is an I/O error; a partial reply is left for the
/// decoder to reject.
fn read_response<T: Transport>(connection: &mut Connection<T>, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match connection.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
