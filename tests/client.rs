use std::{
    io::{self, Read, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    os::unix::net::UnixListener,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use p0f_client::{
    codec::{self, REQUEST_SIZE, RESPONSE_MAGIC},
    AddressFamily, Error, OsMatchQuality, P0f, ProtocolError, Query, Response, Status,
    Transport,
};

fn reply(status: Status) -> Response {
    Response {
        magic: RESPONSE_MAGIC,
        status,
        first_seen: 1_700_000_000,
        last_seen: 1_700_000_100,
        total_count: 2,
        uptime_minutes: 0,
        up_mod_days: 0,
        last_nat: 0,
        last_chg: 0,
        distance: 6,
        bad_sw: 0,
        match_quality: OsMatchQuality::Normal,
        os_name: "Windows".into(),
        os_flavor: "7 or 8".into(),
        http_name: String::new(),
        http_flavor: String::new(),
        link_type: "Ethernet or modem".into(),
        language: String::new(),
    }
}

/// Scripted daemon: answers every query with `answer(query)`, then hangs up.
struct Script {
    answer: Box<dyn FnMut(&Query) -> Vec<u8> + Send>,
    chunk: usize,
    pending: Vec<u8>,
    request: Vec<u8>,
}

impl Script {
    fn new(answer: impl FnMut(&Query) -> Vec<u8> + Send + 'static) -> Self {
        Script {
            answer: Box::new(answer),
            chunk: usize::MAX,
            pending: Vec::new(),
            request: Vec::new(),
        }
    }

    fn replying(response: Response) -> Self {
        Script::new(move |_| codec::encode_response(&response).to_vec())
    }

    fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}

impl Write for Script {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.request.extend_from_slice(buf);
        if self.request.len() >= REQUEST_SIZE {
            let query = codec::decode_query(&self.request)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            self.request.clear();
            self.pending = (self.answer)(&query);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Script {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Transport for Script {}

#[test]
fn no_match_is_not_an_error() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::NoMatch)));
    let response = p0f.query(Ipv4Addr::LOCALHOST).unwrap();
    assert_eq!(response.status, Status::NoMatch);
    assert!(!response.is_match());
}

#[test]
fn ok_returns_fingerprint() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::Ok)));
    let response = p0f.query_str("198.51.100.4").unwrap();
    assert_eq!(response, reply(Status::Ok));
    assert_eq!(response.to_string(), "Windows 7 or 8 (generic)");
}

#[test]
fn bad_query() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::BadQuery)));
    assert!(matches!(p0f.query(Ipv4Addr::LOCALHOST), Err(Error::BadQuery)));
}

#[test]
fn unknown_status() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::Unknown(0x11))));
    assert!(matches!(
        p0f.query(Ipv4Addr::LOCALHOST),
        Err(Error::Protocol(ProtocolError::UnknownStatus(0x11)))
    ));
}

#[test]
fn bad_magic_wins_over_status() {
    for status in [Status::Ok, Status::NoMatch, Status::BadQuery, Status::Unknown(7)] {
        let response = Response {
            magic: 0x50304601,
            ..reply(status)
        };
        let p0f = P0f::from_transport(Script::replying(response));
        assert!(matches!(
            p0f.query(Ipv4Addr::LOCALHOST),
            Err(Error::Protocol(ProtocolError::BadMagic(0x50304601)))
        ));
    }
}

#[test]
fn split_reads_are_joined() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::Ok)).chunked(10));
    assert_eq!(p0f.query(Ipv4Addr::LOCALHOST).unwrap(), reply(Status::Ok));
}

#[test]
fn short_reply_is_protocol_error() {
    let p0f = P0f::from_transport(Script::new(|_| {
        codec::encode_response(&reply(Status::Ok))[..100].to_vec()
    }));
    match p0f.query(Ipv4Addr::LOCALHOST) {
        Err(Error::Protocol(ProtocolError::Truncated { got, .. })) => assert_eq!(got, 100),
        other => panic!("expected truncated response, got {other:?}"),
    }
}

#[test]
fn sends_the_right_address() {
    let p0f = P0f::from_transport(Script::new(|query| {
        let status = match (query.family, query.ip()) {
            (AddressFamily::V6, IpAddr::V6(ip)) if ip == Ipv6Addr::LOCALHOST => Status::Ok,
            _ => Status::BadQuery,
        };
        codec::encode_response(&reply(status)).to_vec()
    }));
    assert!(p0f.query_str("::1").unwrap().is_match());
    assert!(matches!(p0f.query_str("127.0.0.1"), Err(Error::BadQuery)));
}

#[test]
fn invalid_address_fails_before_io() {
    let p0f = P0f::from_transport(Script::new(|_| panic!("nothing should be sent")));
    assert!(matches!(p0f.query_str("localhost"), Err(Error::InvalidAddress(_))));
    assert!(matches!(p0f.query_octets(&[1; 5]), Err(Error::InvalidAddress(_))));
}

struct Broken;

impl Read for Broken {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::ConnectionReset.into())
    }
}

impl Write for Broken {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Broken {}

#[test]
fn io_failures_are_communication_errors() {
    let err = P0f::from_transport(Broken).query(Ipv4Addr::LOCALHOST).unwrap_err();
    assert!(err.is_communication());
    assert!(!Error::BadQuery.is_communication());
}

struct HungUp;

impl Read for HungUp {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Write for HungUp {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for HungUp {}

#[test]
fn hang_up_before_reply_is_communication_error() {
    match P0f::from_transport(HungUp).query(Ipv4Addr::LOCALHOST) {
        Err(Error::Communication(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected communication error, got {other:?}"),
    }
}

#[test]
fn query_after_close() {
    let p0f = P0f::from_transport(Script::replying(reply(Status::Ok)));
    p0f.close().unwrap();
    p0f.close().unwrap();
    match p0f.query(Ipv4Addr::LOCALHOST) {
        Err(Error::Communication(err)) => assert_eq!(err.kind(), io::ErrorKind::NotConnected),
        other => panic!("expected communication error, got {other:?}"),
    }
}

/// Fails the test if a write arrives before the previous reply was fully read.
struct Serialized {
    in_flight: Arc<AtomicBool>,
    exchanges: Arc<AtomicUsize>,
    overlap: Arc<AtomicBool>,
    pending: Vec<u8>,
}

impl Write for Serialized {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(1));
        self.pending = codec::encode_response(&reply(Status::Ok)).to_vec();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Serialized {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // hand the reply out in two pieces to widen the window
        let n = buf.len().min(self.pending.len()).min(RESPONSE_HALF);
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        if self.pending.is_empty() {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            self.in_flight.store(false, Ordering::SeqCst);
        } else {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(n)
    }
}

const RESPONSE_HALF: usize = codec::RESPONSE_SIZE / 2;

impl Transport for Serialized {}

#[test]
fn concurrent_queries_never_interleave() {
    let exchanges = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));
    let p0f = Arc::new(P0f::from_transport(Serialized {
        in_flight: Arc::new(AtomicBool::new(false)),
        exchanges: exchanges.clone(),
        overlap: overlap.clone(),
        pending: Vec::new(),
    }));

    let workers: Vec<_> = (0..8u8)
        .map(|i| {
            let p0f = p0f.clone();
            thread::spawn(move || {
                for j in 0..5u8 {
                    p0f.query(Ipv4Addr::new(10, 0, i, j)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(!overlap.load(Ordering::SeqCst));
    assert_eq!(exchanges.load(Ordering::SeqCst), 40);
}

#[test]
fn talks_to_a_unix_socket_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p0f.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0; REQUEST_SIZE];
        for _ in 0..2 {
            stream.read_exact(&mut request).unwrap();
            let query = codec::decode_query(&request).unwrap();
            let status = match query.family {
                AddressFamily::V4 => Status::Ok,
                AddressFamily::V6 => Status::NoMatch,
            };
            stream
                .write_all(&codec::encode_response(&reply(status)))
                .unwrap();
        }
    });

    let p0f = P0f::new(&path).unwrap();
    assert!(p0f.query_str("127.0.0.1").unwrap().is_match());
    assert_eq!(p0f.query_str("::1").unwrap().status, Status::NoMatch);
    daemon.join().unwrap();

    // the daemon is gone, the next exchange cannot complete
    let err = p0f.query_str("127.0.0.1").unwrap_err();
    assert!(matches!(err, Error::Communication(_)), "got {err:?}");
    p0f.close().unwrap();
}

#[test]
fn reconnects_after_daemon_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p0f.sock");
    let listener = UnixListener::bind(&path).unwrap();

    // answers one query per accepted connection
    let daemon = thread::spawn(move || {
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0; REQUEST_SIZE];
            stream.read_exact(&mut request).unwrap();
            stream
                .write_all(&codec::encode_response(&reply(Status::Ok)))
                .unwrap();
        }
    });

    let p0f = P0f::new(&path).unwrap();
    assert!(p0f.query_str("127.0.0.1").unwrap().is_match());

    let err = p0f.query_str("127.0.0.1").unwrap_err();
    assert!(err.is_communication(), "got {err:?}");

    p0f.reconnect().unwrap();
    assert!(p0f.query_str("127.0.0.1").unwrap().is_match());
    daemon.join().unwrap();
}


#[test]
fn connect_errors() {
    assert!(matches!(
        P0f::new("/nonexistent/p0f.sock"),
        Err(Error::Setup { .. })
    ));
}
