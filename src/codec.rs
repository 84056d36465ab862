//! Byte layouts of the p0f API.
//!
//! Every message has a fixed size and all integers are little endian:
//!
//! ```text
//! query (21 bytes)
//!   magic u32 | addr_type u8 | addr [u8; 16]
//!
//! response (232 bytes)
//!   magic u32 | status u32 | first_seen u32 | last_seen u32 | total_conn u32
//!   uptime_min u32 | up_mod_days u32 | last_nat u32 | last_chg u32
//!   distance i16 | bad_sw u8 | os_match_q u8
//!   os_name | os_flavor | http_name | http_flavor | link_type | language   ([u8; 32] each)
//! ```
//!
//! Decoding is purely mechanical: magic and status are returned as read and
//! left for the caller to validate.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use crate::{
    error::{Error, ProtocolError},
    response::{OsMatchQuality, Response, Status},
};

pub const REQUEST_MAGIC: u32 = 0x50304601;
pub const RESPONSE_MAGIC: u32 = 0x50304602;

pub const REQUEST_SIZE: usize = 21;
pub const RESPONSE_SIZE: usize = 232;

const ADDR_SIZE: usize = 16;
const STR_MAX: usize = 31;
const STR_SIZE: usize = STR_MAX + 1;

pub const ADDRESS_IPV4: u8 = 0x04;
pub const ADDRESS_IPV6: u8 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn tag(self) -> u8 {
        match self {
            AddressFamily::V4 => ADDRESS_IPV4,
            AddressFamily::V6 => ADDRESS_IPV6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            ADDRESS_IPV4 => Some(AddressFamily::V4),
            ADDRESS_IPV6 => Some(AddressFamily::V6),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Query {
    pub magic: u32,
    pub family: AddressFamily,
    /// IPv4 addresses occupy the first four bytes, the rest is zero.
    pub address: [u8; ADDR_SIZE],
}

impl Query {
    /// IPv4-mapped IPv6 addresses are sent as plain IPv4, since that is how
    /// p0f records them.
    pub fn new<T: Into<IpAddr>>(address: T) -> Self {
        let mut bytes = [0; ADDR_SIZE];
        let v4 = match address.into() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => Some(v4),
                None => {
                    bytes.copy_from_slice(&v6.octets());
                    None
                }
            },
        };

        let family = match v4 {
            Some(v4) => {
                bytes[..4].copy_from_slice(&v4.octets());
                AddressFamily::V4
            }
            None => AddressFamily::V6,
        };

        Query {
            magic: REQUEST_MAGIC,
            family,
            address: bytes,
        }
    }

    /// Builds a query from raw address bytes, which must be 4 or 16 long.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        if let Ok(v4) = <[u8; 4]>::try_from(octets) {
            return Ok(Query::new(Ipv4Addr::from(v4)));
        }
        if let Ok(v6) = <[u8; ADDR_SIZE]>::try_from(octets) {
            return Ok(Query::new(Ipv6Addr::from(v6)));
        }
        Err(Error::InvalidAddress(format!(
            "{} address bytes, expected 4 or 16",
            octets.len()
        )))
    }

    pub fn ip(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => {
                let mut v4 = [0; 4];
                v4.copy_from_slice(&self.address[..4]);
                IpAddr::V4(Ipv4Addr::from(v4))
            }
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.address)),
        }
    }
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(Query::new)
            .map_err(|_| Error::InvalidAddress(s.to_string()))
    }
}

pub fn encode_query(query: &Query) -> [u8; REQUEST_SIZE] {
    let mut buf = [0; REQUEST_SIZE];
    buf[..4].copy_from_slice(&query.magic.to_le_bytes());
    buf[4] = query.family.tag();
    buf[5..].copy_from_slice(&query.address);
    buf
}

pub fn decode_query(bytes: &[u8]) -> Result<Query, ProtocolError> {
    if bytes.len() < REQUEST_SIZE {
        return Err(ProtocolError::Truncated {
            what: "query",
            expected: REQUEST_SIZE,
            got: bytes.len(),
        });
    }

    let mut reader = BufferReader::new(bytes);
    let magic = u32::from_le_bytes(reader.read_array("magic")?);
    let [tag] = reader.read_array::<1>("addr_type")?;
    let family = AddressFamily::from_tag(tag).ok_or(ProtocolError::UnknownAddressType(tag))?;
    let address = reader.read_array("addr")?;

    Ok(Query {
        magic,
        family,
        address,
    })
}

/// Decodes a response without validating its magic or status.
pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    if bytes.len() < RESPONSE_SIZE {
        return Err(ProtocolError::Truncated {
            what: "response",
            expected: RESPONSE_SIZE,
            got: bytes.len(),
        });
    }

    let mut reader = BufferReader::new(bytes);
    Ok(Response {
        magic: reader.read_u32("magic")?,
        status: Status::from(reader.read_u32("status")?),
        first_seen: reader.read_u32("first_seen")?,
        last_seen: reader.read_u32("last_seen")?,
        total_count: reader.read_u32("total_conn")?,
        uptime_minutes: reader.read_u32("uptime_min")?,
        up_mod_days: reader.read_u32("up_mod_days")?,
        last_nat: reader.read_u32("last_nat")?,
        last_chg: reader.read_u32("last_chg")?,
        distance: i16::from_le_bytes(reader.read_array("distance")?),
        bad_sw: u8::from_le_bytes(reader.read_array("bad_sw")?),
        match_quality: OsMatchQuality::from(u8::from_le_bytes(reader.read_array("os_match_q")?)),
        os_name: reader.read_str("os_name")?,
        os_flavor: reader.read_str("os_flavor")?,
        http_name: reader.read_str("http_name")?,
        http_flavor: reader.read_str("http_flavor")?,
        link_type: reader.read_str("link_type")?,
        language: reader.read_str("language")?,
    })
}

/// Encodes a response the way the daemon does. Strings longer than 31 bytes
/// are cut so that every field keeps its terminating null.
pub fn encode_response(response: &Response) -> [u8; RESPONSE_SIZE] {
    let mut writer = BufferWriter::new();
    writer.put(&response.magic.to_le_bytes());
    writer.put(&response.status.code().to_le_bytes());
    for counter in [
        response.first_seen,
        response.last_seen,
        response.total_count,
        response.uptime_minutes,
        response.up_mod_days,
        response.last_nat,
        response.last_chg,
    ] {
        writer.put(&counter.to_le_bytes());
    }
    writer.put(&response.distance.to_le_bytes());
    writer.put(&[response.bad_sw, response.match_quality.tag()]);
    for text in [
        &response.os_name,
        &response.os_flavor,
        &response.http_name,
        &response.http_flavor,
        &response.link_type,
        &response.language,
    ] {
        writer.put_str(text);
    }
    writer.buffer
}

struct BufferReader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        BufferReader { buffer, pos: 0 }
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], ProtocolError> {
        let end = self.pos + N;
        let slice = self
            .buffer
            .get(self.pos..end)
            .ok_or(ProtocolError::MissingData(field))?;
        let mut array = [0; N];
        array.copy_from_slice(slice);
        self.pos = end;
        Ok(array)
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.read_array(field).map(u32::from_le_bytes)
    }

    /// Reads a null-padded string field, stopping at the first null byte.
    fn read_str(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let raw: [u8; STR_SIZE] = self.read_array(field)?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(STR_SIZE);
        Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
    }
}

struct BufferWriter {
    buffer: [u8; RESPONSE_SIZE],
    pos: usize,
}

impl BufferWriter {
    fn new() -> Self {
        BufferWriter {
            buffer: [0; RESPONSE_SIZE],
            pos: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buffer[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_str(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let len = bytes.len().min(STR_MAX);
        self.buffer[self.pos..self.pos + len].copy_from_slice(&bytes[..len]);
        self.pos += STR_SIZE;
    }
}
