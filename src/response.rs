use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

pub const STATUS_BADQUERY: u32 = 0x00;
pub const STATUS_OK: u32 = 0x10;
pub const STATUS_NOMATCH: u32 = 0x20;

const MATCH_NORMAL: u8 = 0x00;
const MATCH_FUZZY: u8 = 0x01;
const MATCH_GENERIC: u8 = 0x02;
const MATCH_FUZZY_GENERIC: u8 = 0x03;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    BadQuery,
    Ok,
    NoMatch,
    Unknown(u32),
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        match code {
            STATUS_BADQUERY => Status::BadQuery,
            STATUS_OK => Status::Ok,
            STATUS_NOMATCH => Status::NoMatch,
            other => Status::Unknown(other),
        }
    }
}

impl Status {
    pub fn code(self) -> u32 {
        match self {
            Status::BadQuery => STATUS_BADQUERY,
            Status::Ok => STATUS_OK,
            Status::NoMatch => STATUS_NOMATCH,
            Status::Unknown(code) => code,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OsMatchQuality {
    Normal,
    Fuzzy,
    Generic,
    FuzzyGeneric,
    Unknown(u8),
}

impl From<u8> for OsMatchQuality {
    fn from(tag: u8) -> Self {
        match tag {
            MATCH_NORMAL => OsMatchQuality::Normal,
            MATCH_FUZZY => OsMatchQuality::Fuzzy,
            MATCH_GENERIC => OsMatchQuality::Generic,
            MATCH_FUZZY_GENERIC => OsMatchQuality::FuzzyGeneric,
            other => OsMatchQuality::Unknown(other),
        }
    }
}

impl OsMatchQuality {
    pub fn tag(self) -> u8 {
        match self {
            OsMatchQuality::Normal => MATCH_NORMAL,
            OsMatchQuality::Fuzzy => MATCH_FUZZY,
            OsMatchQuality::Generic => MATCH_GENERIC,
            OsMatchQuality::FuzzyGeneric => MATCH_FUZZY_GENERIC,
            OsMatchQuality::Unknown(tag) => tag,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BadSw {
    OsDifference,
    OutrightMismatch,
    Unknown(u8),
}

/// A decoded p0f reply.
///
/// The numeric fields are kept exactly as the daemon sent them; the accessor
/// methods interpret them. Check [`Response::status`] before trusting any of
/// the fingerprint fields: a `NoMatch` reply is a successful query too.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
    pub magic: u32,
    pub status: Status,
    pub first_seen: u32,
    pub last_seen: u32,
    pub total_count: u32,
    pub uptime_minutes: u32,
    pub up_mod_days: u32,
    pub last_nat: u32,
    pub last_chg: u32,
    pub distance: i16,
    pub bad_sw: u8,
    pub match_quality: OsMatchQuality,
    pub os_name: String,
    pub os_flavor: String,
    pub http_name: String,
    pub http_flavor: String,
    pub link_type: String,
    pub language: String,
}

impl Response {
    pub fn is_match(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn first_seen_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.first_seen), 0)
    }

    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.last_seen), 0)
    }

    /// Last time a NAT or load balancer was detected, if ever.
    pub fn last_nat_at(&self) -> Option<DateTime<Utc>> {
        nonzero_timestamp(self.last_nat)
    }

    /// Last time the OS signature changed, if ever.
    pub fn last_change_at(&self) -> Option<DateTime<Utc>> {
        nonzero_timestamp(self.last_chg)
    }

    /// `None` when p0f could not estimate uptime.
    pub fn uptime(&self) -> Option<Duration> {
        match self.uptime_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }

    /// Wrap-around interval of the uptime clock.
    pub fn uptime_modulo(&self) -> Duration {
        Duration::from_secs(u64::from(self.up_mod_days) * 86400)
    }

    pub fn hops(&self) -> Option<u16> {
        u16::try_from(self.distance).ok()
    }

    pub fn bad_software(&self) -> Option<BadSw> {
        match self.bad_sw {
            0 => None,
            1 => Some(BadSw::OsDifference),
            2 => Some(BadSw::OutrightMismatch),
            other => Some(BadSw::Unknown(other)),
        }
    }
}

fn nonzero_timestamp(secs: u32) -> Option<DateTime<Utc>> {
    match secs {
        0 => None,
        secs => DateTime::from_timestamp(i64::from(secs), 0),
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.os_name)?;
        if !self.os_flavor.is_empty() {
            write!(f, " {}", self.os_flavor)?;
        }
        match self.match_quality {
            OsMatchQuality::Fuzzy => f.write_str(" (fuzzy)"),
            _ => f.write_str(" (generic)"),
        }
    }
}
