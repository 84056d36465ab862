//! Client for the p0f passive fingerprinting API.
//!
//! p0f answers questions about hosts it has seen on its unix API socket
//! (started with `p0f -s <path>`). [`P0f`] sends one fixed-size query per
//! address and returns the decoded [`Response`].
//!
//! ```no_run
//! let p0f = p0f_client::P0f::new("/var/run/p0f.sock")?;
//! let response = p0f.query_str("192.0.2.7")?;
//! if response.is_match() {
//!     println!("{response}");
//! }
//! # Ok::<(), p0f_client::Error>(())
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod response;

pub use client::P0f;
pub use codec::{AddressFamily, Query};
pub use connection::{Connection, Transport};
pub use error::{Error, ProtocolError};
pub use response::{BadSw, OsMatchQuality, Response, Status};
