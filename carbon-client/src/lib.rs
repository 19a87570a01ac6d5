//! A client for sending data points to a [Graphite][graphite] carbon server.
//!
//! [graphite]: https://graphite.readthedocs.io/
//!
//! Data points are sent over TCP using the carbon plaintext protocol, where each data point is a
//! single line:
//!
//! ```text
//! <group>.<host>.<metric> <value> <timestamp>\n
//! ```
//!
//! Lines are lowercased before they are sent, the value is written with six fractional digits and
//! the timestamp is in whole seconds since the Unix epoch. The protocol has no handshake and no
//! acknowledgements: the server simply consumes a stream of lines.
//!
//! # Usage
//!
//! For one-off updates, [`update`] and [`bulk_update`] take care of the whole session:
//!
//! ```no_run
//! # use carbon_client::{update, bulk_update, CarbonBuilder, Point};
//! # fn main() -> Result<(), carbon_client::Error> {
//! let builder = CarbonBuilder::new().with_server("carbon.example.com").with_port(2003);
//!
//! // Sends `production.myserver.df_root 53.000000 <now>`.
//! update(
//!     builder.clone(),
//!     Point::new("df_root").with_group("production").with_host("myserver").with_value(53),
//! )?;
//!
//! // Sends every entry, at most 500 per payload.
//! let data = [("load.1m", 0.42), ("load.5m", 0.38), ("load.15m", 0.31)];
//! bulk_update(builder, Some("production"), None, data)?;
//! # Ok(())
//! # }
//! ```
//!
//! For anything else, build a [`CarbonClient`] and drive it directly:
//!
//! ```no_run
//! # use carbon_client::{CarbonBuilder, Point};
//! # fn main() -> Result<(), carbon_client::Error> {
//! let mut client = CarbonBuilder::new().with_server("carbon.example.com").build()?;
//!
//! client.append(Point::new("requests").with_value(1200))?;
//! client.append(Point::new("errors").with_value(3))?;
//!
//! // Connects, then writes both data points as a single payload.
//! client.submit()?;
//! client.disconnect()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Defaults
//!
//! A data point only needs a metric name and a value:
//!
//! - without a host, or with a host of `localhost`, the name of the local host is used
//! - a fully-qualified host name is cut down to its first label, unless it starts with a digit, in
//!   which case it is assumed to be an IP address and left alone
//! - without a group, `systems.<first character of the host>` is used
//! - without a timestamp, the current time is used
//!
//! # Failure handling
//!
//! Nothing is retried. Connection and write failures are returned as [`Error::Connection`], and
//! pending data points stay buffered so that the caller can decide whether to try again.
//! [`bulk_update`] is the exception: it discards whatever it had not written yet before returning
//! the error.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::CarbonBuilder;

mod client;
pub use self::client::{Batch, CarbonClient, ConnectionState};

mod error;
pub use self::error::Error;

pub mod host;

mod ops;
pub use self::ops::{bulk_update, update};

mod point;
pub use self::point::{DataPoint, Point, Timestamp, Value};

mod stats;
pub use self::stats::SessionStats;

mod writer;
