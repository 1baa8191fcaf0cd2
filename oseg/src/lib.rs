//! Object segmentation: which server hosts each object.
//!
//! The [`ObjectSegmentation`] combines the CRAQ client pool, a location
//! cache and per-object migration bookkeeping. The rest of the space
//! server asks it where objects live, tells it which objects it hosts, and
//! relays migration acknowledgments between servers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use location_cache::{BoundingBox, CoordinateSegmentation};
//! use oseg::{AckSender, Config, MigrateAck, NoopListener, ObjectSegmentation};
//! use protocol_craq::{ObjectId, ServerId};
//!
//! struct Regions;
//!
//! impl CoordinateSegmentation for Regions {
//!     fn server_region(&self, _server: ServerId) -> Vec<BoundingBox> {
//!         Vec::new()
//!     }
//! }
//!
//! struct Router;
//!
//! impl AckSender for Router {
//!     fn send_ack(&self, _ack: MigrateAck) -> Result<(), MigrateAck> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), oseg::OsegError> {
//! let config = Config::load("oseg.toml".as_ref())?;
//! oseg::logging::init(&config.logging);
//!
//! let oseg = ObjectSegmentation::start(
//!     &config,
//!     Arc::new(Regions),
//!     Arc::new(NoopListener),
//!     Arc::new(Router),
//! )?;
//! let entry = oseg.resolve(ObjectId::from_u128(7)).await?;
//! println!("hosted by server {}", entry.server());
//! oseg.stop();
//! # Ok(())
//! # }
//! ```

mod backend;
mod cache;
mod config;
mod error;
mod listener;
pub mod logging;
pub mod metrics;
mod segmentation;
mod trace;

pub use backend::Backend;
pub use cache::build_cache;
pub use config::{
    CacheConfig, CachePolicy, Config, ConfigError, LogFormat, LoggingConfig, SegmentationConfig,
    TieBreakPolicy,
};
pub use error::OsegError;
pub use listener::{AckSender, Listener, LocationUpdate, MigrateAck, NoopListener};
pub use segmentation::{Lookup, ObjectSegmentation};
