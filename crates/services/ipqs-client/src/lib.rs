//! Reputation lookups for IP addresses and hostnames.
//!
//! A [`Client`] asks a reputation backend whether a key is known-bad, clean or
//! unclassified and keeps the answer in a TTL cache so repeated lookups of the
//! same key skip the network.
//!
//! ```no_run
//! use ipqs_client::{Client, LookupError, LookupOptions};
//! use std::time::Duration;
//!
//! # async fn screen() -> Result<(), ipqs_client::ProvisionError> {
//! let mut client = Client::default()
//!     .with_ttl(Duration::from_secs(3600))
//!     .with_proxy("socks5://127.0.0.1:1080");
//! client.provision()?;
//!
//! let opts = LookupOptions::new().with_timeout(Duration::from_secs(2));
//! match client.lookup("1.1.1.1", "screening/1.0", opts).await {
//!     Ok(()) => println!("clean"),
//!     Err(LookupError::BadReputation) => println!("flagged"),
//!     Err(e) => println!("undecided: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod verdict;

pub use backend::{HttpBackend, ReputationBackend, TransportError};
pub use cache::{CacheEntry, VerdictCache};
pub use client::{spawn_cache_cleanup_task, Client, LookupOptions};
pub use config::{ClientConfig, DEFAULT_ENDPOINT, FALLBACK_TTL};
pub use error::{LookupError, ProvisionError, ProxyError};
pub use proxy::{configure_proxy, DialStrategy, SUPPORTED_PROTOCOLS};
pub use verdict::Verdict;
