//! Shared test support for the DataBag crates.
//!
//! - [`fixtures`]: throwaway bags, in memory or in a temp directory
//! - [`generators`]: proptest strategies for values, records and queries
//! - [`integration`]: a harness comparing indexed and scanned query results
//! - [`crash`]: replays of every journal prefix
//! - [`stress`]: threaded write and query load
//!
//! ```rust
//! use databag_testkit::prelude::*;
//! use databag_codec::Value;
//!
//! with_temp_docs(|bag| {
//!     bag.set("a", &Value::map([("x", 1)])).unwrap();
//!     assert_eq!(bag.len(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Everything, for `use databag_testkit::prelude::*`.
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
    pub use crate::init_tracing;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`. Output goes
/// through the test writer so it is captured per test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another subscriber may already be installed by the host binary
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
