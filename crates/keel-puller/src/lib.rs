//! keel-puller — pulling container images with streamed progress.
//!
//! A [`Puller`] materializes an image and writes line-delimited JSON
//! progress records ([`JsonMessage`]) to a caller-supplied sink.
//! [`RetryPuller`] decorates any puller with bounded retries, exponential
//! backoff, and an overall deadline.
//!
//! # Architecture
//!
//! ```text
//! RetryPuller
//!   ├── wait (initial_wait, doubling) raced against the deadline
//!   ├── inner Puller (FakePuller, PullerFn, registry client, ...)
//!   └── retry notices written to the same progress sink
//! ```
//!
//! Every error from the inner puller is retried: a tag that was pushed a
//! moment ago and is not visible yet looks the same as any other failure.

pub mod error;
pub mod message;
pub mod puller;
pub mod retry;

pub use error::{PullError, PullResult};
pub use message::{JsonMessage, ProgressDetail, read_messages, write_message};
pub use puller::{FakePuller, Puller, PullerFn};
pub use retry::RetryPuller;
