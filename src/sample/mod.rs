//! Sample production.
//!
//! A [`SampleProducer`] evaluates a template across a [`SampleRange`] and
//! converts every result into a [`SampleBundle`]. Bundles are yielded one at
//! a time in sample-number order so callers can persist incrementally.
//!
//! # Failure policy
//!
//! Any evaluation failure, or a conversion failure that blocks a required
//! artifact, ends the stream with an error: a dataset is only usable when
//! every sample renders. A failed preview only degrades the sample.

pub mod bundle;
pub mod producer;
pub mod range;

pub use bundle::{
    SampleBundle, UNROUTED_BOARD_FILE, UNROUTED_CIRCUIT_FILE, UNROUTED_PREVIEW_FILE,
    UNROUTED_SIMPLE_ROUTE_FILE,
};
pub use producer::SampleProducer;
pub use range::SampleRange;
