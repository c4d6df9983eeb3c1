//! Dataset pipeline.
//!
//! Ties the stages together for one dataset:
//!
//! 1. **Production**: the [`SampleProducer`](crate::sample::SampleProducer)
//!    evaluates and converts each sample number in order
//! 2. **Persistence**: every bundle is written to the
//!    [`ArtifactStore`](crate::storage::ArtifactStore) as soon as it arrives
//! 3. **Routing** (optional): configured autorouters run against each
//!    persisted sample
//!
//! Sample failures are fatal to the dataset; routing failures are not.
//!
//! # Example
//!
//! ```rust,ignore
//! use circuit_forge::pipeline::{CancelFlag, DatasetRunner};
//! use circuit_forge::sample::SampleRange;
//!
//! let runner = DatasetRunner::new(producer, store).with_concurrency(4);
//! let range = SampleRange::parse("1", "3")?;
//! let report = runner.run("dataset-1", &template, range, &CancelFlag::new()).await?;
//!
//! println!("{} samples ({})", report.samples_completed, report.status);
//! ```

pub mod dataset;

pub use dataset::{CancelFlag, DatasetReport, DatasetRunner, DatasetStatus};
