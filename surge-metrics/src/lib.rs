pub mod error;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod snapshot;
pub mod tags;

pub use error::{Error, Result};
pub use key::KeyId;
pub use metrics::{Aggregate, GaugeSummary, MetricHandle, MetricKind, RateSummary, TrendSummary};
pub use registry::{MetricId, Registry};
pub use snapshot::{SeriesSummary, Snapshot};
pub use tags::{COMPONENT_TAG, PROFILE_TAG, TagSet, Tags};
