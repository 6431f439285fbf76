use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metrics snapshot was already taken for this run")]
    SnapshotTaken,

    #[error("metric `{name}` is registered as {registered}, cannot record it as {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },
}
