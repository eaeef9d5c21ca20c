//! Set of module Error
pub mod bundle;
pub mod conf;
pub mod download;
pub mod metainfo;
pub mod plan;
pub mod preview;
pub mod registry;

pub use bundle::BundleError;
pub use conf::ConfError;
pub use download::DownloadError;
pub use metainfo::MetainfoError;
pub use plan::PlanError;
pub use preview::PreviewError;
pub use registry::RegistryError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The crate-wide error, for callers driving a whole partial download and
/// not caring which stage failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    Metainfo(#[from] MetainfoError),
    #[error("{0}")]
    Plan(#[from] PlanError),
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Bundle(#[from] BundleError),
    #[error("{0}")]
    Download(#[from] DownloadError),
    #[error("{0}")]
    Preview(#[from] PreviewError),
    #[error("{0}")]
    Conf(#[from] ConfError),
}
