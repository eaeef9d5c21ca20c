pub type Result<T, E = ConfError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ConfError {
    #[error("{0}")]
    Toml(#[from] toml::de::Error),
}
