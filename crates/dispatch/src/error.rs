use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Crm(#[from] envio_crm::Error),

    #[error("directory lookup failed: {0}")]
    Directory(#[from] envio_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
