use {envio_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Dispatch(#[from] envio_dispatch::Error),

    #[error(transparent)]
    Common(#[from] envio_common::Error),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

envio_common::impl_context!();
