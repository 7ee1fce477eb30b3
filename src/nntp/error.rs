use thiserror::Error;

#[derive(Error, Debug)]
pub enum NntpError {
    #[error("could not connect to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed for user '{0}'")]
    AuthFailed(String),

    #[error("article {0} no longer exists on the server (430)")]
    ArticleGone(String),

    #[error("transient NNTP failure fetching {0}")]
    Transient(String),

    #[error(transparent)]
    Yenc(#[from] crate::yenc::YencError),

    #[error("I/O error talking to news server")]
    Io(#[from] std::io::Error),
}
