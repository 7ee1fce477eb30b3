use thiserror::Error;

use crate::{
    nntp::error::NntpError, par2::error::Par2Error, rar::error::RarError, sink::SinkError,
    yenc::YencError,
};

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("could not open NZB: {0}")]
    OpenNzb(String),

    #[error("could not parse NZB")]
    NzbParse(#[from] nzb_rs::ParseNzbError),

    #[error(transparent)]
    Nntp(#[from] NntpError),

    #[error(transparent)]
    Yenc(#[from] YencError),

    #[error(transparent)]
    Par2(#[from] Par2Error),

    #[error(transparent)]
    Rar(#[from] RarError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("no rar archives found in NZB")]
    NoRarArchives,

    #[error("file '{0}' is not a supported media type")]
    InvalidMediaType(String),

    #[error("bitrate {actual} bps exceeds configured maximum of {max} bps")]
    BitrateExceeded { actual: f64, max: f64 },

    #[error("segment {0} was not delivered before giving up")]
    SegmentMissing(u64),

    #[error("could not verify written file's duration: {0}")]
    DurationProbe(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
