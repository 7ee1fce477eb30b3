use thiserror::Error;

#[derive(Error, Debug)]
pub enum Par2Error {
    #[error("truncated PAR2 packet at offset {0}")]
    Truncated(usize),

    #[error("packet magic mismatch at offset {0}")]
    BadMagic(usize),

    #[error("packet length {0} is not a multiple of 4")]
    UnalignedLength(u64),

    #[error("file descriptor packet missing a filename")]
    MissingFilename,

    #[error("could not read PAR2 file")]
    Io(#[from] std::io::Error),
}
