use thiserror::Error;

#[derive(Error, Debug)]
pub enum RarError {
    #[error("buffer does not start with a RAR signature")]
    BadSignature,

    #[error("unsupported RAR header flags on block type {0:#04x}")]
    Unsupported(u8),

    #[error("header claims length {0}, which overruns the buffered data")]
    Truncated(u64),

    #[error("volume has no FILE_HEAD block")]
    NoFileHead,

    #[error("archive uses compression or encryption, which is unsupported")]
    Compressed,
}
