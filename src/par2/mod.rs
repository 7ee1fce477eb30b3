pub mod error;
pub mod matcher;
pub mod packet;

pub use error::Par2Error;
pub use matcher::{compute_hash16k, Par2Manifest};
pub use packet::{parse_file_descriptions, FileDescription};
