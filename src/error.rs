use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot query size of {}: {source}", path.display())]
    SizeQuery { path: PathBuf, source: io::Error },
    #[error("{} reports no addressable sectors", path.display())]
    EmptyDevice { path: PathBuf },
    #[error("span of {bytes} bytes is not a multiple of the sector size")]
    InvalidSpan { bytes: u64 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
