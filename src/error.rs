use std::num::ParseIntError;

use crate::fast_cgi::records;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("invalid CONTENT_LENGTH {value:?}")]
    InvalidContentLength {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("FastCGI record error")]
    Record(#[from] records::Error),
}
