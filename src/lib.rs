#[macro_use]
extern crate async_trait;

pub mod error;
pub use error::Error;
pub mod context;
pub mod echo;
pub mod cgi;

pub mod fast_cgi {
    pub mod records;
    pub mod input_stream;
    pub mod record_output;
    pub mod decode;
    pub mod encode;
    pub mod request;
    pub mod decoder;
    pub mod defs;
    pub mod listener;
}
