use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::defs;
use super::records::Record;

/// Reassembles FastCGI records from a byte stream
pub struct RecordInputStream<I>
    where I: AsyncRead + Unpin
{
    input: I,
    buffer: BytesMut,
    record: Option<Record>,
    content_left: usize,
    padding_left: usize,
}

impl<I> RecordInputStream<I>
    where I: AsyncRead + Unpin
{
    pub fn new(input: I) -> RecordInputStream<I>
    {
        RecordInputStream{input,
                          buffer: BytesMut::new(),
                          record: None,
                          content_left: 0,
                          padding_left: 0,
        }
    }

    /// Take a complete record out of the buffer, if there is one
    fn parse(&mut self) -> Option<Record>
    {
        loop {
            if self.record.is_some() {
                if self.content_left == 0 {
                    return self.record.take();
                }
                if self.buffer.is_empty() {
                    return None;
                }
                let copy = self.content_left.min(self.buffer.len());
                if let Some(record) = &mut self.record {
                    record.content_data.extend_from_slice(
                        &self.buffer.split_to(copy));
                }
                self.content_left -= copy;
            } else if self.padding_left > 0 {
                if self.buffer.is_empty() {
                    return None;
                }
                let split = self.padding_left.min(self.buffer.len());
                self.buffer.advance(split);
                self.padding_left -= split;
            } else if self.buffer.len() >= defs::FCGI_HEADER_LEN {
                let mut header = self.buffer.split_to(defs::FCGI_HEADER_LEN);
                let version = header.get_u8();
                let rec_type = header.get_u8();
                let request_id = header.get_u16();
                self.content_left = header.get_u16().into();
                self.padding_left = header.get_u8().into();
                self.record = Some(Record{version,
                                          rec_type,
                                          request_id,
                                          content_data: BytesMut::with_capacity(self.content_left)
                });
            } else {
                return None;
            }
        }
    }

    /// Next record, `None` once the peer closed the stream or reading failed
    pub async fn next(&mut self) -> Option<Record>
    {
        loop {
            if let Some(record) = self.parse() {
                return Some(record);
            }
            match self.input.read_buf(&mut self.buffer).await {
                Ok(0) => return None,
                Ok(_) => {},
                Err(e) => {
                    debug!(error = %e, "FastCGI read failed");
                    return None;
                }
            }
        }
    }
}
