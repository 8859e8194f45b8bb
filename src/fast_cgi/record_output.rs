use std::io::{Error, ErrorKind};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use bytes::{BufMut, BytesMut};

use super::defs;
use super::records::Record;

pub struct RecordOutput<O>
    where O: AsyncWrite + Unpin
{
    output: O
}

impl<O> RecordOutput<O>
    where O: AsyncWrite + Unpin
{
    pub fn new(output: O) -> RecordOutput<O>
    {
        RecordOutput{output}
    }

    /// Write a record, padded to a multiple of 8 bytes
    pub async fn write(&mut self, rec: &Record) -> Result<(), Error> {
        const PADDING: [u8;7] = [0u8;7];
        let content_len = u16::try_from(rec.content_data.len())
            .map_err(|_| Error::new(ErrorKind::InvalidInput,
                                    "FastCGI record content too long"))?;
        let padding_len = (content_len.wrapping_neg() & 7) as u8;
        let mut buf = BytesMut::with_capacity(
            defs::FCGI_HEADER_LEN + rec.content_data.len() + usize::from(padding_len));
        buf.put_u8(rec.version);
        buf.put_u8(rec.rec_type);
        buf.put_u16(rec.request_id);
        buf.put_u16(content_len);
        buf.put_u8(padding_len);
        buf.put_u8(0);
        buf.put_slice(&rec.content_data);
        buf.put_slice(&PADDING[..usize::from(padding_len)]);

        self.output.write_all(&buf).await?;
        self.output.flush().await
    }

    /// Flush and close the write side of the connection
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.output.shutdown().await
    }
}
