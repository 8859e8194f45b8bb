use bytes::BufMut;

use super::records::Error;

fn encode_length<B: BufMut>(buf: &mut B, len: usize) -> Result<(), Error>
{
    if len > 127 {
        let len = u32::try_from(len).ok().filter(|&l| l <= 0x7fff_ffff)
            .ok_or_else(|| Error::new("Name-value length out of range"))?;
        buf.put_u32(len | 0x8000_0000u32);
    } else {
        buf.put_u8(len as u8);
    }
    Ok(())
}

/// Write name-value pair
pub fn encode_name_value_pair<B: BufMut>(buf: &mut B, name: &[u8], value: &[u8])
                                         -> Result<(), Error>
{
    encode_length(buf, name.len())?;
    encode_length(buf, value.len())?;
    buf.put_slice(name);
    buf.put_slice(value);
    Ok(())
}

#[cfg(test)]
use bytes::{Bytes, BytesMut};

#[test]
fn test_encode_long_value()
{
    let value = vec![b'x'; 200];
    let mut buf = BytesMut::new();
    encode_name_value_pair(&mut buf, b"QUERY_STRING", &value).unwrap();
    assert_eq!(&buf[..5], &[12u8, 0x80, 0, 0, 200]);

    let (name, decoded, rest) =
        super::decode::decode_name_value_pair(buf.freeze()).unwrap();
    assert_eq!(name, Bytes::from_static(b"QUERY_STRING"));
    assert_eq!(decoded.len(), 200);
    assert!(rest.is_empty());
}
