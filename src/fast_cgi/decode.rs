use bytes::{Buf, Bytes};

use super::records::Error;

fn decode_length(block: &mut Bytes) -> Result<usize, Error>
{
    let first = match block.first() {
        Some(&b) => b,
        None => return Err(Error::new("Missing name-value length"))
    };
    if (first & 0x80) == 0 {
        return Ok(block.get_u8().into());
    }
    if block.len() < 4 {
        return Err(Error::new("Truncated name-value length"));
    }
    usize::try_from(block.get_u32() & 0x7fff_ffff)
        .map_err(|_| Error::new("Name-value length out of range"))
}

/// Read name-value pair
/// Returns (name,value,remaining)
pub fn decode_name_value_pair(mut block: Bytes)
                              -> Result<(Bytes, Bytes, Bytes), Error>
{
    let name_length = decode_length(&mut block)?;
    let value_length = decode_length(&mut block)?;
    match name_length.checked_add(value_length) {
        Some(total) if total <= block.len() => {},
        _ => return Err(Error::new("Truncated name-value pair"))
    }
    let name = block.split_to(name_length);
    let value = block.split_to(value_length);
    Ok((name, value, block))
}

#[test]
fn test_decode_name_value_pair_11()
{
    let block = Bytes::from_static(&[2u8,3,1,2,6,5,4,9]);
    let (name, value, rest) = decode_name_value_pair(block).unwrap();
    assert_eq!(name, Bytes::from_static(&[1,2]));
    assert_eq!(value, Bytes::from_static(&[6,5,4]));
    assert_eq!(rest, Bytes::from_static(&[9]));
}

#[test]
fn test_decode_name_value_pair_44()
{
    let block = Bytes::from_static(&[0x80u8, 0,0, 3,0x80, 0,0,3, 1,2,3,
                                     6,5,4]);
    let (name, value, rest) = decode_name_value_pair(block).unwrap();
    assert_eq!(name, Bytes::from_static(&[1,2,3]));
    assert_eq!(value, Bytes::from_static(&[6,5,4]));
    assert!(rest.is_empty());
}

#[test]
fn test_decode_name_value_pair_truncated()
{
    assert!(decode_name_value_pair(Bytes::from_static(&[2u8,3,1,2,6])).is_err());
    assert!(decode_name_value_pair(Bytes::from_static(&[0x80u8,0])).is_err());
    assert!(decode_name_value_pair(Bytes::from_static(&[1u8])).is_err());
}
