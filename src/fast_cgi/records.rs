use bytes::{BytesMut,Bytes,Buf,BufMut};
use std::vec::Vec;
use super::defs;
use super::decode;
use super::encode;

#[derive(Debug, thiserror::Error)]
#[error("{description}")]
pub struct Error
{
    pub description: String
}

impl Error {
    pub fn new(description: &str) -> Error
    {
        Error{description: description.to_string()}
    }
}

#[derive(Debug)]
pub struct Record
{
    pub version: u8,
    pub rec_type: u8,
    pub request_id: u16,
    pub content_data: BytesMut,
}

#[derive(Debug)]
pub struct BeginRequest
{
    pub role: u16,
    pub flags: u8
}

impl BeginRequest {
    pub fn keep_conn(&self) -> bool
    {
        (self.flags & defs::FCGI_KEEP_CONN) != 0
    }
}

#[derive(Debug)]
pub struct EndRequest
{
    pub app_status: u32,
    pub protocol_status: u8
}


#[derive(Debug, PartialEq, Eq)]
pub struct NameValuePair
{
    pub name: String,
    pub value: String
}

impl NameValuePair {
    pub fn new(name: String, value: String) -> NameValuePair
    {
        NameValuePair{name, value}
    }
}

#[derive(Debug)]
pub enum ServerRecord
{
    GetValues(Vec<NameValuePair>),
    BeginRequest(BeginRequest),
    Params(Vec<NameValuePair>),
    StdIn(Bytes),
    Data(Bytes),
    Abort,
    /// Any type a web server is not supposed to send
    Unknown(u8),
}

fn decode_pairs(mut block: Bytes) -> Result<Vec<NameValuePair>, Error>
{
    let mut params = Vec::new();
    while !block.is_empty() {
        let (name, value, rest) = decode::decode_name_value_pair(block)?;
        // CGI variables are text, stray bytes are replaced
        let name_str = String::from_utf8_lossy(&name).into_owned();
        let value_str = String::from_utf8_lossy(&value).into_owned();
        params.push(NameValuePair::new(name_str, value_str));
        block = rest;
    }
    Ok(params)
}

impl ServerRecord {
    pub fn decode(rec: &Record) -> Result<ServerRecord,Error>
    {
        match rec.rec_type {
            defs::FCGI_BEGIN_REQUEST => {
                if rec.content_data.len() < 3 {
                    return Err(Error::new("Short begin request body"));
                }
                let mut block = &rec.content_data[..];
                let role = block.get_u16();
                let flags = block.get_u8();
                Ok(ServerRecord::BeginRequest(BeginRequest{role, flags}))
            },
            defs::FCGI_ABORT_REQUEST => {
              Ok(ServerRecord::Abort)
            },
            defs::FCGI_PARAMS => {
                let block = Bytes::copy_from_slice(&rec.content_data);
                Ok(ServerRecord::Params(decode_pairs(block)?))
            },
            defs::FCGI_STDIN => {
                Ok(ServerRecord::StdIn(Bytes::copy_from_slice(&rec.content_data)))
            },
            defs::FCGI_DATA => {
                Ok(ServerRecord::Data(Bytes::copy_from_slice(&rec.content_data)))
            },
            defs::FCGI_GET_VALUES => {
                let block = Bytes::copy_from_slice(&rec.content_data);
                Ok(ServerRecord::GetValues(decode_pairs(block)?))
            },
            t => Ok(ServerRecord::Unknown(t))
        }
    }
}

pub enum AppRecord {
    GetValuesResult(Vec<NameValuePair>),
    UnknownType(u8),
    EndRequest(EndRequest),
    StdOut(Bytes),
    StdErr(Bytes),
}

impl AppRecord {
    pub fn encode(&self, request_id: u16) -> Result<Record,Error>
    {
        let mut rec = Record{request_id,
                         version: defs::FCGI_VERSION_1,
                         rec_type: 0,
                         content_data: BytesMut::new()};
        match self {
            AppRecord::EndRequest(end) => {
                rec.rec_type = defs::FCGI_END_REQUEST;
                rec.content_data.put_u32(end.app_status);
                rec.content_data.put_u8(end.protocol_status);
                rec.content_data.put_slice(&[0u8;3]);
            },
            AppRecord::StdOut(data) => {
                rec.rec_type = defs::FCGI_STDOUT;
                rec.content_data.put_slice(data);
            },
            AppRecord::StdErr(data) => {
                rec.rec_type = defs::FCGI_STDERR;
                rec.content_data.put_slice(data);
            },
            AppRecord::GetValuesResult(values) => {
                rec.rec_type = defs::FCGI_GET_VALUES_RESULT;
                for p in values {
                    encode::encode_name_value_pair(&mut rec.content_data,
                                                   p.name.as_bytes(),
                                                   p.value.as_bytes())?;
                }
            },
            AppRecord::UnknownType(t) => {
                rec.rec_type = defs::FCGI_UNKNOWN_TYPE;
                rec.content_data.put_u8(*t);
                rec.content_data.put_slice(&[0u8;7]);
            },
        }
        if rec.content_data.len() > defs::FCGI_MAX_CONTENT_LEN {
            return Err(Error::new("Record content too long"));
        }
        Ok(rec)
    }
}

#[cfg(test)]
fn record(rec_type: u8, content: &[u8]) -> Record
{
    Record{version: defs::FCGI_VERSION_1, rec_type, request_id: 1,
           content_data: BytesMut::from(content)}
}

#[test]
fn test_decode_begin_request()
{
    let rec = record(defs::FCGI_BEGIN_REQUEST, &[0,1, 1, 0,0,0,0,0]);
    match ServerRecord::decode(&rec).unwrap() {
        ServerRecord::BeginRequest(begin) => {
            assert_eq!(begin.role, defs::FCGI_RESPONDER);
            assert!(begin.keep_conn());
        },
        r => panic!("Unexpected record: {:?}", r)
    }
    assert!(ServerRecord::decode(&record(defs::FCGI_BEGIN_REQUEST, &[0])).is_err());
}

#[test]
fn test_decode_params()
{
    let mut content = BytesMut::new();
    encode::encode_name_value_pair(&mut content, b"REQUEST_METHOD", b"GET").unwrap();
    encode::encode_name_value_pair(&mut content, b"QUERY_STRING", b"").unwrap();
    match ServerRecord::decode(&record(defs::FCGI_PARAMS, &content)).unwrap() {
        ServerRecord::Params(pairs) => {
            assert_eq!(pairs, vec![
                NameValuePair::new("REQUEST_METHOD".into(), "GET".into()),
                NameValuePair::new("QUERY_STRING".into(), "".into())]);
        },
        r => panic!("Unexpected record: {:?}", r)
    }
}

#[test]
fn test_decode_unknown()
{
    assert!(matches!(ServerRecord::decode(&record(42, &[])).unwrap(),
                     ServerRecord::Unknown(42)));
}

#[test]
fn test_encode_end_request()
{
    let rec = AppRecord::EndRequest(EndRequest{app_status: 0x0102_0304,
                                               protocol_status: 3})
        .encode(7).unwrap();
    assert_eq!(rec.rec_type, defs::FCGI_END_REQUEST);
    assert_eq!(rec.request_id, 7);
    assert_eq!(&rec.content_data[..], &[1u8,2,3,4, 3, 0,0,0]);
}

#[test]
fn test_encode_get_values_result()
{
    let rec = AppRecord::GetValuesResult(vec![
        NameValuePair::new(defs::FCGI_MPXS_CONNS.into(), "0".into())])
        .encode(defs::FCGI_NULL_REQUEST_ID).unwrap();
    let mut expected = vec![15u8, 1];
    expected.extend_from_slice(b"FCGI_MPXS_CONNS0");
    assert_eq!(&rec.content_data[..], &expected[..]);
}

#[test]
fn test_encode_too_long()
{
    let data = Bytes::from(vec![0u8; defs::FCGI_MAX_CONTENT_LEN + 1]);
    assert!(AppRecord::StdOut(data).encode(1).is_err());
}
