use std::collections::BTreeMap;
use bytes::{Bytes, BytesMut};

use super::defs;
use crate::context::{self, RequestContext};
use crate::echo;
use crate::error::Error;

/// A request being assembled from FastCGI records
#[derive(Debug)]
pub struct Request
{
    pub params: BTreeMap<String,String>,
    pub stdin: Option<BytesMut>,
    pub input_left: usize,
    pub request_done: bool,
    pub keep_conn: bool
}

impl Request
{
    pub fn new(keep_conn: bool) -> Request
    {
        Request{
            params: BTreeMap::new(),
            stdin: None,
            input_left: 0,
            request_done: false,
            keep_conn
        }
    }

    /// Called on the empty params record. Input is only expected when
    /// a positive CONTENT_LENGTH was given.
    pub fn params_done(&mut self)
    {
        let len = self.params.get(context::CONTENT_LENGTH)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&l| l > 0);
        if let Some(len) = len {
            self.input_left = len;
            // The buffer grows with the data actually received
            self.stdin = Some(BytesMut::with_capacity(
                len.min(defs::FCGI_MAX_CONTENT_LEN)));
        } else {
            self.request_done = true;
        }
    }

    pub fn push_stdin(&mut self, data: Bytes)
    {
        let len = data.len();
        if len == 0 {
            self.request_done = true;
            return;
        }
        if let Some(stdin) = &mut self.stdin {
            stdin.extend_from_slice(&data);
        }
        if self.input_left > len {
            self.input_left -= len;
        } else {
            self.input_left = 0;
            self.request_done = true;
        }
    }
}

#[async_trait]
pub trait RequestHandler: Send
{
    async fn handle(&mut self, req: &Request) -> Result<String, Error>;
}

/// Serves every request with the echo page
pub struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler
{
    async fn handle(&mut self, req: &Request) -> Result<String, Error>
    {
        let ctx = RequestContext::from_params(&req.params);
        let input: &[u8] = req.stdin.as_deref().unwrap_or(&[]);
        echo::handle(&ctx, input)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn request(params: &[(&str, &str)]) -> Request
    {
        let mut req = Request::new(false);
        for (n, v) in params {
            req.params.insert(n.to_string(), v.to_string());
        }
        req
    }

    #[test]
    fn test_done_without_body()
    {
        let mut req = request(&[("REQUEST_METHOD", "GET")]);
        req.params_done();
        assert!(req.request_done);
        assert!(req.stdin.is_none());

        let mut req = request(&[("CONTENT_LENGTH", "0")]);
        req.params_done();
        assert!(req.request_done);
    }

    #[test]
    fn test_body_in_pieces()
    {
        let mut req = request(&[("REQUEST_METHOD", "POST"),
                                ("CONTENT_LENGTH", "11")]);
        req.params_done();
        assert!(!req.request_done);
        req.push_stdin(Bytes::from_static(b"hello"));
        assert!(!req.request_done);
        assert_eq!(req.input_left, 6);
        req.push_stdin(Bytes::from_static(b"=world"));
        assert!(req.request_done);
        assert_eq!(req.stdin.as_deref(), Some(&b"hello=world"[..]));
    }

    #[test]
    fn test_huge_content_length()
    {
        for len in ["18446744073709551615", "100000000000000"] {
            let mut req = request(&[("REQUEST_METHOD", "POST"),
                                    ("CONTENT_LENGTH", len)]);
            req.params_done();
            assert!(!req.request_done);
            assert!(req.stdin.as_ref().unwrap().capacity()
                    <= defs::FCGI_MAX_CONTENT_LEN);
            req.push_stdin(Bytes::from_static(b"hello=world"));
            assert!(!req.request_done);
            req.push_stdin(Bytes::new());
            assert!(req.request_done);
            assert_eq!(req.stdin.as_deref(), Some(&b"hello=world"[..]));
        }
    }

    #[test]
    fn test_empty_stdin_ends_body()
    {
        let mut req = request(&[("CONTENT_LENGTH", "11")]);
        req.params_done();
        req.push_stdin(Bytes::from_static(b"hi"));
        req.push_stdin(Bytes::new());
        assert!(req.request_done);
    }

    #[tokio::test]
    async fn test_echo_handler()
    {
        let mut req = request(&[("REQUEST_METHOD", "POST"),
                                ("CONTENT_LENGTH", "11"),
                                ("REQUEST_URI", "/echo?x=1"),
                                ("QUERY_STRING", "x=1")]);
        req.params_done();
        req.push_stdin(Bytes::from_static(b"hello=world"));
        let page = EchoHandler.handle(&req).await.unwrap();
        assert!(page.starts_with("Content-Type: text/html\n\n"));
        assert!(page.contains("<p>Request URI: /echo?x=1</p>"));
        assert!(page.contains("<p>Query String: x=1</p>"));
        assert!(page.contains("<p>Server Software: Unknown</p>"));
        assert!(page.contains("<p>POST Data: hello=world</p>"));
    }
}
