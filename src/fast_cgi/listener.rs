use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::UnixListener as StdUnixListener;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tracing::{error, info, warn};

use super::decoder::Decoder;
use super::defs;
use super::input_stream::RecordInputStream;
use super::record_output::RecordOutput;
use super::request::EchoHandler;
use crate::error::Error;

/// The listening socket a FastCGI server passes as file descriptor 0.
///
/// Returns `None`, leaving descriptor 0 open, when it is not a Unix
/// domain socket.
pub fn stdin_listener() -> Option<StdUnixListener>
{
    // SAFETY: descriptor 0 is owned by the process and not used elsewhere
    // until this returns.
    unsafe { listener_from_fd(defs::FCGI_LISTENSOCK_FILENO) }
}

/// Take `fd` as a Unix listener. If it isn't a Unix socket it is released
/// again without being closed.
///
/// # Safety
/// `fd` must be an open descriptor that nothing else closes.
pub unsafe fn listener_from_fd(fd: RawFd) -> Option<StdUnixListener>
{
    let listener = StdUnixListener::from_raw_fd(fd);
    if listener.local_addr().is_ok() {
        Some(listener)
    } else {
        let _ = listener.into_raw_fd();
        None
    }
}

/// Serve FastCGI requests on a single connection
pub async fn connection_handler<S>(stream: S) -> Result<(), Error>
    where S: AsyncRead + AsyncWrite
{
    let (read, write) = tokio::io::split(stream);
    let mut rec_stream = RecordInputStream::new(read);
    let mut rec_output = RecordOutput::new(write);
    let mut decoder = Decoder::new();
    decoder.run(&mut rec_stream, &mut rec_output, &mut EchoHandler).await?;
    rec_output.shutdown().await?;
    Ok(())
}

/// Accept connections until the listener fails. Each connection runs on
/// its own task.
pub async fn serve(listener: StdUnixListener) -> Result<(), Error>
{
    listener.set_nonblocking(true)?;
    let listener = UnixListener::from_std(listener)?;

    info!("Listening");
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection_handler(stream).await {
                        warn!(error = %e, "Connection failed");
                    }
                });
            },
            Err(e) => {
                error!(error = %e, "Accept failed");
                return Err(e.into());
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use bytes::BytesMut;
    use std::fs::File;
    use std::path::PathBuf;
    use crate::fast_cgi::encode::encode_name_value_pair;
    use crate::fast_cgi::records::Record;

    fn record(rec_type: u8, request_id: u16, content: &[u8]) -> Record
    {
        Record{version: defs::FCGI_VERSION_1, rec_type, request_id,
               content_data: BytesMut::from(content)}
    }

    fn params(pairs: &[(&str, &str)]) -> BytesMut
    {
        let mut buf = BytesMut::new();
        for (n, v) in pairs {
            encode_name_value_pair(&mut buf, n.as_bytes(), v.as_bytes()).unwrap();
        }
        buf
    }

    /// Run an exchange against a connection handler and collect the replies
    async fn exchange(records: Vec<Record>) -> (Vec<Record>, Result<(), Error>)
    {
        let (client, server) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(connection_handler(server));
        let (read, write) = tokio::io::split(client);
        let mut output = RecordOutput::new(write);
        for rec in &records {
            output.write(rec).await.unwrap();
        }
        let _ = output.shutdown().await;
        let mut input = RecordInputStream::new(read);
        let mut replies = Vec::new();
        while let Some(rec) = input.next().await {
            replies.push(rec);
        }
        let res = task.await.unwrap();
        (replies, res)
    }

    fn stdout<'a, R>(replies: R) -> String
        where R: IntoIterator<Item = &'a Record>
    {
        let data: Vec<u8> = replies.into_iter()
            .filter(|r| r.rec_type == defs::FCGI_STDOUT)
            .flat_map(|r| r.content_data.iter().copied())
            .collect();
        String::from_utf8(data).unwrap()
    }

    #[tokio::test]
    async fn test_post_request()
    {
        let (replies, res) = exchange(vec![
            record(defs::FCGI_BEGIN_REQUEST, 1, &[0,1, 0, 0,0,0,0,0]),
            record(defs::FCGI_PARAMS, 1, &params(&[
                ("REQUEST_METHOD", "POST"),
                ("REQUEST_URI", "/cgi-bin/echo"),
                ("SERVER_SOFTWARE", "nginx"),
                ("CONTENT_LENGTH", "11")])),
            record(defs::FCGI_PARAMS, 1, &[]),
            record(defs::FCGI_STDIN, 1, b"hello"),
            record(defs::FCGI_STDIN, 1, b"=world"),
            record(defs::FCGI_STDIN, 1, &[]),
        ]).await;
        assert!(res.is_ok());

        let page = stdout(&replies);
        assert!(page.starts_with("Content-Type: text/html\n\n"));
        assert!(page.contains("<p>Request Method: POST</p>"));
        assert!(page.contains("<p>Server Software: nginx</p>"));
        assert!(page.contains("<p>Query String: None</p>"));
        assert!(page.contains("<p>POST Data: hello=world</p>"));

        // Stream terminator, then end of request
        let n = replies.len();
        assert!(n >= 3);
        assert_eq!(replies[n-2].rec_type, defs::FCGI_STDOUT);
        assert!(replies[n-2].content_data.is_empty());
        assert_eq!(replies[n-1].rec_type, defs::FCGI_END_REQUEST);
        assert_eq!(&replies[n-1].content_data[..], &[0u8,0,0,0, 0, 0,0,0]);
        assert!(replies.iter().all(|r| r.request_id == 1));
    }

    #[tokio::test]
    async fn test_keep_conn()
    {
        let get = |id: u16, query: &'static str| vec![
            record(defs::FCGI_BEGIN_REQUEST, id, &[0,1, defs::FCGI_KEEP_CONN, 0,0,0,0,0]),
            record(defs::FCGI_PARAMS, id, &params(&[("REQUEST_METHOD", "GET"),
                                                   ("QUERY_STRING", query)])),
            record(defs::FCGI_PARAMS, id, &[]),
        ];
        let mut records = get(1, "a=1&b=2");
        records.extend(get(2, ""));
        let (replies, res) = exchange(records).await;
        assert!(res.is_ok());

        let first = stdout(replies.iter().filter(|r| r.request_id == 1));
        assert!(first.contains("<p>Query String: a=1&b=2</p>"));
        assert!(!first.contains("POST Data"));
        let second = stdout(replies.iter().filter(|r| r.request_id == 2));
        assert!(second.contains("<p>Query String: </p>"));
        let ends = replies.iter()
            .filter(|r| r.rec_type == defs::FCGI_END_REQUEST)
            .count();
        assert_eq!(ends, 2);
    }

    #[tokio::test]
    async fn test_invalid_content_length()
    {
        let (replies, res) = exchange(vec![
            record(defs::FCGI_BEGIN_REQUEST, 3, &[0,1, 0, 0,0,0,0,0]),
            record(defs::FCGI_PARAMS, 3, &params(&[("REQUEST_METHOD", "POST"),
                                                  ("CONTENT_LENGTH", "lots")])),
            record(defs::FCGI_PARAMS, 3, &[]),
        ]).await;
        assert!(res.is_ok());
        assert!(stdout(&replies).starts_with("Status: 500"));
        assert!(replies.iter().any(|r| r.rec_type == defs::FCGI_STDERR
                                   && !r.content_data.is_empty()));
        let end = replies.last().unwrap();
        assert_eq!(end.rec_type, defs::FCGI_END_REQUEST);
        assert_eq!(&end.content_data[..4], &[0u8,0,0,1]);
    }

    #[tokio::test]
    async fn test_management_and_roles()
    {
        let (replies, res) = exchange(vec![
            record(defs::FCGI_GET_VALUES, 0, &params(&[(defs::FCGI_MPXS_CONNS, ""),
                                                      ("OTHER", "")])),
            record(defs::FCGI_STDOUT, 0, &[]),
            // Authorizer role
            record(defs::FCGI_BEGIN_REQUEST, 4, &[0,2, 0, 0,0,0,0,0]),
        ]).await;
        assert!(res.is_ok());
        assert_eq!(replies.len(), 3);

        assert_eq!(replies[0].rec_type, defs::FCGI_GET_VALUES_RESULT);
        assert_eq!(&replies[0].content_data[..], &params(&[(defs::FCGI_MPXS_CONNS, "0")])[..]);

        assert_eq!(replies[1].rec_type, defs::FCGI_UNKNOWN_TYPE);
        assert_eq!(replies[1].content_data[0], defs::FCGI_STDOUT);

        assert_eq!(replies[2].rec_type, defs::FCGI_END_REQUEST);
        assert_eq!(replies[2].request_id, 4);
        assert_eq!(replies[2].content_data[4], defs::FCGI_UNKNOWN_ROLE);
    }

    #[tokio::test]
    async fn test_large_reply_is_split()
    {
        let body = "q".repeat(70_000);
        let (replies, res) = exchange(vec![
            record(defs::FCGI_BEGIN_REQUEST, 5, &[0,1, 0, 0,0,0,0,0]),
            record(defs::FCGI_PARAMS, 5, &params(&[("REQUEST_METHOD", "POST"),
                                                  ("CONTENT_LENGTH", "70000")])),
            record(defs::FCGI_PARAMS, 5, &[]),
            record(defs::FCGI_STDIN, 5, body[..35_000].as_bytes()),
            record(defs::FCGI_STDIN, 5, body[35_000..].as_bytes()),
        ]).await;
        assert!(res.is_ok());
        let chunks = replies.iter()
            .filter(|r| r.rec_type == defs::FCGI_STDOUT && !r.content_data.is_empty())
            .count();
        assert_eq!(chunks, 2);
        assert!(stdout(&replies).contains(&format!("<p>POST Data: {}</p>", body)));
    }

    fn socket_path(name: &str) -> PathBuf
    {
        let path = std::env::temp_dir()
            .join(format!("cgi_echo-{}-{}.sock", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_listener_from_fd()
    {
        let path = socket_path("fd");
        let fd = StdUnixListener::bind(&path).unwrap().into_raw_fd();
        let listener = unsafe { listener_from_fd(fd) }.unwrap();
        assert_eq!(listener.local_addr().unwrap().as_pathname(), Some(path.as_path()));
        drop(listener);
        let _ = std::fs::remove_file(&path);

        let file_path = socket_path("file");
        let fd = File::create(&file_path).unwrap().into_raw_fd();
        assert!(unsafe { listener_from_fd(fd) }.is_none());
        // Still open, so it can be reclaimed and closed here
        let file = unsafe { File::from_raw_fd(fd) };
        assert!(file.metadata().unwrap().is_file());
        drop(file);
        let _ = std::fs::remove_file(&file_path);
    }

    #[tokio::test]
    async fn test_serve()
    {
        let path = socket_path("serve");
        let listener = StdUnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve(listener));

        for id in 1..=2u16 {
            let stream = tokio::net::UnixStream::connect(&path).await.unwrap();
            let (read, write) = tokio::io::split(stream);
            let mut output = RecordOutput::new(write);
            for rec in [
                record(defs::FCGI_BEGIN_REQUEST, id, &[0,1, 0, 0,0,0,0,0]),
                record(defs::FCGI_PARAMS, id, &params(&[("REQUEST_METHOD", "GET"),
                                                       ("REQUEST_URI", "/echo")])),
                record(defs::FCGI_PARAMS, id, &[]),
            ] {
                output.write(&rec).await.unwrap();
            }
            let mut input = RecordInputStream::new(read);
            let mut replies = Vec::new();
            while let Some(rec) = input.next().await {
                replies.push(rec);
            }
            let page = stdout(&replies);
            assert!(page.contains("<p>Request URI: /echo</p>"));
            assert!(page.contains("<p>Query String: None</p>"));
            assert_eq!(replies.last().unwrap().rec_type, defs::FCGI_END_REQUEST);
        }

        server.abort();
        let _ = std::fs::remove_file(&path);
    }
}
