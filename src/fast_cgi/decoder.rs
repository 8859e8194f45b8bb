use std::collections::HashMap;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::defs;
use super::input_stream::RecordInputStream;
use super::record_output::RecordOutput;
use super::records::{AppRecord, EndRequest, NameValuePair, Record, ServerRecord};
use super::request::{Request, RequestHandler};
use crate::error::Error;

/// Responder side of one FastCGI connection
pub struct Decoder
{
    requests: HashMap<u16, Request>
}

impl Default for Decoder
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Decoder
{
    pub fn new() -> Decoder
    {
        Decoder{requests: HashMap::new()}
    }

    async fn send<O>(output: &mut RecordOutput<O>, rec: AppRecord, request_id: u16)
                     -> Result<(), Error>
        where O: AsyncWrite + Unpin
    {
        output.write(&rec.encode(request_id)?).await?;
        Ok(())
    }

    /// Send a stream, split into records, followed by the empty record
    /// that closes it.
    async fn send_stream<O, F>(output: &mut RecordOutput<O>, data: &[u8],
                               request_id: u16, make: F) -> Result<(), Error>
        where O: AsyncWrite + Unpin,
              F: Fn(Bytes) -> AppRecord
    {
        for chunk in data.chunks(defs::FCGI_MAX_CONTENT_LEN) {
            Self::send(output, make(Bytes::copy_from_slice(chunk)), request_id).await?;
        }
        Self::send(output, make(Bytes::new()), request_id).await
    }

    async fn end_request<O>(output: &mut RecordOutput<O>, request_id: u16,
                            app_status: u32, protocol_status: u8)
                            -> Result<(), Error>
        where O: AsyncWrite + Unpin
    {
        let reply = AppRecord::EndRequest(EndRequest{app_status, protocol_status});
        Self::send(output, reply, request_id).await
    }

    async fn error_reply<O>(output: &mut RecordOutput<O>, err: &Error, request_id: u16)
                            -> Result<(), Error>
        where O: AsyncWrite + Unpin
    {
        let reply = "Status: 500 Internal Server Error\r\n\
                     Content-Type: text/plain\r\n\r\n\
                     Internal Server Error\n";
        Self::send_stream(output, reply.as_bytes(), request_id, AppRecord::StdOut).await?;
        let msg = match std::error::Error::source(err) {
            Some(src) => format!("App failed with error: {}: {}\n", err, src),
            None => format!("App failed with error: {}\n", err)
        };
        Self::send_stream(output, msg.as_bytes(), request_id, AppRecord::StdErr).await?;
        Self::end_request(output, request_id, 1, defs::FCGI_REQUEST_COMPLETE).await
    }

    async fn respond<O>(output: &mut RecordOutput<O>, handler: &mut dyn RequestHandler,
                        req: &Request, request_id: u16) -> Result<(), Error>
        where O: AsyncWrite + Unpin
    {
        match handler.handle(req).await {
            Ok(reply) => {
                Self::send_stream(output, reply.as_bytes(), request_id,
                                  AppRecord::StdOut).await?;
                Self::end_request(output, request_id, 0,
                                  defs::FCGI_REQUEST_COMPLETE).await
            },
            Err(e) => {
                warn!(request_id, error = %e, "request failed");
                Self::error_reply(output, &e, request_id).await
            }
        }
    }

    /// Records with the null request id
    async fn management<O>(output: &mut RecordOutput<O>, rec: &Record)
                           -> Result<(), Error>
        where O: AsyncWrite + Unpin
    {
        match ServerRecord::decode(rec) {
            Ok(ServerRecord::GetValues(names)) => {
                let values = names.into_iter().filter_map(|p| {
                    let value = match p.name.as_str() {
                        defs::FCGI_MAX_CONNS => "1",
                        defs::FCGI_MAX_REQS => "1",
                        defs::FCGI_MPXS_CONNS => "0",
                        _ => return None
                    };
                    Some(NameValuePair::new(p.name, value.to_string()))
                }).collect();
                Self::send(output, AppRecord::GetValuesResult(values),
                           defs::FCGI_NULL_REQUEST_ID).await
            },
            Ok(_) => {
                Self::send(output, AppRecord::UnknownType(rec.rec_type),
                           defs::FCGI_NULL_REQUEST_ID).await
            },
            Err(e) => {
                warn!(error = %e, "Failed to decode management record");
                Ok(())
            }
        }
    }

    /// Serve requests until the connection closes, or until a request
    /// that didn't ask to keep the connection has ended.
    pub async fn run<I,O>(&mut self,
                          input: &mut RecordInputStream<I>,
                          output: &mut RecordOutput<O>,
                          handler: &mut dyn RequestHandler
    ) -> Result<(), Error>
        where I: AsyncRead + Unpin,
              O: AsyncWrite + Unpin
    {
        while let Some(rec) = input.next().await {
            let request_id = rec.request_id;
            if request_id == defs::FCGI_NULL_REQUEST_ID {
                Self::management(output, &rec).await?;
                continue;
            }
            match ServerRecord::decode(&rec) {
                Ok(ServerRecord::BeginRequest(begin)) => {
                    if begin.role != defs::FCGI_RESPONDER {
                        warn!(request_id, role = begin.role, "Unsupported role");
                        Self::end_request(output, request_id, 0,
                                          defs::FCGI_UNKNOWN_ROLE).await?;
                        if !begin.keep_conn() {
                            return Ok(());
                        }
                        continue;
                    }
                    debug!(request_id, "Begin request");
                    self.requests.insert(request_id, Request::new(begin.keep_conn()));
                },
                Ok(ServerRecord::Params(pairs)) => {
                    if let Some(request) = self.requests.get_mut(&request_id) {
                        if pairs.is_empty() {
                            request.params_done();
                        } else {
                            for p in pairs {
                                request.params.insert(p.name, p.value);
                            }
                        }
                    }
                },
                Ok(ServerRecord::StdIn(data)) => {
                    if let Some(request) = self.requests.get_mut(&request_id) {
                        request.push_stdin(data);
                    }
                },
                Ok(ServerRecord::Abort) => {
                    if let Some(request) = self.requests.remove(&request_id) {
                        debug!(request_id, "Request aborted");
                        Self::end_request(output, request_id, 0,
                                          defs::FCGI_REQUEST_COMPLETE).await?;
                        if !request.keep_conn {
                            return Ok(());
                        }
                    }
                },
                Ok(ServerRecord::Data(_)) => {
                    // Only used by the filter role
                },
                Ok(r) => {
                    debug!(request_id, record = ?r, "Other");
                    Self::send(output, AppRecord::UnknownType(rec.rec_type),
                               request_id).await?;
                },
                Err(e) => {
                    warn!(request_id, error = %e, "Failed to decode record");
                }
            }
            let done = self.requests.get(&request_id)
                .map_or(false, |req| req.request_done);
            if done {
                if let Some(req) = self.requests.remove(&request_id) {
                    Self::respond(output, handler, &req, request_id).await?;
                    if !req.keep_conn {
                        return Ok(());
                    }
                }
            }
        }
        debug!("Connection closed");
        Ok(())
    }
}
