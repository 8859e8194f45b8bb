use std::fmt::Write as _;
use std::io::Read;

use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::Error;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type: text/html\n\n";

/// Read the request body, if there is one.
///
/// At most `CONTENT_LENGTH` bytes are taken from `input`, and nothing is
/// read unless the request is a POST with a positive length.
pub fn read_body<R>(ctx: &RequestContext, input: R) -> Result<Option<String>, Error>
    where R: Read
{
    let len = match ctx.body_length()? {
        Some(len) => len,
        None => return Ok(None),
    };
    let mut data = Vec::new();
    input.take(len).read_to_end(&mut data)?;
    if (data.len() as u64) < len {
        warn!(expected = len, received = data.len(), "short request body");
    }
    Ok(Some(String::from_utf8_lossy(&data).into_owned()))
}

/// Render the reply page, header included.
///
/// Values are inserted as they are, no HTML escaping.
pub fn render(ctx: &RequestContext, body: Option<&str>) -> String
{
    let mut page = String::from(CONTENT_TYPE_HEADER);
    page += "<html><body>\n";
    page += "<h1>Hello from CGI!</h1>\n";
    // Writing to a String can't fail
    let _ = writeln!(page, "<p>Request Method: {}</p>", ctx.method());
    let _ = writeln!(page, "<p>Request URI: {}</p>", ctx.uri());
    let _ = writeln!(page, "<p>Server Software: {}</p>", ctx.server_software());
    let _ = writeln!(page, "<p>Query String: {}</p>", ctx.query_string());
    if let Some(body) = body {
        let _ = writeln!(page, "<p>POST Data: {}</p>", body);
    }
    page += "</body></html>\n";
    page
}

/// Handle one request: read the body when there is one and render the page.
pub fn handle<R>(ctx: &RequestContext, input: R) -> Result<String, Error>
    where R: Read
{
    let body = read_body(ctx, input)?;
    debug!(method = ctx.method(), uri = ctx.uri(),
           body_len = body.as_ref().map(|b| b.len()), "echo request");
    Ok(render(ctx, body.as_deref()))
}
