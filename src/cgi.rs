use std::env;
use std::io::{self, Read, Write};

use tracing::debug;

use crate::context::RequestContext;
use crate::echo;
use crate::error::Error;

/// Request metadata from the process environment
pub fn context_from_env() -> RequestContext
{
    RequestContext::from_lookup(|name| {
        env::var_os(name).map(|v| v.to_string_lossy().into_owned())
    })
}

/// Serve one request. Nothing is written if the request fails.
pub fn serve<R, W>(ctx: &RequestContext, input: R, mut output: W) -> Result<(), Error>
    where R: Read, W: Write
{
    let page = echo::handle(ctx, input)?;
    output.write_all(page.as_bytes())?;
    output.flush()?;
    Ok(())
}

/// Classic CGI: environment in, stdin for the body, stdout for the reply.
pub fn run() -> Result<(), Error>
{
    let ctx = context_from_env();
    debug!(method = ctx.method(), uri = ctx.uri(), "CGI request");
    serve(&ctx, io::stdin().lock(), io::stdout().lock())
}
