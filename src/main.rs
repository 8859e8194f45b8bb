use std::env;

use anyhow::Context;
use tracing::Level;

use cgi_echo::cgi;
use cgi_echo::context;
use cgi_echo::fast_cgi::listener;

/// Logs go to stderr, which the web server collects in its error log.
fn init_logging()
{
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();
}

/// A classic CGI invocation always carries the request metadata in the
/// environment. A FastCGI responder is started with none of it.
fn is_cgi_request() -> bool
{
    env::var_os("GATEWAY_INTERFACE").is_some()
        || env::var_os(context::REQUEST_METHOD).is_some()
}

fn main() -> anyhow::Result<()>
{
    init_logging();

    if !is_cgi_request() {
        if let Some(fcgi_listener) = listener::stdin_listener() {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start runtime")?;
            return rt.block_on(listener::serve(fcgi_listener))
                .context("FastCGI responder stopped");
        }
    }
    cgi::run().context("Failed to handle CGI request")
}
