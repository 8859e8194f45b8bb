use std::collections::BTreeMap;

use crate::error::Error;

pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const REQUEST_URI: &str = "REQUEST_URI";
pub const SERVER_SOFTWARE: &str = "SERVER_SOFTWARE";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";

/// Placeholder for an absent method, URI or server identity
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for an absent query string
pub const NO_QUERY: &str = "None";

/// Request metadata for a single CGI request.
///
/// Every attribute is optional. The accessors apply the per-field
/// default, the raw `Option` stays available in the public fields.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestContext
{
    pub method: Option<String>,
    pub uri: Option<String>,
    pub server_software: Option<String>,
    pub query_string: Option<String>,
    /// Kept as received; only parsed for POST requests
    pub content_length: Option<String>,
}

impl RequestContext
{
    /// Build a context from any attribute lookup, e.g. the process
    /// environment or a FastCGI parameter map.
    pub fn from_lookup<F>(mut lookup: F) -> RequestContext
        where F: FnMut(&str) -> Option<String>
    {
        RequestContext {
            method: lookup(REQUEST_METHOD),
            uri: lookup(REQUEST_URI),
            server_software: lookup(SERVER_SOFTWARE),
            query_string: lookup(QUERY_STRING),
            content_length: lookup(CONTENT_LENGTH),
        }
    }

    pub fn from_params(params: &BTreeMap<String, String>) -> RequestContext
    {
        Self::from_lookup(|name| params.get(name).cloned())
    }

    pub fn method(&self) -> &str
    {
        self.method.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn uri(&self) -> &str
    {
        self.uri.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn server_software(&self) -> &str
    {
        self.server_software.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn query_string(&self) -> &str
    {
        self.query_string.as_deref().unwrap_or(NO_QUERY)
    }

    /// Method comparison is case-sensitive, `post` is not POST.
    pub fn is_post(&self) -> bool
    {
        self.method.as_deref() == Some("POST")
    }

    /// Number of body bytes to read.
    ///
    /// `None` unless the method is POST and the declared length is
    /// positive. A length that is not an integer is an error, but only
    /// for POST requests.
    pub fn body_length(&self) -> Result<Option<u64>, Error>
    {
        if !self.is_post() {
            return Ok(None);
        }
        let value = match &self.content_length {
            Some(v) => v,
            None => return Ok(None),
        };
        let len = value.trim().parse::<i64>().map_err(|source| {
            Error::InvalidContentLength { value: value.clone(), source }
        })?;
        Ok(u64::try_from(len).ok().filter(|&l| l > 0))
    }
}
