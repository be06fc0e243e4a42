//! Request Context: inbound headers for one API call
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Header names are stored lowercase.
    headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        for (name, value) in pairs {
            ctx.insert_header(name, value);
        }
        ctx
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Header value with surrounding whitespace removed; blank counts as absent.
    pub fn non_blank_header(&self, name: &str) -> Option<&str> {
        self.header(name).map(str::trim).filter(|v| !v.is_empty())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
