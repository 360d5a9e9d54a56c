use std::collections::HashMap;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ports::interceptor::{InterceptorContext, RequestInterceptor};

/// Adds a fixed set of headers to every request unless the request already
/// carries them.
#[derive(Debug, Clone, Default)]
pub struct StaticHeadersInterceptor {
    headers: HeaderMap,
}

impl StaticHeadersInterceptor {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Build from configured name/value pairs. Invalid entries are skipped
    /// with a warning; validation reports them up front.
    pub fn from_map(headers: &HashMap<String, String>) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid default header"),
            }
        }
        Self::new(map)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl RequestInterceptor for StaticHeadersInterceptor {
    fn intercept(&self, context: InterceptorContext) {
        context.with_request(|request| {
            for (name, value) in &self.headers {
                if !request.headers.contains_key(name) {
                    request.headers.insert(name.clone(), value.clone());
                }
            }
        });
        context.proceed();
    }

    fn name(&self) -> &str {
        "static_headers"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_skips_invalid_entries() {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        headers.insert("bad header".to_string(), "v".to_string());

        let interceptor = StaticHeadersInterceptor::from_map(&headers);
        assert_eq!(interceptor.headers().len(), 1);
        assert_eq!(interceptor.headers()["x-api-key"], "secret");
    }
}
