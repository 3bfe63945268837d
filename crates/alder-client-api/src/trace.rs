//! W3C trace context carried on requests for distributed tracing.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A `traceparent` header could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid traceparent header: {value}")]
pub struct InvalidTraceparent {
    /// The offending header value.
    pub value: String,
}

/// W3C trace context identifying one span in a distributed trace.
///
/// Captured once when a call is submitted and carried through every retry of
/// that call, so the server can continue the trace even after the submitting
/// context is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace ID (32 hex chars).
    pub trace_id: String,
    /// Parent span ID (16 hex chars).
    pub parent_id: String,
    /// Current span ID (16 hex chars).
    pub span_id: String,
    /// Trace flags (01 = sampled).
    pub flags: u8,
}

impl TraceContext {
    /// Create a new root trace context.
    pub fn new_root() -> Self {
        Self {
            trace_id: Self::generate_trace_id(),
            parent_id: "0000000000000000".to_string(),
            span_id: Self::generate_span_id(),
            flags: 0x01,
        }
    }

    /// Create a child span from this context.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            parent_id: self.span_id.clone(),
            span_id: Self::generate_span_id(),
            flags: self.flags,
        }
    }

    fn generate_trace_id() -> String {
        format!("{:032x}", rand::random::<u128>())
    }

    fn generate_span_id() -> String {
        format!("{:016x}", rand::random::<u64>())
    }

    /// Convert to W3C traceparent header format.
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.flags)
    }

    /// Parse from W3C traceparent header format.
    pub fn from_traceparent(header: &str) -> Result<Self, InvalidTraceparent> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 || parts[1].len() != 32 || parts[2].len() != 16 {
            return Err(InvalidTraceparent {
                value: header.to_string(),
            });
        }
        let flags = u8::from_str_radix(parts[3], 16).map_err(|_| InvalidTraceparent {
            value: header.to_string(),
        })?;
        Ok(Self {
            trace_id: parts[1].to_string(),
            parent_id: "0000000000000000".to_string(),
            span_id: parts[2].to_string(),
            flags,
        })
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keeps_trace_id_and_links_parent() {
        let root = TraceContext::new_root();
        let child = root.child();

        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_id, root.span_id);
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn traceparent_round_trip() {
        let root = TraceContext::new_root();
        let header = root.to_traceparent();
        let parsed = TraceContext::from_traceparent(&header).unwrap();

        assert_eq!(parsed.trace_id, root.trace_id);
        assert_eq!(parsed.span_id, root.span_id);
        assert_eq!(parsed.flags, root.flags);
    }

    #[test]
    fn malformed_traceparent_is_rejected() {
        assert!(TraceContext::from_traceparent("not-a-header").is_err());
        assert!(TraceContext::from_traceparent("00-short-span-01").is_err());
    }
}
