//! Network request records.
//!
//! A [`NetworkRequestRecord`] is the normalized form of one request observed
//! in the DevTools network log. Records are immutable once parsed; redirect
//! chains are split into one record per leg.

use serde::{Deserialize, Serialize};

/// Resource type reported by the browser for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    Other,
}

impl ResourceType {
    /// Parse the DevTools protocol string form, defaulting to `Other`.
    pub fn from_protocol(s: &str) -> Self {
        match s {
            "Document" => ResourceType::Document,
            "Stylesheet" => ResourceType::Stylesheet,
            "Script" => ResourceType::Script,
            "Image" => ResourceType::Image,
            "Font" => ResourceType::Font,
            "Media" => ResourceType::Media,
            "XHR" => ResourceType::Xhr,
            "Fetch" => ResourceType::Fetch,
            _ => ResourceType::Other,
        }
    }
}

/// Request priority as reported by the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestPriority {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RequestPriority {
    pub fn from_protocol(s: &str) -> Self {
        match s {
            "VeryLow" => RequestPriority::VeryLow,
            "Low" => RequestPriority::Low,
            "High" => RequestPriority::High,
            "VeryHigh" => RequestPriority::VeryHigh,
            _ => RequestPriority::Medium,
        }
    }
}

/// What caused a request to be issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Initiator {
    /// Discovered by the HTML parser while parsing `url`.
    Parser { url: String },
    /// Issued by script; `stack_urls` lists the script URLs on the stack,
    /// innermost frame first.
    Script { stack_urls: Vec<String> },
    /// Preload scanner or `<link rel=preload>`.
    Preload,
    /// Unknown or browser-internal.
    Other,
}

/// Connection-level timing breakdown, all values in milliseconds relative to
/// the request start (-1 when the phase did not occur).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTiming {
    pub dns_start: f64,
    pub dns_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub ssl_start: f64,
    pub ssl_end: f64,
    pub send_start: f64,
    pub send_end: f64,
    /// Time to first byte of the response.
    pub receive_headers_end: f64,
}

/// One normalized network request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequestRecord {
    /// Protocol request id; redirect legs carry a `:redirect` suffix.
    pub request_id: String,
    pub url: String,
    /// URL of the document this request belongs to.
    pub document_url: String,
    /// Request start in milliseconds on the monotonic log clock.
    pub start_time: f64,
    /// Time the response headers arrived, or -1 if never.
    pub response_received_time: f64,
    /// Request end (finished or failed) in milliseconds, or -1 if never.
    pub end_time: f64,
    /// Bytes on the wire.
    pub transfer_size: u64,
    /// Decoded body size.
    pub resource_size: u64,
    pub resource_type: ResourceType,
    pub status_code: i64,
    pub priority: RequestPriority,
    /// Negotiated protocol, e.g. `http/1.1` or `h2`.
    pub protocol: String,
    pub timing: Option<ResourceTiming>,
    pub initiator: Initiator,
    /// Request id of the record this one was redirected from.
    pub redirect_source_id: Option<String>,
    /// Request id of the record this one redirected to.
    pub redirect_destination_id: Option<String>,
    pub finished: bool,
    pub failed: bool,
    pub from_cache: bool,
}

impl NetworkRequestRecord {
    /// Scheme plus host, used to pool simulated connections per origin.
    pub fn origin(&self) -> &str {
        let scheme_end = self.url.find("://").map(|i| i + 3).unwrap_or(0);
        let rest = &self.url[scheme_end..];
        let host_end = rest
            .find(|c| c == '/' || c == '?' || c == '#')
            .unwrap_or(rest.len());
        &self.url[..scheme_end + host_end]
    }

    pub fn is_secure(&self) -> bool {
        self.url.starts_with("https://") || self.url.starts_with("wss://")
    }

    /// Whether the negotiated protocol multiplexes requests on one
    /// connection.
    pub fn is_h2(&self) -> bool {
        self.protocol == "h2" || self.protocol == "http/2" || self.protocol.starts_with("h3")
    }

    /// Records without a start and end cannot participate in the dependency
    /// graph; the builder skips them.
    pub fn has_meaningful_timing(&self) -> bool {
        self.start_time >= 0.0 && self.end_time > self.start_time
    }

    /// Whether this request blocks rendering (synchronous CSS/JS in the
    /// document head, approximated by type and priority).
    pub fn is_render_blocking(&self) -> bool {
        matches!(
            self.resource_type,
            ResourceType::Stylesheet | ResourceType::Script
        ) && self.priority >= RequestPriority::High
    }
}
