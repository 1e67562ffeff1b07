//! DevTools network log normalization.
//!
//! Replays `Network.*` protocol messages into finished
//! [`NetworkRequestRecord`]s, splitting redirect chains into one record per
//! leg and accumulating transfer sizes as data arrives.

use std::collections::HashMap;

use lantern_core::network::{
    Initiator, NetworkRequestRecord, RequestPriority, ResourceTiming, ResourceType,
};
use lantern_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message from the DevTools protocol log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevtoolsMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Replays protocol messages into request records.
pub struct NetworkRecorder {
    in_flight: HashMap<String, NetworkRequestRecord>,
    finished: Vec<NetworkRequestRecord>,
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self {
            in_flight: HashMap::new(),
            finished: Vec::new(),
        }
    }

    /// Convert a full log into records, sorted by start time.
    pub fn records_from_log(log: &[DevtoolsMessage]) -> Result<Vec<NetworkRequestRecord>> {
        let mut recorder = Self::new();
        for message in log {
            recorder.dispatch(message)?;
        }
        Ok(recorder.into_records())
    }

    fn dispatch(&mut self, message: &DevtoolsMessage) -> Result<()> {
        match message.method.as_str() {
            "Network.requestWillBeSent" => self.on_request_will_be_sent(&message.params),
            "Network.responseReceived" => self.on_response_received(&message.params),
            "Network.dataReceived" => self.on_data_received(&message.params),
            "Network.loadingFinished" => self.on_loading_finished(&message.params),
            "Network.loadingFailed" => self.on_loading_failed(&message.params),
            _ => Ok(()),
        }
    }

    /// Records that finished (or failed) during the log, in start order.
    pub fn into_records(mut self) -> Vec<NetworkRequestRecord> {
        // Requests still in flight at the end of the log are kept; the graph
        // builder filters on meaningful timing.
        self.finished.extend(self.in_flight.into_values());
        self.finished
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.request_id.cmp(&b.request_id)));
        self.finished
    }

    fn on_request_will_be_sent(&mut self, params: &Value) -> Result<()> {
        let request_id = required_str(params, "requestId")?.to_string();
        let request = params
            .get("request")
            .ok_or_else(|| Error::MalformedInput("requestWillBeSent without request".to_string()))?;
        let url = required_str(request, "url")?.to_string();
        let timestamp_ms = required_f64(params, "timestamp")? * 1000.0;

        // A second willBeSent for a known id is a redirect: finish the prior
        // leg and chain the new one to it.
        let redirect_source_id = if let Some(mut prior) = self.in_flight.remove(&request_id) {
            // Multi-hop chains keep appending the suffix so every leg stays
            // uniquely addressable.
            let mut redirect_id = format!("{}:redirect", request_id);
            while self.finished.iter().any(|r| r.request_id == redirect_id) {
                redirect_id.push_str(":redirect");
            }
            prior.request_id = redirect_id.clone();
            prior.end_time = timestamp_ms;
            prior.response_received_time = timestamp_ms;
            prior.finished = true;
            prior.redirect_destination_id = Some(request_id.clone());
            if let Some(response) = params.get("redirectResponse") {
                prior.status_code = response.get("status").and_then(|s| s.as_i64()).unwrap_or(-1);
            }
            self.finished.push(prior);
            Some(redirect_id)
        } else {
            None
        };

        let record = NetworkRequestRecord {
            request_id: request_id.clone(),
            url,
            document_url: params
                .get("documentURL")
                .and_then(|u| u.as_str())
                .unwrap_or("")
                .to_string(),
            start_time: timestamp_ms,
            response_received_time: -1.0,
            end_time: -1.0,
            transfer_size: 0,
            resource_size: 0,
            resource_type: params
                .get("type")
                .and_then(|t| t.as_str())
                .map(ResourceType::from_protocol)
                .unwrap_or(ResourceType::Other),
            status_code: -1,
            priority: request
                .get("initialPriority")
                .and_then(|p| p.as_str())
                .map(RequestPriority::from_protocol)
                .unwrap_or(RequestPriority::Medium),
            protocol: String::new(),
            timing: None,
            initiator: parse_initiator(params.get("initiator")),
            redirect_source_id,
            redirect_destination_id: None,
            finished: false,
            failed: false,
            from_cache: false,
        };
        self.in_flight.insert(request_id, record);
        Ok(())
    }

    fn on_response_received(&mut self, params: &Value) -> Result<()> {
        let request_id = required_str(params, "requestId")?;
        let Some(record) = self.in_flight.get_mut(request_id) else {
            return Ok(());
        };
        let Some(response) = params.get("response") else {
            return Ok(());
        };

        record.response_received_time = required_f64(params, "timestamp")? * 1000.0;
        record.status_code = response.get("status").and_then(|s| s.as_i64()).unwrap_or(-1);
        record.protocol = response
            .get("protocol")
            .and_then(|p| p.as_str())
            .unwrap_or("http/1.1")
            .to_string();
        record.from_cache = response
            .get("fromDiskCache")
            .and_then(|c| c.as_bool())
            .unwrap_or(false)
            || response
                .get("fromMemoryCache")
                .and_then(|c| c.as_bool())
                .unwrap_or(false);
        if let Some(kind) = params.get("type").and_then(|t| t.as_str()) {
            record.resource_type = ResourceType::from_protocol(kind);
        }
        if let Some(timing) = response.get("timing") {
            record.timing = Some(parse_timing(timing));
        }
        Ok(())
    }

    fn on_data_received(&mut self, params: &Value) -> Result<()> {
        let request_id = required_str(params, "requestId")?;
        if let Some(record) = self.in_flight.get_mut(request_id) {
            record.transfer_size += params
                .get("encodedDataLength")
                .and_then(|l| l.as_u64())
                .unwrap_or(0);
            record.resource_size += params.get("dataLength").and_then(|l| l.as_u64()).unwrap_or(0);
        }
        Ok(())
    }

    fn on_loading_finished(&mut self, params: &Value) -> Result<()> {
        let request_id = required_str(params, "requestId")?;
        if let Some(mut record) = self.in_flight.remove(request_id) {
            record.end_time = required_f64(params, "timestamp")? * 1000.0;
            record.finished = true;
            if let Some(total) = params.get("encodedDataLength").and_then(|l| l.as_u64()) {
                if total > 0 {
                    record.transfer_size = total;
                }
            }
            self.finished.push(record);
        }
        Ok(())
    }

    fn on_loading_failed(&mut self, params: &Value) -> Result<()> {
        let request_id = required_str(params, "requestId")?;
        if let Some(mut record) = self.in_flight.remove(request_id) {
            record.end_time = required_f64(params, "timestamp")? * 1000.0;
            record.failed = true;
            self.finished.push(record);
        }
        Ok(())
    }
}

impl Default for NetworkRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn required_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedInput(format!("network log message missing '{}'", key)))
}

fn required_f64(value: &Value, key: &str) -> Result<f64> {
    value
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::MalformedInput(format!("network log message missing '{}'", key)))
}

fn parse_initiator(initiator: Option<&Value>) -> Initiator {
    let Some(initiator) = initiator else {
        return Initiator::Other;
    };
    match initiator.get("type").and_then(|t| t.as_str()) {
        Some("parser") => Initiator::Parser {
            url: initiator
                .get("url")
                .and_then(|u| u.as_str())
                .unwrap_or("")
                .to_string(),
        },
        Some("script") => {
            let stack_urls = initiator
                .get("stack")
                .and_then(|s| s.get("callFrames"))
                .and_then(|f| f.as_array())
                .map(|frames| {
                    frames
                        .iter()
                        .filter_map(|f| f.get("url").and_then(|u| u.as_str()))
                        .filter(|u| !u.is_empty())
                        .map(|u| u.to_string())
                        .collect()
                })
                .unwrap_or_default();
            Initiator::Script { stack_urls }
        }
        Some("preload") => Initiator::Preload,
        _ => Initiator::Other,
    }
}

fn parse_timing(timing: &Value) -> ResourceTiming {
    let field = |key: &str| timing.get(key).and_then(|v| v.as_f64()).unwrap_or(-1.0);
    ResourceTiming {
        dns_start: field("dnsStart"),
        dns_end: field("dnsEnd"),
        connect_start: field("connectStart"),
        connect_end: field("connectEnd"),
        ssl_start: field("sslStart"),
        ssl_end: field("sslEnd"),
        send_start: field("sendStart"),
        send_end: field("sendEnd"),
        receive_headers_end: field("receiveHeadersEnd"),
    }
}
