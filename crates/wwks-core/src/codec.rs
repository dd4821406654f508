//! XML encode/decode of WWKS documents via `quick-xml`'s serde support.

use crate::error::{Result, WwksError};
use crate::types::{Envelope, OutboundEnvelope, Request, WWKS_VERSION};

/// Deserialize a complete inbound frame.
pub fn decode(frame: &str) -> Result<Envelope> {
    quick_xml::de::from_str::<Envelope>(frame.trim())
        .map_err(|e| WwksError::Parse(e.to_string()))
}

/// Serialize `request` inside a `WWKS` envelope stamped with `timestamp`.
pub fn encode(request: &Request, timestamp: &str) -> Result<String> {
    let mut envelope = OutboundEnvelope {
        version: WWKS_VERSION,
        timestamp,
        hello: None,
        status: None,
        stock_info: None,
        output: None,
        task_info: None,
        keep_alive: None,
    };
    match request {
        Request::Hello(r) => envelope.hello = Some(r),
        Request::Status(r) => envelope.status = Some(r),
        Request::StockInfo(r) => envelope.stock_info = Some(r),
        Request::Output(r) => envelope.output = Some(r),
        Request::TaskInfo(r) => envelope.task_info = Some(r),
        Request::KeepAlive(r) => envelope.keep_alive = Some(r),
    }
    quick_xml::se::to_string(&envelope)
        .map_err(|e| WwksError::Encode(format!("{}: {e}", request.tag())))
}
