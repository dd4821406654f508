//! WWKS wire schema.
//!
//! Every document on the wire is a `WWKS` envelope carrying `Version` and
//! `TimeStamp` attributes and exactly one message element. Attributes are
//! mapped with the `@` prefix used by `quick-xml`'s serde support; child
//! elements map by name. Inbound structs default every field so that a robot
//! omitting an optional attribute does not fail the whole document.
//!
//! ```text
//! <WWKS Version="2.0" TimeStamp="2024-01-01T12:00:00Z">
//!   <StockInfoResponse Id="120000001[X1]" Source="999" Destination="100">
//!     <Article Id="X1" Name="..." DosageForm="..." PackagingUnit="..." Quantity="5"/>
//!   </StockInfoResponse>
//! </WWKS>
//! ```

use serde::{Deserialize, Serialize};

/// Protocol version written on every outbound envelope.
pub const WWKS_VERSION: &str = "2.0";

/// Closing tag of the envelope; marks the end of a frame on the wire.
pub const WWKS_END_TAG: &str = "</WWKS>";

/// `Destination` used for robot-directed requests.
pub const ROBOT_DESTINATION: &str = "999";

// ---------------------------------------------------------------------------
// Inbound envelope
// ---------------------------------------------------------------------------

/// A decoded inbound document. At most one message field is populated.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Envelope {
    #[serde(rename = "@Version")]
    pub version: String,
    #[serde(rename = "@TimeStamp")]
    pub timestamp: String,

    #[serde(rename = "HelloResponse")]
    pub hello_response: Option<HelloResponse>,
    #[serde(rename = "StatusResponse")]
    pub status_response: Option<StatusResponse>,
    #[serde(rename = "StockInfoResponse")]
    pub stock_info_response: Option<StockInfoResponse>,
    #[serde(rename = "OutputResponse")]
    pub output_response: Option<OutputResponse>,
    #[serde(rename = "OutputMessage")]
    pub output_message: Option<OutputMessage>,
    #[serde(rename = "InputMessage")]
    pub input_message: Option<InputMessage>,
    #[serde(rename = "TaskInfoResponse")]
    pub task_info_response: Option<TaskInfoResponse>,
    #[serde(rename = "KeepAliveRequest")]
    pub keep_alive_request: Option<KeepAlive>,
}

// ---------------------------------------------------------------------------
// Hello / status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HelloResponse {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "Subscriber")]
    pub subscriber: Option<Subscriber>,
}

/// Subscriber block of a hello exchange; sent by us, echoed by the robot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscriber {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Type")]
    pub kind: String,
    #[serde(rename = "@Manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "@ProductInfo")]
    pub product_info: String,
    #[serde(rename = "@VersionInfo")]
    pub version_info: String,
    #[serde(rename = "@TenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(rename = "Capability")]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capability {
    #[serde(rename = "@Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "@State")]
    pub state: String,
    #[serde(rename = "Component")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Component {
    #[serde(rename = "@Type")]
    pub kind: String,
    #[serde(rename = "@Description")]
    pub description: String,
    #[serde(rename = "@State")]
    pub state: String,
    #[serde(rename = "@StateText")]
    pub state_text: String,
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StockInfoResponse {
    /// Echo of the request id, possibly bracket-encoded.
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Article")]
    pub articles: Vec<Article>,
}

/// A stocked article as reported by the robot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Article {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@DosageForm")]
    pub dosage_form: String,
    #[serde(rename = "@PackagingUnit")]
    pub packaging_unit: String,
    #[serde(rename = "@Quantity")]
    pub quantity: u32,
    #[serde(rename = "@MaxSubItemQuantity")]
    pub max_sub_item_quantity: u32,
    #[serde(rename = "Pack")]
    pub packs: Vec<Pack>,
}

/// A physical pack. Dimensions are in millimetres.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pack {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@BatchNumber")]
    pub batch_number: String,
    #[serde(rename = "@ExternalId")]
    pub external_id: String,
    #[serde(rename = "@ExpiryDate")]
    pub expiry_date: String,
    #[serde(rename = "@Depth")]
    pub depth: u32,
    #[serde(rename = "@Width")]
    pub width: u32,
    #[serde(rename = "@Height")]
    pub height: u32,
    #[serde(rename = "@Shape")]
    pub shape: String,
    #[serde(rename = "@State")]
    pub state: String,
    #[serde(rename = "@OutputDestination")]
    pub output_destination: String,
    #[serde(rename = "@LabelStatus")]
    pub label_status: String,
    #[serde(rename = "@BoxNumber")]
    pub box_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputMessage {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Article")]
    pub articles: Vec<Article>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputResponse {
    /// Echo of the output request id, i.e. the order id.
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Details")]
    pub details: Option<OutputDetails>,
    #[serde(rename = "Criteria")]
    pub criteria: Vec<OutputCriteria>,
}

impl OutputResponse {
    pub fn status(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.status.as_deref())
            .unwrap_or("")
    }

    /// Article id of the first criteria line.
    pub fn article_id(&self) -> &str {
        self.criteria.first().map(|c| c.article_id.as_str()).unwrap_or("")
    }
}

/// `Details` of an output request/response/event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputDetails {
    #[serde(rename = "@Priority")]
    pub priority: String,
    #[serde(rename = "@OutputDestination")]
    pub output_destination: String,
    #[serde(rename = "@OutputPoint", skip_serializing_if = "Option::is_none")]
    pub output_point: Option<String>,
    #[serde(rename = "@Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One article line of an output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputCriteria {
    #[serde(rename = "@ArticleId")]
    pub article_id: String,
    #[serde(rename = "@Quantity")]
    pub quantity: u32,
}

/// Robot-initiated event reporting progress of an output order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputMessage {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Details")]
    pub details: Option<OutputDetails>,
    #[serde(rename = "Article")]
    pub articles: Vec<OutputArticle>,
}

impl OutputMessage {
    pub fn status(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.status.as_deref())
            .unwrap_or("")
    }

    pub fn article_id(&self) -> &str {
        self.articles.first().map(|a| a.id.as_str()).unwrap_or("")
    }
}

/// Article line of an output event: the packs actually dispensed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputArticle {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "Pack")]
    pub packs: Vec<Pack>,
}

// ---------------------------------------------------------------------------
// Task info
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaskInfoResponse {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Task")]
    pub task: Option<TaskInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaskInfo {
    #[serde(rename = "@Type")]
    pub kind: String,
    /// Id of the order the task refers to.
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Status")]
    pub status: String,
    #[serde(rename = "Article")]
    pub articles: Vec<OutputArticle>,
    #[serde(rename = "Box")]
    pub boxes: Vec<BoxInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoxInfo {
    #[serde(rename = "@Number")]
    pub number: String,
}

// ---------------------------------------------------------------------------
// Keep-alive
// ---------------------------------------------------------------------------

/// Keep-alive request (inbound) and response (outbound) share one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAlive {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
}

// ---------------------------------------------------------------------------
// Outbound requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelloRequest {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "Subscriber")]
    pub subscriber: Subscriber,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRequest {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@IncludeDetails")]
    pub include_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockInfoRequest {
    /// Plain id for a full refresh, bracket-encoded for a targeted probe.
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "@IncludePacks")]
    pub include_packs: String,
    #[serde(rename = "@IncludeArticleDetails")]
    pub include_article_details: String,
    #[serde(rename = "Criteria")]
    pub criteria: Vec<StockCriteria>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockCriteria {
    #[serde(rename = "@ArticleId", skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(rename = "@StockLocationId", skip_serializing_if = "Option::is_none")]
    pub stock_location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRequest {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "Details")]
    pub details: OutputDetails,
    #[serde(rename = "Criteria")]
    pub criteria: Vec<OutputCriteria>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfoRequest {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@Source")]
    pub source: String,
    #[serde(rename = "@Destination")]
    pub destination: String,
    #[serde(rename = "@IncludeTaskDetails")]
    pub include_task_details: String,
    #[serde(rename = "Task")]
    pub task: TaskRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRef {
    #[serde(rename = "@Type")]
    pub kind: String,
    #[serde(rename = "@Id")]
    pub id: String,
}

/// Any request the client puts on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello(HelloRequest),
    Status(StatusRequest),
    StockInfo(StockInfoRequest),
    Output(OutputRequest),
    TaskInfo(TaskInfoRequest),
    KeepAlive(KeepAlive),
}

impl Request {
    /// Client-generated `Id` of the request.
    pub fn id(&self) -> &str {
        match self {
            Self::Hello(r) => &r.id,
            Self::Status(r) => &r.id,
            Self::StockInfo(r) => &r.id,
            Self::Output(r) => &r.id,
            Self::TaskInfo(r) => &r.id,
            Self::KeepAlive(r) => &r.id,
        }
    }

    /// Element name of the request on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HelloRequest",
            Self::Status(_) => "StatusRequest",
            Self::StockInfo(_) => "StockInfoRequest",
            Self::Output(_) => "OutputRequest",
            Self::TaskInfo(_) => "TaskInfoRequest",
            Self::KeepAlive(_) => "KeepAliveResponse",
        }
    }
}

/// Outbound envelope; exactly one body field is set.
#[derive(Debug, Serialize)]
#[serde(rename = "WWKS")]
pub(crate) struct OutboundEnvelope<'a> {
    #[serde(rename = "@Version")]
    pub version: &'a str,
    #[serde(rename = "@TimeStamp")]
    pub timestamp: &'a str,
    #[serde(rename = "HelloRequest", skip_serializing_if = "Option::is_none")]
    pub hello: Option<&'a HelloRequest>,
    #[serde(rename = "StatusRequest", skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a StatusRequest>,
    #[serde(rename = "StockInfoRequest", skip_serializing_if = "Option::is_none")]
    pub stock_info: Option<&'a StockInfoRequest>,
    #[serde(rename = "OutputRequest", skip_serializing_if = "Option::is_none")]
    pub output: Option<&'a OutputRequest>,
    #[serde(rename = "TaskInfoRequest", skip_serializing_if = "Option::is_none")]
    pub task_info: Option<&'a TaskInfoRequest>,
    #[serde(rename = "KeepAliveResponse", skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<&'a KeepAlive>,
}
