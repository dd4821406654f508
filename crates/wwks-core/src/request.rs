//! Builders for every request the client sends.
//!
//! [`RequestFactory`] holds the client identity from the config and a
//! session-wide [`IdGenerator`], so every request it produces carries a
//! unique time-based `Id`. It is shared (`Arc`) between the engine and the
//! connection, which needs a fresh hello on every reconnect.

use crate::config::ClientConfig;
use crate::correlation;
use crate::error::Result;
use crate::time_util::IdGenerator;
use crate::types::*;

/// Capabilities announced in the hello request.
pub const CAPABILITIES: [&str; 5] = ["KeepAlive", "Status", "StockInfo", "Output", "TaskInfo"];

/// Subscriber type of a client system.
const SUBSCRIBER_TYPE: &str = "IMS";

const TRUE: &str = "True";
const FALSE: &str = "False";

pub struct RequestFactory {
    source: String,
    stock_location: String,
    subscriber: Subscriber,
    ids: IdGenerator,
}

impl RequestFactory {
    pub fn new(config: &ClientConfig) -> Self {
        let source = config.source_id.to_string();
        let subscriber = Subscriber {
            id: source.clone(),
            kind: SUBSCRIBER_TYPE.into(),
            manufacturer: config.subscriber.manufacturer.clone(),
            product_info: config.subscriber.product_info.clone(),
            version_info: config.subscriber.version_info.clone(),
            tenant_id: None,
            capabilities: CAPABILITIES
                .iter()
                .map(|c| Capability { name: (*c).into() })
                .collect(),
        };
        Self {
            source,
            stock_location: config.stock_location.clone(),
            subscriber,
            ids: IdGenerator::new(),
        }
    }

    /// Our `Source` id.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// Session handshake announcing our capabilities.
    pub fn hello(&self) -> Request {
        Request::Hello(HelloRequest {
            id: self.next_id(),
            subscriber: self.subscriber.clone(),
        })
    }

    /// Robot status query with component details.
    pub fn status(&self) -> Request {
        Request::Status(StatusRequest {
            id: self.next_id(),
            source: self.source.clone(),
            include_details: TRUE.into(),
        })
    }

    /// Full stock query for the configured stock location.
    pub fn full_stock(&self) -> Request {
        Request::StockInfo(StockInfoRequest {
            id: self.next_id(),
            source: self.source.clone(),
            destination: ROBOT_DESTINATION.into(),
            include_packs: FALSE.into(),
            include_article_details: FALSE.into(),
            criteria: vec![StockCriteria {
                article_id: None,
                stock_location_id: Some(self.stock_location.clone()),
            }],
        })
    }

    /// Targeted stock query for one article. The article id is bracket-encoded
    /// into the request id, based on `base_id` (an order id) or a fresh id.
    pub fn probe(&self, base_id: Option<&str>, article_id: &str) -> Result<Request> {
        let base = match base_id {
            Some(id) => id.to_string(),
            None => self.next_id(),
        };
        Ok(Request::StockInfo(StockInfoRequest {
            id: correlation::encode(&base, article_id)?,
            source: self.source.clone(),
            destination: ROBOT_DESTINATION.into(),
            include_packs: FALSE.into(),
            include_article_details: TRUE.into(),
            criteria: vec![StockCriteria {
                article_id: Some(article_id.into()),
                stock_location_id: Some(self.stock_location.clone()),
            }],
        }))
    }

    /// Output order for `quantity` packs of one article. The request id
    /// becomes the order id.
    pub fn output(
        &self,
        article_id: &str,
        quantity: u32,
        priority: &str,
        destination: &str,
    ) -> Request {
        Request::Output(OutputRequest {
            id: self.next_id(),
            source: self.source.clone(),
            destination: ROBOT_DESTINATION.into(),
            details: OutputDetails {
                priority: priority.into(),
                output_destination: destination.into(),
                output_point: None,
                status: None,
            },
            criteria: vec![OutputCriteria {
                article_id: article_id.into(),
                quantity,
            }],
        })
    }

    /// Status query for an existing output order.
    pub fn task_info(&self, order_id: &str) -> Request {
        Request::TaskInfo(TaskInfoRequest {
            id: self.next_id(),
            source: self.source.clone(),
            destination: ROBOT_DESTINATION.into(),
            include_task_details: TRUE.into(),
            task: TaskRef {
                kind: "Output".into(),
                id: order_id.into(),
            },
        })
    }
}

/// Answer to a robot keep-alive: same id, source and destination swapped.
pub fn keep_alive_response(request: &KeepAlive) -> Request {
    Request::KeepAlive(KeepAlive {
        id: request.id.clone(),
        source: request.destination.clone(),
        destination: request.source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    fn factory() -> RequestFactory {
        RequestFactory::new(&ClientConfig::default())
    }

    #[test]
    fn hello_announces_capabilities() {
        let xml = codec::encode(&factory().hello(), "t").unwrap();
        assert!(xml.contains(r#"Id="100" Type="IMS""#), "{xml}");
        for cap in CAPABILITIES {
            assert!(xml.contains(&format!(r#"<Capability Name="{cap}"/>"#)), "{xml}");
        }
    }

    #[test]
    fn ids_are_unique_across_requests() {
        let f = factory();
        let a = f.status();
        let b = f.full_stock();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn probe_reuses_order_id_as_base() {
        let req = factory().probe(Some("120000001"), "X1").unwrap();
        assert_eq!(req.id(), "120000001[X1]");
        let Request::StockInfo(r) = req else {
            panic!("not a stock request")
        };
        assert_eq!(r.include_article_details, "True");
        assert_eq!(r.criteria[0].article_id.as_deref(), Some("X1"));
    }

    #[test]
    fn full_stock_has_location_criteria_only() {
        let Request::StockInfo(r) = factory().full_stock() else {
            panic!("not a stock request")
        };
        assert!(!r.id.contains('['));
        assert_eq!(r.criteria[0].article_id, None);
        assert_eq!(r.criteria[0].stock_location_id.as_deref(), Some("None"));
    }

    #[test]
    fn output_and_task_info_shapes() {
        let f = factory();
        let xml = codec::encode(&f.output("Z9", 2, "Normal", "001"), "t").unwrap();
        let details = r#"<Details Priority="Normal" OutputDestination="001"/>"#;
        assert!(xml.contains(details), "{xml}");
        assert!(xml.contains(r#"<Criteria ArticleId="Z9" Quantity="2"/>"#), "{xml}");

        let xml = codec::encode(&f.task_info("A1"), "t").unwrap();
        let task = r#"IncludeTaskDetails="True"><Task Type="Output" Id="A1"/>"#;
        assert!(xml.contains(task), "{xml}");
    }

    #[test]
    fn keep_alive_swaps_endpoints() {
        let req = KeepAlive {
            id: "4".into(),
            source: "999".into(),
            destination: "100".into(),
        };
        let Request::KeepAlive(resp) = keep_alive_response(&req) else {
            panic!("wrong kind")
        };
        assert_eq!(resp.id, "4");
        assert_eq!(resp.source, "100");
        assert_eq!(resp.destination, "999");
    }
}
