//! Request context handed to the decision maker

use tally_core::{Data, GraphData, RequestType};

/// A validated request waiting for a sequence
///
/// `existing` is the record as it stood when the request was admitted, if
/// there was one. Authorization and indexing collaborators fill it in; the
/// decision maker only inspects `request_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_type: Option<RequestType>,
    pub data: Data,
    pub existing: Option<GraphData>,
}

impl RequestContext {
    pub fn new(request_type: RequestType, data: Data) -> Self {
        Self {
            request_type: Some(request_type),
            data,
            existing: None,
        }
    }

    /// Context for inserting a new record
    pub fn create(data: Data) -> Self {
        Self::new(RequestType::Create, data)
    }

    /// Context for overwriting a record
    pub fn update(data: Data) -> Self {
        Self::new(RequestType::Update, data)
    }

    /// Context for removing a record
    pub fn delete(data: Data) -> Self {
        Self::new(RequestType::Delete, data)
    }

    /// Attach the record as it currently stands
    pub fn with_existing(mut self, existing: GraphData) -> Self {
        self.existing = Some(existing);
        self
    }

    /// Id of the record the request targets
    pub fn data_id(&self) -> &str {
        &self.data.id
    }
}
