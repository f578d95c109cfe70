use serde::{Deserialize, Serialize};

/// `data` payload of a LISTEN or UNLISTEN envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsData {
    /// Topics the request applies to.
    pub topics: Vec<String>,
}
