use sandbox_executor::Status;
use serde::{Deserialize, Serialize};

/// Body of every non-200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: Status,
    pub message: String,
}
