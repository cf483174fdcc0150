use serde::{Deserialize, Serialize};

/// Missing fields take their zero value, so `{}` is a valid request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateAccountRequest {
    pub balance: i64,
    /// Allocated by the sandbox when absent.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployRequest {
    pub from: String,
    pub value: i64,
    /// Constructor arguments, appended to `code`.
    pub input: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallRequest {
    pub from: String,
    pub to: String,
    pub value: i64,
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub status: Status,
    pub message: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub status: Status,
    pub message: String,
    /// Runtime code on success, revert data on revert.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(with = "decimal")]
    pub gas_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub status: Status,
    pub message: String,
    pub output: String,
    #[serde(with = "decimal")]
    pub gas_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub address: String,
    /// Decimal wei.
    pub balance: String,
    pub nonce: u64,
    pub code: String,
    pub storage_slots: usize,
}

/// Gas amounts travel as decimal strings.
mod decimal {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_default_missing_fields() {
        let request: DeployRequest = serde_json::from_str(r#"{"code":"0x00"}"#).unwrap();
        assert_eq!(request.code, "0x00");
        assert_eq!(request.value, 0);
        assert!(request.from.is_empty());

        let request: CreateAccountRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.balance, 0);
        assert!(request.address.is_none());
    }

    #[test]
    fn test_deploy_response_shape() {
        let response = DeployResponse {
            status: Status::Error,
            message: "contract creation failed, err: out of gas".into(),
            output: String::new(),
            address: None,
            gas_left: 0,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["gasLeft"], "0");
        assert!(json.get("address").is_none());
    }

    #[test]
    fn test_gas_left_parses_back() {
        let response: CallResponse = serde_json::from_str(
            r#"{"status":"success","message":"contract called","output":"","gasLeft":"99999994"}"#,
        )
        .unwrap();
        assert_eq!(response.gas_left, 99_999_994);
        assert_eq!(response.status, Status::Success);
    }
}
