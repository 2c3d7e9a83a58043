use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use log::{error, info};
use serde::{Deserialize, Serialize, Serializer};

use super::config::LookupConfig;
use super::response::{json_response, ProxyResponse};
use super::store::{ComputerStore, Item, StoreError};

/// Body of every 500 answered by the handler.
pub const LOOKUP_FAILED_MESSAGE: &str = "Error getting user computers info.";

const USER_ID_PARAM: &str = "userId";
const COMPUTERS_ATTRIBUTE: &str = "computers";

/// Subset of the API Gateway proxy event the handler reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
}

impl ProxyRequest {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            path_parameters: Some(HashMap::from([(USER_ID_PARAM.to_string(), user_id.into())])),
        }
    }

    fn user_id(&self) -> Result<&str, LookupError> {
        self.path_parameters
            .as_ref()
            .and_then(|params| params.get(USER_ID_PARAM))
            .map(String::as_str)
            .ok_or(LookupError::MissingUserId)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request has no `userId` path parameter")]
    MissingUserId,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Integer coerced from a stored computer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputerCount {
    /// No item stored for the user; answered as `0`.
    Absent,
    Parsed(i64),
    /// Item present but not integer-like; answered as `null`.
    Unparseable,
}

impl ComputerCount {
    pub fn from_item(item: Option<&Item>) -> Self {
        let Some(item) = item else {
            return Self::Absent;
        };
        let raw = match item.get(COMPUTERS_ATTRIBUTE) {
            Some(AttributeValue::N(value)) | Some(AttributeValue::S(value)) => value.as_str(),
            _ => return Self::Unparseable,
        };
        parse_leading_int(raw).map_or(Self::Unparseable, Self::Parsed)
    }

    pub fn value(self) -> Option<i64> {
        match self {
            Self::Absent => Some(0),
            Self::Parsed(value) => Some(value),
            Self::Unparseable => None,
        }
    }
}

impl Serialize for ComputerCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value() {
            Some(value) => serializer.serialize_i64(value),
            None => serializer.serialize_none(),
        }
    }
}

/// Value of the `computers` field in a successful answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Computers {
    Listed(Vec<String>),
    Count(ComputerCount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputersBody {
    pub computers: Computers,
}

/// Parses the integer prefix of `input`: leading whitespace, an optional
/// sign, then at least one ASCII digit. Trailing text is ignored and
/// values past the `i64` range saturate at its bounds.
pub fn parse_leading_int(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = rest
        .bytes()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let value = rest.bytes().take(digits).fold(0i64, |value, byte| {
        let digit = i64::from(byte - b'0');
        if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        }
    });
    Some(value)
}

/// Request handler owning its store client.
pub struct ComputerLookup<S> {
    store: S,
    config: LookupConfig,
}

impl<S: ComputerStore> ComputerLookup<S> {
    pub fn new(store: S, config: LookupConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Answers one proxy request. Never fails: every error becomes a 500.
    pub async fn handle(&self, request: &ProxyRequest) -> ProxyResponse {
        match self.lookup(request).await {
            Ok(body) => json_response(200, &body),
            Err(err) => {
                error!("{err}");
                json_response(500, LOOKUP_FAILED_MESSAGE)
            }
        }
    }

    async fn lookup(&self, request: &ProxyRequest) -> Result<ComputersBody, LookupError> {
        let user_id = request.user_id()?.to_lowercase();
        let count = self.get_computers(&user_id).await?;
        // The placeholder wins over the stored value until the table is populated.
        let computers = match &self.config.placeholder {
            Some(ids) => Computers::Listed(ids.clone()),
            None => Computers::Count(count),
        };
        Ok(ComputersBody { computers })
    }

    async fn get_computers(&self, user_id: &str) -> Result<ComputerCount, LookupError> {
        let item = self.store.get_computer_record(user_id).await?;
        if item.is_none() {
            info!("No user data found.");
        }
        Ok(ComputerCount::from_item(item.as_ref()))
    }
}
