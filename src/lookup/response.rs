use std::collections::BTreeMap;

use log::error;
use serde::{Deserialize, Serialize};

pub const JSON_MIME: &str = "application/json";

const ALLOW_HEADERS: &str = "Content-Type";
const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "OPTIONS,POST,GET, PUT";

/// Status and body returned when the payload cannot be serialized.
pub const SERIALIZE_FAILED_STATUS: u16 = 401;
pub const SERIALIZE_FAILED_BODY: &str = "Check CloudWatch Logs for Response Error";

/// Envelope understood by an API Gateway proxy integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Builds a JSON envelope carrying the permissive CORS header set.
pub fn json_response<T>(status_code: u16, body: &T) -> ProxyResponse
where
    T: Serialize + ?Sized,
{
    json_response_with_mime(status_code, body, JSON_MIME)
}

/// Same as [`json_response`] with an explicit `Content-Type`.
///
/// The serialization fallback always answers 401 whatever the cause; clients
/// in the field already key off that status.
pub fn json_response_with_mime<T>(status_code: u16, body: &T, mime: &str) -> ProxyResponse
where
    T: Serialize + ?Sized,
{
    match serde_json::to_string(body) {
        Ok(body) => ProxyResponse {
            status_code,
            headers: cors_headers(mime),
            body,
        },
        Err(err) => {
            error!("failed to serialize response body: {err}");
            ProxyResponse {
                status_code: SERIALIZE_FAILED_STATUS,
                headers: BTreeMap::from([("Content-Type".to_string(), JSON_MIME.to_string())]),
                body: SERIALIZE_FAILED_BODY.to_string(),
            }
        }
    }
}

fn cors_headers(mime: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), mime.to_string()),
        (
            "Access-Control-Allow-Headers".to_string(),
            ALLOW_HEADERS.to_string(),
        ),
        (
            "Access-Control-Allow-Origin".to_string(),
            ALLOW_ORIGIN.to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            ALLOW_METHODS.to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    fn assert_cors(response: &ProxyResponse) {
        assert_eq!(response.header("Access-Control-Allow-Headers"), Some("Content-Type"));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("OPTIONS,POST,GET, PUT")
        );
    }

    #[test]
    fn every_status_carries_cors_headers() {
        for status in [200, 404, 500] {
            let response = json_response(status, &serde_json::json!({ "ok": status == 200 }));
            assert_eq!(response.status_code, status);
            assert_eq!(response.header("Content-Type"), Some("application/json"));
            assert_cors(&response);
        }
    }

    #[test]
    fn string_bodies_are_json_encoded() {
        let response = json_response(500, "Error getting user computers info.");
        assert_eq!(response.body, "\"Error getting user computers info.\"");
    }

    #[test]
    fn custom_mime_replaces_content_type_only() {
        let response = json_response_with_mime(200, &[1, 2, 3], "text/plain");
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.body, "[1,2,3]");
        assert_cors(&response);
    }

    #[test]
    fn serialization_failure_falls_back_to_401() {
        let response = json_response(200, &Unserializable);
        assert_eq!(response.status_code, SERIALIZE_FAILED_STATUS);
        assert_eq!(response.body, SERIALIZE_FAILED_BODY);
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn envelope_serializes_with_proxy_field_names() {
        let response = json_response(200, &true);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["body"], "true");
        assert_eq!(value["headers"]["Access-Control-Allow-Origin"], "*");
    }
}
