//! Reqwest-backed client for the batched transit distance-matrix service.
//!
//! One call computes an origins x 1 matrix. Results come back keyed by the
//! position of each origin in the request, never by address.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const FIELD_MASK: &str = "duration,originIndex";
const TRAVEL_MODE: &str = "TRANSIT";

static DURATION_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:\.\d+)?s$").expect("static regex is valid"));

#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("invalid matrix request: {0}")]
    InvalidRequest(String),
    #[error("distance service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("distance service answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed distance response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct MatrixRequest {
    pub destination: String,
    pub origins: Vec<String>,
    pub api_key: String,
    pub departure: DateTime<Utc>,
}

/// One cell of the returned matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    /// Position in `MatrixRequest::origins`; may be out of range.
    pub origin_index: i64,
    /// `None` when the service found no route.
    pub duration_seconds: Option<u64>,
}

#[async_trait]
pub trait DistanceMatrix: Send + Sync {
    async fn compute_matrix(
        &self,
        request: &MatrixRequest,
    ) -> Result<Vec<MatrixEntry>, DistanceError>;
}

#[derive(Serialize)]
struct AddressDto<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct WaypointDto<'a> {
    waypoint: AddressDto<'a>,
}

#[derive(Serialize)]
struct TimestampDto {
    seconds: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatrixRequestDto<'a> {
    origins: Vec<WaypointDto<'a>>,
    destinations: Vec<WaypointDto<'a>>,
    travel_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    departure_time: TimestampDto,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecondsDto {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationDto {
    Text(String),
    Object { seconds: SecondsDto },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixElementDto {
    // proto3 JSON leaves out zero values
    #[serde(default)]
    origin_index: i64,
    #[serde(default)]
    duration: Option<DurationDto>,
}

fn duration_seconds(duration: DurationDto) -> Option<u64> {
    match duration {
        DurationDto::Text(text) => DURATION_TEXT
            .captures(text.trim())
            .and_then(|captures| captures[1].parse().ok()),
        DurationDto::Object {
            seconds: SecondsDto::Number(seconds),
        } => Some(seconds),
        DurationDto::Object {
            seconds: SecondsDto::Text(text),
        } => text.trim().parse().ok(),
    }
}

fn build_body<'a>(
    request: &'a MatrixRequest,
    language_code: Option<&'a str>,
) -> Result<MatrixRequestDto<'a>, DistanceError> {
    if request.origins.is_empty() {
        return Err(DistanceError::InvalidRequest(
            "at least one origin is required".to_string(),
        ));
    }
    let waypoint = |address: &'a str| WaypointDto {
        waypoint: AddressDto { address },
    };
    Ok(MatrixRequestDto {
        origins: request.origins.iter().map(|o| waypoint(o.as_str())).collect(),
        destinations: vec![waypoint(request.destination.as_str())],
        travel_mode: TRAVEL_MODE,
        language_code,
        departure_time: TimestampDto {
            seconds: request.departure.timestamp(),
        },
    })
}

pub fn parse_entries(body: &[u8]) -> Result<Vec<MatrixEntry>, DistanceError> {
    let elements: Vec<MatrixElementDto> = serde_json::from_slice(body)
        .map_err(|e| DistanceError::Decode(format!("expected a JSON array of elements: {}", e)))?;
    Ok(elements
        .into_iter()
        .map(|element| MatrixEntry {
            origin_index: element.origin_index,
            duration_seconds: element.duration.and_then(duration_seconds),
        })
        .collect())
}

pub struct RoutesClient {
    client: Client,
    endpoint: Url,
    language_code: Option<String>,
}

impl RoutesClient {
    pub fn new(
        endpoint: Url,
        timeout: Duration,
        language_code: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(RoutesClient {
            client,
            endpoint,
            language_code,
        })
    }
}

#[async_trait]
impl DistanceMatrix for RoutesClient {
    async fn compute_matrix(
        &self,
        request: &MatrixRequest,
    ) -> Result<Vec<MatrixEntry>, DistanceError> {
        let body = build_body(request, self.language_code.as_deref())?;

        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", &request.api_key);

        let response = self
            .client
            .post(url)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(DistanceError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).chars().take(500).collect(),
            });
        }
        parse_entries(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use chrono::TimeZone;
    use serde_json::{Value, json};

    fn request(origins: &[&str]) -> MatrixRequest {
        MatrixRequest {
            destination: "Puerta del Sol, Madrid".to_string(),
            origins: origins.iter().map(|o| o.to_string()).collect(),
            api_key: "test-key".to_string(),
            departure: Utc.with_ymd_and_hms(2026, 10, 26, 6, 30, 0).unwrap(),
        }
    }

    #[test]
    fn body_matches_wire_format() {
        let request = request(&["Calle Mayor 1, Madrid", "Gran Vía 2"]);
        let body = serde_json::to_value(build_body(&request, Some("es")).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "origins": [
                    {"waypoint": {"address": "Calle Mayor 1, Madrid"}},
                    {"waypoint": {"address": "Gran Vía 2"}}
                ],
                "destinations": [{"waypoint": {"address": "Puerta del Sol, Madrid"}}],
                "travelMode": "TRANSIT",
                "languageCode": "es",
                "departureTime": {"seconds": 1792996200}
            })
        );
    }

    #[test]
    fn empty_origins_are_rejected() {
        assert!(matches!(
            build_body(&request(&[]), None),
            Err(DistanceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn parses_both_duration_shapes() {
        let body = br#"[
            {"originIndex": 1, "duration": "1500s"},
            {"duration": {"seconds": 600}},
            {"originIndex": 2, "duration": {"seconds": "42"}},
            {"originIndex": 3, "duration": "61.5s"},
            {"originIndex": 4}
        ]"#;
        assert_eq!(
            parse_entries(body).unwrap(),
            vec![
                MatrixEntry { origin_index: 1, duration_seconds: Some(1500) },
                MatrixEntry { origin_index: 0, duration_seconds: Some(600) },
                MatrixEntry { origin_index: 2, duration_seconds: Some(42) },
                MatrixEntry { origin_index: 3, duration_seconds: Some(61) },
                MatrixEntry { origin_index: 4, duration_seconds: None },
            ]
        );
    }

    #[test]
    fn non_array_body_is_a_decode_error() {
        assert!(matches!(
            parse_entries(br#"{"error": {"code": 400}}"#),
            Err(DistanceError::Decode(_))
        ));
    }

    async fn fake_matrix(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
        let authorized = req.query_string().contains("key=test-key")
            && req
                .headers()
                .get("X-Goog-FieldMask")
                .is_some_and(|mask| mask == FIELD_MASK);
        if !authorized {
            return HttpResponse::Forbidden().body("bad credentials");
        }
        let origins = body["origins"].as_array().map(Vec::len).unwrap_or(0);
        let elements: Vec<Value> = (0..origins)
            .rev()
            .map(|i| json!({"originIndex": i, "duration": format!("{}s", 600 * (i + 1))}))
            .collect();
        HttpResponse::Ok().json(elements)
    }

    #[actix_web::test]
    async fn posts_one_batch_and_reads_indexed_results() {
        let server = HttpServer::new(|| App::new().route("/matrix", web::post().to(fake_matrix)))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let endpoint = Url::parse(&format!("http://{}/matrix", addr)).unwrap();
        let client = RoutesClient::new(endpoint.clone(), Duration::from_secs(5), None).unwrap();
        let entries = client
            .compute_matrix(&request(&["A", "B"]))
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![
                MatrixEntry { origin_index: 1, duration_seconds: Some(1200) },
                MatrixEntry { origin_index: 0, duration_seconds: Some(600) },
            ]
        );

        let mut bad = request(&["A"]);
        bad.api_key = "wrong".to_string();
        let err = client.compute_matrix(&bad).await.unwrap_err();
        assert!(matches!(err, DistanceError::Status { status, .. } if status == StatusCode::FORBIDDEN));

        handle.stop(true).await;
    }
}
