//! API client for communicating with the Demand Forecast API

use reqwest::{Client, Response};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Query parameters for one request
pub type Query = Vec<(&'static str, String)>;

/// API client for the Demand Forecast API
pub struct ApiClient {
    client: Client,
    stream_client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        // streams stay open for minutes; only bound the connect phase
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            stream_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T, ClientError> {
        let url = self.base_url.join(path)?;

        let response = self.client.get(url).query(query).send().await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Consume a server-sent event stream, handing each `data` payload to
    /// `on_event` until it returns `false` or the server closes the stream.
    /// Returns the number of events delivered.
    pub async fn stream<F>(&self, path: &str, query: &Query, mut on_event: F) -> Result<usize, ClientError>
    where
        F: FnMut(&str) -> Result<bool, ClientError>,
    {
        let url = self.base_url.join(path)?;

        let response = self
            .stream_client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let mut response = check_status(response).await?;

        let mut decoder = SseDecoder::default();
        let mut delivered = 0;
        while let Some(chunk) = response.chunk().await? {
            for event in decoder.push(&chunk) {
                delivered += 1;
                if !on_event(&event)? {
                    return Ok(delivered);
                }
            }
        }
        Ok(delivered)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (err.code, err.error),
        Err(_) => ("unknown".to_string(), body),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk; returns the `data` of every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + sep_len).collect();
            let text = String::from_utf8_lossy(&frame[..end]);
            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if !data.is_empty() {
                events.push(data.join("\n"));
            }
        }
        events
    }
}

fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaInfo {
    pub model_type: String,
    pub features: Vec<String>,
    pub q05: f64,
    pub q95: f64,
    pub created_at_utc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub time: String,
    pub p50: f64,
    pub p90_range: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAllocation {
    pub zone: String,
    pub demand: f64,
    pub alloc_ev: u32,
    pub alloc_ice: u32,
    pub alloc_total: u32,
    pub capacity_est: f64,
    pub unserved: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositionMove {
    pub from: String,
    pub to: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub zone_alloc: Vec<ZoneAllocation>,
    pub reposition_ev: Vec<RepositionMove>,
    pub reposition_ice: Vec<RepositionMove>,
}

/// One `/forecast_zones` row: `time` plus one numeric column per zone
///
/// Zone columns keep the order the server sent them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneForecastRow {
    pub time: String,
    pub zones: Vec<(String, f64)>,
}

impl ZoneForecastRow {
    pub fn value(&self, zone: &str) -> Option<f64> {
        self.zones
            .iter()
            .find(|(name, _)| name == zone)
            .map(|(_, v)| *v)
    }
}

impl Serialize for ZoneForecastRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.zones.len() + 1))?;
        map.serialize_entry("time", &self.time)?;
        for (zone, value) in &self.zones {
            map.serialize_entry(zone, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ZoneForecastRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = ZoneForecastRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a zone forecast row with a time field")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut time = None;
                let mut zones = Vec::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == "time" {
                        time = Some(access.next_value::<String>()?);
                    } else {
                        zones.push((key, access.next_value::<f64>()?));
                    }
                }
                let time = time.ok_or_else(|| <A::Error as serde::de::Error>::missing_field("time"))?;
                Ok(ZoneForecastRow { time, zones })
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_decoder_splits_frames_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [{\"p50\"").is_empty());
        let events = decoder.push(b": 51}]\n\ndata: x\n");
        assert_eq!(events, vec!["[{\"p50\": 51}]"]);
        assert_eq!(decoder.push(b"\n"), vec!["x"]);
    }

    #[test]
    fn test_decoder_handles_crlf_and_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\r\n\r\ndata:{\"a\":1}\r\n\r\n");
        assert_eq!(events, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = ApiClient::new("http://localhost:8000/demand").unwrap();
        assert_eq!(
            client.base_url().join("forecast").unwrap().as_str(),
            "http://localhost:8000/demand/forecast"
        );
        assert!(ApiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_get_forecast_sends_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("horizon".into(), "2".into()),
                Matcher::UrlEncoded("last_y".into(), "50".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"time":"2024-01-01T01:00:00Z","p50":51.0,"p90_range":[39.0,63.0]},
                    {"time":"2024-01-01T02:00:00Z","p50":52.0,"p90_range":[40.0,64.0]}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let query: Query = vec![("horizon", "2".to_string()), ("last_y", "50".to_string())];
        let points: Vec<ForecastPoint> = client.get("forecast", &query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].p90_range, [40.0, 64.0]);
    }

    #[tokio::test]
    async fn test_api_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/forecast")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"horizon must be between 1 and 168, got 0","code":"invalid_input"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<Vec<ForecastPoint>>("forecast", &vec![("horizon", "0".to_string())])
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "invalid_input");
                assert!(message.contains("horizon"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zone_rows_flatten_zone_columns() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/forecast_zones")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"time":"2024-01-01T01:00:00Z","Downtown":20.8,"Mall":30.8}]"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let rows: Vec<ZoneForecastRow> = client.get("forecast_zones", &Query::new()).await.unwrap();

        assert_eq!(rows[0].value("Downtown"), Some(20.8));
        assert_eq!(rows[0].zones.len(), 2);
    }

    #[test]
    fn test_zone_rows_keep_server_column_order() {
        let body = r#"{"time":"2024-01-01T01:00:00Z","University":40.8,"Downtown":20.8,"Mall":30.8}"#;
        let row: ZoneForecastRow = serde_json::from_str(body).unwrap();

        let names: Vec<&str> = row.zones.iter().map(|(z, _)| z.as_str()).collect();
        assert_eq!(names, vec!["University", "Downtown", "Mall"]);
        assert_eq!(row.value("Hospital"), None);
        assert_eq!(serde_json::to_string(&row).unwrap(), body);

        assert!(serde_json::from_str::<ZoneForecastRow>(r#"{"Mall":1.0}"#).is_err());
    }

    #[tokio::test]
    async fn test_stream_stops_when_callback_declines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: [1]\n\ndata: [2]\n\ndata: [3]\n\n")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let mut seen = Vec::new();
        let delivered = client
            .stream("stream", &Query::new(), |event| {
                seen.push(event.to_string());
                Ok(seen.len() < 2)
            })
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(seen, vec!["[1]", "[2]"]);
    }
}
