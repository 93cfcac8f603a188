use super::{http_client, PinBackend};
use crate::error::{ConfigError, PinError};
use async_trait::async_trait;
use notary_artifact::ArtifactName;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;

/// One line of the `/api/v0/add` response
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Pins files through the IPFS HTTP API
#[derive(Debug, Clone)]
pub struct IpfsPinBackend {
    add_url: String,
    client: reqwest::Client,
}

impl IpfsPinBackend {
    /// Create a backend for the API at `endpoint` (e.g. `http://127.0.0.1:5001`)
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(endpoint: &str) -> Result<Self, ConfigError> {
        let base = endpoint.trim().trim_end_matches('/');
        Ok(Self {
            add_url: format!("{base}/api/v0/add?pin=true"),
            client: http_client()?,
        })
    }

    /// Full add URL
    #[must_use]
    pub fn add_url(&self) -> &str {
        &self.add_url
    }
}

/// Extract the CID from an add response; the API streams one JSON object
/// per line and the last one describes the submitted file
fn parse_add_response(body: &str) -> Result<String, PinError> {
    let line = body
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| PinError::MalformedResponse("empty response".into()))?;
    let parsed: AddResponse =
        serde_json::from_str(line).map_err(|e| PinError::MalformedResponse(e.to_string()))?;
    if parsed.hash.is_empty() {
        return Err(PinError::MalformedResponse("empty Hash field".into()));
    }
    Ok(parsed.hash)
}

#[async_trait]
impl PinBackend for IpfsPinBackend {
    fn kind(&self) -> &'static str {
        "ipfs"
    }

    async fn pin(&self, name: &ArtifactName, content: Arc<[u8]>) -> Result<String, PinError> {
        let part = Part::bytes(content.to_vec()).file_name(name.file_name().to_string());
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.add_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PinError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PinError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(PinError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_add_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_url_normalizes_trailing_slash() {
        let backend = IpfsPinBackend::new("http://127.0.0.1:5001/").unwrap();
        assert_eq!(backend.add_url(), "http://127.0.0.1:5001/api/v0/add?pin=true");
    }

    #[test]
    fn parses_single_object() {
        let body = r#"{"Name":"a.csv","Hash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","Size":"12"}"#;
        assert_eq!(
            parse_add_response(body).unwrap(),
            "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
        );
    }

    #[test]
    fn parses_last_streamed_line() {
        let body = "{\"Name\":\"x\",\"Hash\":\"QmFirst\"}\n{\"Name\":\"x\",\"Hash\":\"QmLast\"}\n";
        assert_eq!(parse_add_response(body).unwrap(), "QmLast");
    }

    #[test]
    fn rejects_missing_hash() {
        assert!(matches!(
            parse_add_response("{\"Name\":\"x\"}"),
            Err(PinError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_add_response("\n"),
            Err(PinError::MalformedResponse(_))
        ));
    }
}
