//! Resource probing
//!
//! Checks a candidate URL locally (syntax, filename, extension allow-list)
//! and then asks the server for the resource's size with a metadata-only
//! request.

use crate::error::{EngineError, NetworkErrorKind, Result};
use crate::protocol::TransferRequest;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use url::Url;

/// A URL that passed local validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResource {
    /// Parsed absolute http(s) URL
    pub url: Url,
    /// Final path segment, percent-decoded
    pub filename: String,
    /// Lowercased allow-listed extension
    pub extension: String,
}

impl ValidatedResource {
    /// The request as accepted from the caller
    pub fn request(&self) -> TransferRequest {
        TransferRequest {
            source_url: self.url.to_string(),
            declared_extension: self.extension.clone(),
        }
    }
}

/// Metadata the server reported without sending a body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// Parse `input` as an absolute http(s) URL with a host
pub fn parse_absolute_url(input: &str) -> Result<Url> {
    let url = Url::parse(input.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(EngineError::invalid_url(format!(
                "Unsupported scheme: {}",
                scheme
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(EngineError::invalid_url("URL has no host"));
    }

    Ok(url)
}

/// Validate a URL and derive its filename and extension without touching
/// the network.
pub fn validate_resource(input: &str, allowed: &[String]) -> Result<ValidatedResource> {
    let url = parse_absolute_url(input)?;
    let filename = filename_from_url(&url)?;
    let extension = extension_of(&filename, allowed);

    if !is_allowed(&extension, allowed) {
        return Err(EngineError::UnsupportedType { extension });
    }

    Ok(ValidatedResource {
        url,
        filename,
        extension,
    })
}

/// Final path segment of the URL, percent-decoded.
///
/// An empty segment (e.g. `https://host/`) yields an empty name, which the
/// allow-list then rejects. Decoded names that could escape the download
/// directory are rejected outright.
pub fn filename_from_url(url: &Url) -> Result<String> {
    let raw = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .map_err(|e| EngineError::invalid_url(format!("Bad percent-encoding: {}", e)))?;

    if decoded == "." || decoded == ".." || decoded.contains(['/', '\\', '\0']) {
        return Err(EngineError::invalid_url(format!(
            "Unsafe filename: {:?}",
            decoded
        )));
    }

    Ok(decoded)
}

/// Lowercased extension of `filename`.
///
/// Multi-part suffixes on the allow-list (such as `tar.gz`) win over the
/// last dot-separated part, so `x.tar.gz` is `tar.gz` while `x.gz` is `gz`.
pub fn extension_of(filename: &str, allowed: &[String]) -> String {
    let lower = filename.to_lowercase();

    let mut compound: Vec<String> = allowed
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| e.contains('.'))
        .collect();
    compound.sort_by_key(|e| std::cmp::Reverse(e.len()));

    for ext in compound {
        if lower.ends_with(&format!(".{}", ext)) {
            return ext;
        }
    }

    lower
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

fn is_allowed(extension: &str, allowed: &[String]) -> bool {
    !extension.is_empty()
        && allowed
            .iter()
            .any(|a| a.trim().trim_start_matches('.').eq_ignore_ascii_case(extension))
}

/// Ask the server for the resource's metadata without transferring its body.
///
/// Uses HEAD; servers that refuse HEAD (405/501) get a one-byte ranged GET
/// instead, whose `Content-Range` carries the full size.
pub async fn fetch_metadata(client: &Client, url: &Url) -> Result<RemoteMetadata> {
    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| EngineError::from(e).into_probe_failure())?;

    let status = response.status();
    if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
        tracing::debug!("HEAD refused with {} for {}, trying ranged GET", status, url);
        return fetch_metadata_ranged(client, url).await;
    }

    if !status.is_success() {
        return Err(EngineError::ProbeFailed {
            kind: NetworkErrorKind::HttpStatus(status.as_u16()),
            message: format!("HEAD request returned: {}", status),
        });
    }

    Ok(RemoteMetadata {
        content_length: header_u64(&response, CONTENT_LENGTH.as_str()),
        content_type: header_string(&response, CONTENT_TYPE.as_str()),
    })
}

async fn fetch_metadata_ranged(client: &Client, url: &Url) -> Result<RemoteMetadata> {
    let response = client
        .get(url.clone())
        .header(RANGE, "bytes=0-0")
        .send()
        .await
        .map_err(|e| EngineError::from(e).into_probe_failure())?;

    let status = response.status();
    let content_length = match status {
        StatusCode::PARTIAL_CONTENT => header_string(&response, CONTENT_RANGE.as_str())
            .as_deref()
            .and_then(parse_content_range_total),
        s if s.is_success() => header_u64(&response, CONTENT_LENGTH.as_str()),
        s => {
            return Err(EngineError::ProbeFailed {
                kind: NetworkErrorKind::HttpStatus(s.as_u16()),
                message: format!("Ranged GET returned: {}", s),
            })
        }
    };

    // The response is dropped unread; at most one byte was requested.
    Ok(RemoteMetadata {
        content_length,
        content_type: header_string(&response, CONTENT_TYPE.as_str()),
    })
}

/// Total size from a `Content-Range: bytes 0-0/2048` header
fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// Read the header itself: for HEAD responses the body is empty, so
// `Response::content_length()` would report 0.
fn header_u64(response: &Response, name: &str) -> Option<u64> {
    header_string(response, name).and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ALLOWED_EXTENSIONS;

    fn allowed() -> Vec<String> {
        DEFAULT_ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    fn check(url: &str) -> Result<ValidatedResource> {
        validate_resource(url, &allowed())
    }

    #[test]
    fn accepts_every_allow_listed_extension() {
        for name in ["a.zip", "a.xml", "a.json", "a.jsonl", "a.tar.gz"] {
            let url = format!("https://example.com/files/{}", name);
            let res = check(&url).unwrap_or_else(|e| panic!("{} rejected: {}", name, e));
            assert_eq!(res.filename, name);
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let res = check("https://example.com/DATA.JSON").unwrap();
        assert_eq!(res.extension, "json");
        assert_eq!(res.filename, "DATA.JSON");

        let res = check("https://example.com/Backup.TAR.GZ").unwrap();
        assert_eq!(res.extension, "tar.gz");
    }

    #[test]
    fn tar_gz_is_compound_but_gz_alone_is_rejected() {
        assert_eq!(check("https://example.com/x.tar.gz").unwrap().extension, "tar.gz");

        match check("https://example.com/x.gz") {
            Err(EngineError::UnsupportedType { extension }) => assert_eq!(extension, "gz"),
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
        assert!(matches!(
            check("https://example.com/tar.gz"),
            Err(EngineError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn rejects_unlisted_extensions() {
        for url in [
            "https://example.com/archive.exe",
            "https://example.com/archive.zip.exe",
            "https://example.com/noextension",
            "https://example.com/",
            "https://example.com",
            "https://example.com/dir/.zipper",
        ] {
            assert!(
                matches!(check(url), Err(EngineError::UnsupportedType { .. })),
                "{} should be unsupported",
                url
            );
        }
    }

    #[test]
    fn query_string_is_not_part_of_the_filename() {
        let res = check("https://example.com/export.json?token=abc.exe").unwrap();
        assert_eq!(res.filename, "export.json");
        assert!(matches!(
            check("https://example.com/download.php?file=a.zip"),
            Err(EngineError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn rejects_invalid_urls() {
        for url in [
            "not a url",
            "example.com/data.json",
            "/data.json",
            "ftp://example.com/data.json",
            "file:///etc/data.json",
            "",
        ] {
            assert!(
                matches!(check(url), Err(EngineError::InvalidUrl { .. })),
                "{:?} should be invalid",
                url
            );
        }
    }

    #[test]
    fn filename_is_percent_decoded() {
        let res = check("https://example.com/my%20data.json").unwrap();
        assert_eq!(res.filename, "my data.json");
    }

    #[test]
    fn rejects_encoded_path_separators() {
        assert!(matches!(
            check("https://example.com/..%2F..%2Fetc%2Fpasswd.json"),
            Err(EngineError::InvalidUrl { .. })
        ));
        assert!(matches!(
            check("https://example.com/a%5Cb.json"),
            Err(EngineError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn custom_allow_list_is_honoured() {
        let allowed = vec!["csv".to_string(), ".tar.zst".to_string()];
        assert!(validate_resource("https://h/a.csv", &allowed).is_ok());
        assert_eq!(
            validate_resource("https://h/a.tar.zst", &allowed).unwrap().extension,
            "tar.zst"
        );
        assert!(validate_resource("https://h/a.zip", &allowed).is_err());
    }

    #[test]
    fn request_carries_url_and_extension() {
        let req = check("https://example.com/data.json").unwrap().request();
        assert_eq!(req.source_url, "https://example.com/data.json");
        assert_eq!(req.declared_extension, "json");
    }

    #[test]
    fn parses_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/2048"), Some(2048));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
