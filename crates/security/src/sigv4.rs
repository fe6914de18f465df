//! AWS Signature Version 4 request signing.
//!
//! Used by the `iam` gateway transport and by the knowledge-base retrieval
//! tool. Produces the headers to attach to an outgoing request; the caller
//! keeps ownership of the HTTP client.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read credentials from the standard `AWS_*` environment variables.
    pub fn from_env() -> Result<Self, SigningError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SigningError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let access_key_id =
            get("AWS_ACCESS_KEY_ID").ok_or(SigningError::MissingCredentials("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = get("AWS_SECRET_ACCESS_KEY")
            .ok_or(SigningError::MissingCredentials("AWS_SECRET_ACCESS_KEY"))?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: get("AWS_SESSION_TOKEN"),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Signs requests for one region/service pair.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    region: String,
    service: String,
    credentials: Credentials,
}

impl SigV4Signer {
    pub fn new(region: impl Into<String>, service: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            credentials,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sign a request at the current time.
    ///
    /// `headers` are additional headers that will be sent and should be
    /// covered by the signature (e.g. `content-type`). Returns the headers
    /// to add: `x-amz-date`, optional `x-amz-security-token`, `authorization`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, SigningError> {
        self.sign_at(method, url, headers, body, Utc::now())
    }

    /// Sign a request as of `now`.
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SigningError> {
        let parts = UrlParts::parse(url)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), normalize_header_value(v)))
            .collect();
        signed.push(("host".into(), parts.host.clone()));
        signed.push(("x-amz-date".into(), amz_date.clone()));
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token".into(), token.clone()));
        }
        signed.sort();

        let canonical_headers: String = signed.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
        let signed_headers = signed
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.to_ascii_uppercase(),
            canonical_uri(&parts.path),
            canonical_query(&parts.query),
            canonical_headers,
            signed_headers,
            hex::encode(Sha256::digest(body)),
        );

        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        );

        let key = self.signing_key(&date)?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id,
        );

        let mut out = vec![("x-amz-date".to_string(), amz_date)];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out.push(("authorization".to_string(), authorization));
        Ok(out)
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>, SigningError> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, self.service.as_bytes())?;
        hmac(&k_service, b"aws4_request")
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SigningError::Crypto(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Trim and collapse internal whitespace runs, as the canonical form requires.
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".into();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Query keys and values arrive as they appear on the wire, so each is
/// decoded before being encoded exactly once.
fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (query_encode(k), query_encode(v)),
            None => (query_encode(pair), String::new()),
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn query_encode(component: &str) -> String {
    encode_bytes(&urlencoding::decode_binary(component.as_bytes()))
}

/// RFC 3986 encoding: unreserved characters pass, everything else is `%XX`.
fn uri_encode(segment: &str) -> String {
    encode_bytes(segment.as_bytes())
}

fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

struct UrlParts {
    host: String,
    path: String,
    query: String,
}

impl UrlParts {
    fn parse(url: &str) -> Result<Self, SigningError> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| SigningError::InvalidUrl(url.to_string()))?;
        let rest = rest.split('#').next().unwrap_or_default();

        let (authority, path_and_query) = match rest.find(['/', '?']) {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(SigningError::InvalidUrl(url.to_string()));
        }

        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, q),
            None => (path_and_query, ""),
        };

        Ok(Self {
            host: authority.to_ascii_lowercase(),
            path: path.to_string(),
            query: query.to_string(),
        })
    }
}

/// Signing errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    #[error("Missing AWS credential: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("Cannot sign URL: {0}")]
    InvalidUrl(String),

    #[error("Signing failed: {0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_signer(service: &str) -> SigV4Signer {
        SigV4Signer::new(
            "us-east-1",
            service,
            Credentials::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
                None,
            ),
        )
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn matches_published_reference_signature() {
        // AWS documentation example: IAM ListUsers, 2015-08-30T12:36:00Z
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let headers = example_signer("iam")
            .sign_at(
                "GET",
                "https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08",
                &[("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")],
                b"",
                now,
            )
            .unwrap();

        assert_eq!(header(&headers, "x-amz-date"), Some("20150830T123600Z"));
        let auth = header(&headers, "authorization").unwrap();
        assert_eq!(
            auth,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn session_token_is_signed_and_returned() {
        let signer = SigV4Signer::new(
            "us-west-2",
            "bedrock-agentcore",
            Credentials::new("AKID", "secret", Some("token-123".into())),
        );
        let headers = signer
            .sign("POST", "https://gw.example.com/mcp", &[("content-type", "application/json")], b"{}")
            .unwrap();

        assert_eq!(header(&headers, "x-amz-security-token"), Some("token-123"));
        let auth = header(&headers, "authorization").unwrap();
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"));
        assert!(auth.contains("/us-west-2/bedrock-agentcore/aws4_request"));
    }

    #[test]
    fn body_changes_signature() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let signer = example_signer("bedrock");
        let a = signer.sign_at("POST", "https://x.example/p", &[], b"one", now).unwrap();
        let b = signer.sign_at("POST", "https://x.example/p", &[], b"two", now).unwrap();
        assert_ne!(header(&a, "authorization"), header(&b, "authorization"));
    }

    #[test]
    fn rejects_non_http_urls() {
        let err = example_signer("iam")
            .sign("GET", "ftp://example.com/file", &[], b"")
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidUrl(_)));
    }

    #[test]
    fn url_parts_split() {
        let parts = UrlParts::parse("https://Gw.Example.com:8443/a/b?x=1#frag").unwrap();
        assert_eq!(parts.host, "gw.example.com:8443");
        assert_eq!(parts.path, "/a/b");
        assert_eq!(parts.query, "x=1");

        let bare = UrlParts::parse("http://localhost").unwrap();
        assert_eq!(bare.path, "");
        assert_eq!(canonical_uri(&bare.path), "/");
    }

    #[test]
    fn query_is_sorted_and_encoded() {
        assert_eq!(canonical_query("b=2&a=hello world&c"), "a=hello%20world&b=2&c=");
    }

    #[test]
    fn encoded_query_is_not_encoded_twice() {
        assert_eq!(
            canonical_query("name=line%203&tag=a%2Fb&raw=a/b"),
            "name=line%203&raw=a%2Fb&tag=a%2Fb"
        );
        assert_eq!(canonical_query("q=caf%C3%A9"), "q=caf%C3%A9");
        assert_eq!(canonical_query("pct=100%25"), "pct=100%25");
    }

    #[test]
    fn credentials_from_lookup() {
        let creds = Credentials::from_lookup(|k| match k {
            "AWS_ACCESS_KEY_ID" => Some("AKID".into()),
            "AWS_SECRET_ACCESS_KEY" => Some("shh".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert!(creds.session_token.is_none());
        assert!(!format!("{creds:?}").contains("shh"));

        let missing = Credentials::from_lookup(|_| None).unwrap_err();
        assert!(matches!(missing, SigningError::MissingCredentials("AWS_ACCESS_KEY_ID")));
    }
}
