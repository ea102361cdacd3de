//! OCI request signing (HTTP Signatures, draft-cavage, rsa-sha256)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("private key is encrypted; encrypted keys are not supported")]
    EncryptedKey,

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("request URL has no host: {0}")]
    MissingHost(String),
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub date: String,
    pub authorization: String,
    /// Present for requests with a body: (x-content-sha256, content-type, content-length)
    pub body: Option<BodyHeaders>,
}

#[derive(Debug, Clone)]
pub struct BodyHeaders {
    pub content_sha256: String,
    pub content_type: &'static str,
    pub content_length: usize,
}

pub struct RequestSigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(
        tenancy_ocid: &str,
        user_ocid: &str,
        fingerprint: &str,
        private_key_pem: &str,
    ) -> Result<Self, AuthError> {
        let key = parse_private_key(private_key_pem)?;
        Ok(Self {
            key_id: format!("{}/{}/{}", tenancy_ocid, user_ocid, fingerprint),
            signing_key: SigningKey::<Sha256>::new(key),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign one request attempt. `date` is an RFC 1123 timestamp.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        date: &str,
    ) -> Result<SignedHeaders, AuthError> {
        let host = host_header(url)?;
        let target = request_target(method, url);

        let body_headers = match (method, body) {
            (&Method::POST, body) | (&Method::PUT, body) => {
                let body = body.unwrap_or_default();
                Some(BodyHeaders {
                    content_sha256: STANDARD.encode(Sha256::digest(body)),
                    content_type: "application/json",
                    content_length: body.len(),
                })
            }
            _ => None,
        };

        let mut names = vec!["date", "(request-target)", "host"];
        let mut lines = vec![
            format!("date: {}", date),
            format!("(request-target): {}", target),
            format!("host: {}", host),
        ];
        if let Some(b) = &body_headers {
            names.extend(["x-content-sha256", "content-type", "content-length"]);
            lines.push(format!("x-content-sha256: {}", b.content_sha256));
            lines.push(format!("content-type: {}", b.content_type));
            lines.push(format!("content-length: {}", b.content_length));
        }

        let signing_string = lines.join("\n");
        let signature = STANDARD.encode(self.signing_key.sign(signing_string.as_bytes()).to_bytes());

        Ok(SignedHeaders {
            date: date.to_string(),
            authorization: format!(
                "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
                self.key_id,
                names.join(" "),
                signature
            ),
            body: body_headers,
        })
    }
}

/// Current time in the format OCI expects in the `date` header.
pub fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AuthError> {
    let pem = pem.trim();
    if pem.contains("ENCRYPTED") {
        return Err(AuthError::EncryptedKey);
    }
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AuthError::InvalidKey(e.to_string()))
}

fn host_header(url: &Url) -> Result<String, AuthError> {
    let host = url
        .host_str()
        .ok_or_else(|| AuthError::MissingHost(url.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn request_target(method: &Method, url: &Url) -> String {
    let mut target = format!("{} {}", method.as_str().to_lowercase(), url.path());
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}
