//! AWS Signature Version 4 request signing for Bedrock runtime calls.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningParams, SigningSettings};
use aws_sigv4::sign::v4;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use crate::error::ProxyError;

const CREDENTIALS_SOURCE: &str = "environment";

/// Static AWS credentials. Read per call, never cached.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `AWS_ACCESS_KEY_ID` + `AWS_SECRET_ACCESS_KEY`, optional `AWS_SESSION_TOKEN`.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Some(Self {
            access_key_id: non_empty("AWS_ACCESS_KEY_ID")?,
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY")?,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }
}

/// Sign a POST to `url` in place: adds `x-amz-date`, the optional
/// security token and `authorization`. Only `content-type` is signed
/// besides the host.
///
/// # Errors
///
/// Returns [`ProxyError::Internal`] when the signer rejects the request or
/// produces a header that is not representable.
pub fn sign_request(
    url: &url::Url,
    headers: &mut HeaderMap,
    body: &[u8],
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    now: SystemTime,
) -> Result<(), ProxyError> {
    let identity = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        credentials.session_token.clone(),
        None,
        CREDENTIALS_SOURCE,
    )
    .into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(service)
        .time(now)
        .settings(SigningSettings::default())
        .build()
        .map_err(|err| signing_failed(&err))?
        .into();

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let signable = SignableRequest::new(
        "POST",
        url.as_str(),
        std::iter::once(("content-type", content_type.as_str())),
        SignableBody::Bytes(body),
    )
    .map_err(|err| signing_failed(&err))?;
    let (instructions, _signature) = sign(signable, &params)
        .map_err(|err| signing_failed(&err))?
        .into_parts();

    for (name, value) in instructions.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ProxyError::Internal(format!("invalid signed header name: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| ProxyError::Internal(format!("invalid signed header value: {err}")))?;
        headers.insert(name, value);
    }
    Ok(())
}

fn signing_failed(err: &dyn std::fmt::Display) -> ProxyError {
    ProxyError::Internal(format!("sigv4 signing failed: {err}"))
}
