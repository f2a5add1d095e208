//! Webhook signature verification.
//!
//! Hook senders sign the raw request body with HMAC and declare the digest
//! algorithm in the `X-Hub-Signature` header as `{algorithm}={hexDigest}`.
//! Verification runs over the raw, unparsed bytes; verifying after any
//! re-serialization would invalidate the signature.
//!
//! Requests without a signature header are accepted. This is a sanctioned
//! escape hatch for operators who have not configured a secret, not a bug:
//! it keeps an unconfigured install working at the cost of accepting forged
//! unsigned requests.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::warn;

use crate::error::HookError;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// How a request made it past the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No signature header was present.
    Unsigned,
    /// A signature header was present but no secret is configured, so the
    /// request passed through unverified.
    Unverified,
    /// The HMAC matched the configured secret.
    Valid,
}

/// Digest algorithms understood in the signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Legacy default used by `X-Hub-Signature`.
    Sha1,
    Sha256,
}

impl SignatureScheme {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(SignatureScheme::Sha1),
            "sha256" => Some(SignatureScheme::Sha256),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SignatureScheme::Sha1 => "sha1",
            SignatureScheme::Sha256 => "sha256",
        }
    }
}

/// Verifies an inbound request body against its signature header.
///
/// Returns the pass-through cases ([`SignatureCheck::Unsigned`],
/// [`SignatureCheck::Unverified`]) as `Ok`; any present-and-checkable
/// signature that does not match yields [`HookError::InvalidSignature`].
pub fn verify_signature(
    body: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<SignatureCheck, HookError> {
    let Some(header) = header else {
        return Ok(SignatureCheck::Unsigned);
    };
    let Some(secret) = secret else {
        warn!("received a X-Hub-Signature header, but cannot validate as no secret is configured");
        return Ok(SignatureCheck::Unverified);
    };

    let (algorithm, hex_sig) = header
        .split_once('=')
        .ok_or_else(|| HookError::InvalidSignature("missing algorithm prefix".to_string()))?;
    let scheme = SignatureScheme::from_name(algorithm).ok_or_else(|| {
        HookError::InvalidSignature(format!("unsupported digest algorithm '{algorithm}'"))
    })?;
    let received = hex::decode(hex_sig)
        .map_err(|_| HookError::InvalidSignature("invalid hex encoding".to_string()))?;

    // Constant-time comparison via the HMAC library
    let matched = match scheme {
        SignatureScheme::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
                .map_err(|_| HookError::InvalidSignature("failed to initialize HMAC".to_string()))?;
            mac.update(body);
            mac.verify_slice(&received).is_ok()
        }
        SignatureScheme::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|_| HookError::InvalidSignature("failed to initialize HMAC".to_string()))?;
            mac.update(body);
            mac.verify_slice(&received).is_ok()
        }
    };

    if matched {
        Ok(SignatureCheck::Valid)
    } else {
        Err(HookError::InvalidSignature(format!(
            "{} digest mismatch",
            scheme.name()
        )))
    }
}

/// Computes a full `{algorithm}={hexDigest}` header value for a payload.
///
/// This is what a correctly-configured sender produces; it exists for
/// generating expected signatures in tests.
pub fn format_signature(scheme: SignatureScheme, payload: &[u8], secret: &[u8]) -> String {
    let digest = match scheme {
        SignatureScheme::Sha1 => {
            let mut mac =
                HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureScheme::Sha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
    };
    format!("{}={}", scheme.name(), digest)
}
