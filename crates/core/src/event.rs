//! Pageview event model.
//!
//! The ingest body only carries what the page knows (path and UTM tags).
//! Everything else is derived server-side from the request into a
//! [`PageviewEvent`], which lives for the duration of one request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::classify::{self, Classifier, DeviceClass, PathCheck, UNKNOWN};
use crate::config::AnalyticsConfig;
use crate::error::{Error, Result, ValidationErrorCode};
use crate::limits::{MAX_DURATION_MS, MAX_INGEST_BODY_BYTES};

/// UTM tags as sent by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UtmParams {
    #[validate(length(max = 512))]
    pub source: Option<String>,
    #[validate(length(max = 512))]
    pub medium: Option<String>,
    #[validate(length(max = 512))]
    pub campaign: Option<String>,
}

/// Ingest request body: `{ path?: string, utm?: { source?, medium?, campaign? } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct IngestBody {
    #[validate(length(max = 2048))]
    pub path: Option<String>,
    pub utm: Option<UtmParams>,
}

impl IngestBody {
    /// Parses a raw body.
    ///
    /// An empty body is an empty object. Anything that is not a JSON object,
    /// or has fields of the wrong type, is malformed.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_INGEST_BODY_BYTES {
            return Err(Error::validation_code(
                ValidationErrorCode::PayloadTooLarge,
                format!(
                    "body is {} bytes, limit is {}",
                    bytes.len(),
                    MAX_INGEST_BODY_BYTES
                ),
            ));
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::malformed(format!("invalid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(Error::malformed("request body must be a JSON object"));
        }

        let body: Self = serde_json::from_value(value)
            .map_err(|e| Error::malformed(format!("invalid body: {}", e)))?;
        body.validate()
            .map_err(|e| Error::malformed(format!("{}", e)))?;
        if let Some(utm) = &body.utm {
            utm.validate()
                .map_err(|e| Error::malformed(format!("utm: {}", e)))?;
        }
        Ok(body)
    }
}

/// Request facts gathered by the HTTP layer.
#[derive(Clone, Default)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
    /// Raw value of the first trusted geo header present
    pub country: Option<String>,
    /// Only used to derive the visitor token
    pub client_ip: Option<String>,
    pub is_admin: bool,
    /// Server-side processing time, when the edge reports one
    pub duration_ms: Option<u64>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_agent", &self.user_agent)
            .field("accept_language", &self.accept_language)
            .field("referer", &self.referer)
            .field("country", &self.country)
            .field("client_ip", &self.client_ip.as_ref().map(|_| "<redacted>"))
            .field("is_admin", &self.is_admin)
            .field("duration_ms", &self.duration_ms)
            .finish()
    }
}

/// A classified pageview. Never persisted verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct PageviewEvent {
    pub path: String,
    pub referrer: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub lang: String,
    pub device: DeviceClass,
    pub browser: String,
    pub os: String,
    pub country: Option<String>,
    pub is_bot: bool,
    pub is_admin: bool,
    pub client_ip: Option<String>,
    pub duration_ms: Option<u64>,
}

impl std::fmt::Debug for PageviewEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageviewEvent")
            .field("path", &self.path)
            .field("referrer", &self.referrer)
            .field("utm_source", &self.utm_source)
            .field("utm_medium", &self.utm_medium)
            .field("utm_campaign", &self.utm_campaign)
            .field("lang", &self.lang)
            .field("device", &self.device)
            .field("browser", &self.browser)
            .field("os", &self.os)
            .field("country", &self.country)
            .field("is_bot", &self.is_bot)
            .field("is_admin", &self.is_admin)
            .field("duration_ms", &self.duration_ms)
            .finish_non_exhaustive()
    }
}

impl PageviewEvent {
    /// Classifies a parsed body and its request context.
    ///
    /// Fails only when the path is invalid and the config rejects invalid
    /// paths; otherwise such events count as `/`.
    pub fn classify(
        body: IngestBody,
        ctx: RequestContext,
        classifier: &Classifier,
        config: &AnalyticsConfig,
    ) -> Result<Self> {
        let path = match classify::check_path(body.path.as_deref(), &config.excluded_path_prefixes)
        {
            PathCheck::Valid(path) => path,
            PathCheck::Invalid(reason) if config.reject_invalid_paths => {
                return Err(Error::malformed(format!("invalid path: {}", reason)));
            }
            PathCheck::Invalid(_) => "/".to_string(),
        };

        let ua = classifier.user_agent(ctx.user_agent.as_deref().unwrap_or(""));
        let utm = body.utm.unwrap_or_default();

        Ok(Self {
            path,
            referrer: classify::referrer_host(ctx.referer.as_deref(), config.site_host.as_deref()),
            utm_source: classify::utm_value(utm.source.as_deref()),
            utm_medium: classify::utm_value(utm.medium.as_deref()),
            utm_campaign: classify::utm_value(utm.campaign.as_deref()),
            lang: ctx
                .accept_language
                .as_deref()
                .and_then(classify::primary_language)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            device: ua.device,
            browser: ua.browser.to_string(),
            os: ua.os.to_string(),
            country: classify::country_code(ctx.country.as_deref()),
            is_bot: ua.is_bot,
            is_admin: ctx.is_admin,
            client_ip: ctx.client_ip.filter(|ip| !ip.trim().is_empty()),
            duration_ms: ctx.duration_ms.filter(|&ms| ms <= MAX_DURATION_MS),
        })
    }

    /// Whether this event should be counted at all.
    pub fn is_countable(&self) -> bool {
        !self.is_bot && !self.is_admin
    }
}
