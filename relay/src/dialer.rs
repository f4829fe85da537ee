//! Outbound call placement through the Twilio REST API.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum DialError {
    #[error("Dialer configuration error: {0}")]
    ConfigurationError(String),
    #[error("Call placement request failed: {0}")]
    NetworkError(String),
    #[error("Twilio returned HTTP {status}: {message}")]
    ApiError { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Caller ID the call is placed from.
    pub from_number: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

pub struct TwilioDialer {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioDialer {
    pub fn new(config: TwilioConfig, client: reqwest::Client) -> Result<Self, DialError> {
        for (name, value) in [
            ("account SID", &config.account_sid),
            ("auth token", &config.auth_token),
            ("phone number", &config.from_number),
        ] {
            if value.trim().is_empty() {
                return Err(DialError::ConfigurationError(format!(
                    "Twilio {name} is required"
                )));
            }
        }
        Ok(Self { client, config })
    }

    /// Place a call to `to`. The carrier fetches call instructions from
    /// `twiml_url` once the callee answers. Returns the call SID.
    pub async fn place_call(&self, to: &str, twiml_url: &str) -> Result<String, DialError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        );
        let form = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Url", twiml_url),
        ];

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DialError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;
        info!(call_sid = %call.sid, to = %to, "Placed outbound call");
        Ok(call.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            from_number: "+15550100".to_string(),
            base_url,
        }
    }

    #[test]
    fn test_dialer_requires_credentials() {
        let mut incomplete = config(TWILIO_API_BASE_URL.to_string());
        incomplete.auth_token = String::new();
        assert!(matches!(
            TwilioDialer::new(incomplete, reqwest::Client::new()),
            Err(DialError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_place_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Calls.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15550199"))
            .and(body_string_contains("From=%2B15550100"))
            .and(body_string_contains("Url=https%3A%2F%2Frelay.example.com%2Ftwiml"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "CA999"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dialer = TwilioDialer::new(config(server.uri()), reqwest::Client::new()).unwrap();
        let sid = dialer
            .place_call("+15550199", "https://relay.example.com/twiml")
            .await
            .unwrap();
        assert_eq!(sid, "CA999");
    }

    #[tokio::test]
    async fn test_place_call_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid number"))
            .mount(&server)
            .await;

        let dialer = TwilioDialer::new(config(server.uri()), reqwest::Client::new()).unwrap();
        let err = dialer.place_call("nope", "https://x/twiml").await.unwrap_err();
        assert!(matches!(err, DialError::ApiError { status: 400, .. }));
    }
}
