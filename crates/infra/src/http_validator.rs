//! Remote [`Validator`] speaking the account service's HTTP validation surface.
//!
//! | check      | request                                              | answer        |
//! |------------|------------------------------------------------------|---------------|
//! | ownership     | `GET /accounts/{id}/validate?userId={principal}`       | `true\|false` |
//! | funds + hold  | `POST /accounts/{id}/holds` `{sum, transactionId}`     | `true\|false` |
//! | existence     | `GET /accounts/{id}`                                   | 200 / 404     |
//! | compatibility | `GET /accounts/{destination}/accepts?from={source}`    | `true\|false` |
//! | release       | `DELETE /accounts/{id}/holds/{tx}`                     | 204           |
//!
//! Every request is bounded by the client timeout. Only a well-formed answer is
//! an answer: timeouts, connection errors, other statuses and unparsable bodies
//! are all `ValidationUnavailable`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use tracing::debug;

use serde_json::json;

use ledgerflow_core::{
    AccountId, Amount, PrincipalId, TransactionId, ValidationUnavailable, Validator,
};

#[derive(Debug, Clone)]
pub struct HttpValidatorClient {
    client: Client,
    base_url: String,
}

impl HttpValidatorClient {
    /// Build a client for `base_url` (e.g. `http://accounts:8080`).
    ///
    /// Must not be called from inside an async task; the blocking client owns
    /// its own runtime.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ValidationUnavailable> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ValidationUnavailable::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn boolean(&self, request: reqwest::blocking::RequestBuilder) -> Result<bool, ValidationUnavailable> {
        let response = request.send().map_err(transport)?;
        let response = expect_success(response)?;
        let body = response.text().map_err(transport)?;
        serde_json::from_str::<bool>(body.trim())
            .map_err(|e| ValidationUnavailable::Malformed(format!("expected true|false, got '{body}': {e}")))
    }
}

fn transport(err: reqwest::Error) -> ValidationUnavailable {
    if err.is_timeout() {
        ValidationUnavailable::Timeout(err.to_string())
    } else {
        ValidationUnavailable::Transport(err.to_string())
    }
}

fn expect_success(response: Response) -> Result<Response, ValidationUnavailable> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(ValidationUnavailable::UnexpectedStatus {
        status: status.as_u16(),
        message,
    })
}

impl Validator for HttpValidatorClient {
    fn check_ownership(
        &self,
        account: AccountId,
        principal: PrincipalId,
    ) -> Result<bool, ValidationUnavailable> {
        debug!(account_id = %account, principal_id = %principal, "remote ownership check");
        let request = self
            .client
            .get(self.url(&format!("/accounts/{account}/validate")))
            .query(&[("userId", principal.to_string())]);
        self.boolean(request)
    }

    fn check_funds(
        &self,
        account: AccountId,
        amount: Amount,
        hold: TransactionId,
    ) -> Result<bool, ValidationUnavailable> {
        debug!(account_id = %account, transaction_id = %hold, %amount, "remote funds check");
        let request = self
            .client
            .post(self.url(&format!("/accounts/{account}/holds")))
            .json(&json!({ "sum": amount.to_string(), "transactionId": hold }));
        self.boolean(request)
    }

    fn check_exists(&self, account: AccountId) -> Result<bool, ValidationUnavailable> {
        let response = self
            .client
            .get(self.url(&format!("/accounts/{account}")))
            .send()
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => expect_success(response).map(|_| true),
        }
    }

    fn check_compatible(
        &self,
        source: AccountId,
        destination: AccountId,
    ) -> Result<bool, ValidationUnavailable> {
        let request = self
            .client
            .get(self.url(&format!("/accounts/{destination}/accepts")))
            .query(&[("from", source.to_string())]);
        self.boolean(request)
    }

    fn release_hold(
        &self,
        account: AccountId,
        hold: TransactionId,
    ) -> Result<(), ValidationUnavailable> {
        let response = self
            .client
            .delete(self.url(&format!("/accounts/{account}/holds/{hold}")))
            .send()
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            _ => expect_success(response).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unreachable_service_is_unavailable_not_false() {
        // Port 9 (discard) on localhost is closed in any sane test environment.
        let client =
            HttpValidatorClient::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        let account = AccountId::new();

        let err = client.check_ownership(account, PrincipalId::new()).unwrap_err();
        assert!(matches!(
            err,
            ValidationUnavailable::Transport(_) | ValidationUnavailable::Timeout(_)
        ));

        assert!(client
            .check_funds(account, Amount::new(dec!(1)).unwrap(), TransactionId::new())
            .is_err());
        assert!(client.check_exists(account).is_err());
        assert!(client.check_compatible(account, AccountId::new()).is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpValidatorClient::new("http://accounts:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/accounts/x"), "http://accounts:8080/accounts/x");
    }
}
