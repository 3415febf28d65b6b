use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::models::notification::NotificationPayload;

/// Best-effort run reporting. Implementations swallow every failure.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload);
}

/// POSTs the payload as JSON to a callback URL.
pub struct HttpNotifier {
    http: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), reqwest::Error> {
        self.http
            .post(&self.url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, payload: &NotificationPayload) {
        match self.send(payload).await {
            Ok(()) => tracing::info!(url = %self.url, "Callback notification sent"),
            Err(e) => {
                // Reporting must never change the outcome of the run.
                tracing::error!(url = %self.url, error = %e, "Failed to send callback notification")
            }
        }
    }
}
