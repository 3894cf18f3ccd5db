use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Notification<'a> {
    title: &'a str,
    message: &'a str,
}

/// Fire-and-forget push notifications.
///
/// Events are POSTed as `{"title", "message"}` JSON to the configured
/// webhook. Delivery is best-effort: failures are logged and swallowed so
/// they can never affect the conversion state machine. With no URL
/// configured every send is a no-op.
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client");
        Notifier { client, url }
    }

    pub async fn send(&self, title: &str, message: &str) {
        let Some(url) = &self.url else {
            debug!("Notification (no webhook configured): {title}: {message}");
            return;
        };

        let payload = Notification { title, message };
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Notification delivered: {title}");
            }
            Ok(response) => {
                warn!(
                    "Notification webhook returned {} for '{title}'",
                    response.status()
                );
            }
            Err(e) => {
                warn!("Failed to deliver notification '{title}': {e}");
            }
        }
    }
}
