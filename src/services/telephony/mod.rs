pub mod twilio;
pub mod twiml;

use async_trait::async_trait;

/// Outbound dialing transport. The core only needs "place a call and point
/// its webhooks at us"; everything else arrives through the webhook loop.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Start an outbound call and return the provider's call identifier.
    async fn start_call(&self, to: &str, webhook_url: &str) -> anyhow::Result<String>;
}
