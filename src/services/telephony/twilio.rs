use anyhow::Context;
use async_trait::async_trait;

use super::VoiceProvider;

pub struct TwilioVoiceProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioVoiceProvider {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceProvider for TwilioVoiceProvider {
    async fn start_call(&self, to: &str, webhook_url: &str) -> anyhow::Result<String> {
        if !webhook_url.starts_with("http") {
            anyhow::bail!("webhook_url must be an absolute URL the provider can reach");
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.account_sid
        );

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", webhook_url),
                ("Method", "POST"),
            ])
            .send()
            .await
            .context("failed to start Twilio call")?
            .error_for_status()
            .context("Twilio API returned error")?;

        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Twilio call response")?;

        data["sid"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing call sid in Twilio response"))
    }
}
