use futures_util::future::{BoxFuture, join_all};
use tracing::{info, warn};
use uuid::Uuid;

use hearth_types::api::AlertView;

/// A person who should hear about an alert outside the app.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    pub user_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

/// Out-of-band alert delivery (SMS, voice). Delivery is best-effort: the
/// returned future never fails, it logs.
pub trait AlertNotifier: Send + Sync {
    /// How many of `targets` this notifier can actually reach.
    fn reachable(&self, targets: &[NotifyTarget]) -> usize {
        targets.iter().filter(|t| t.phone.is_some()).count()
    }

    fn notify(&self, alert: AlertView, targets: Vec<NotifyTarget>) -> BoxFuture<'static, ()>;
}

/// Used when no SMS/voice credentials are configured.
pub struct DisabledNotifier;

impl AlertNotifier for DisabledNotifier {
    fn reachable(&self, _targets: &[NotifyTarget]) -> usize {
        0
    }

    fn notify(&self, alert: AlertView, targets: Vec<NotifyTarget>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            warn!(
                "SMS/voice disabled, {} contact(s) not notified of alert {}",
                targets.len(),
                alert.id
            );
        })
    }
}

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01/Accounts";

/// Sends one SMS and places one voice call per target with a phone number.
#[derive(Clone)]
pub struct TwilioNotifier {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioNotifier {
    pub fn new(account_sid: String, auth_token: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from,
        }
    }

    async fn post(&self, resource: &str, form: &[(&str, &str)]) -> anyhow::Result<()> {
        let url = format!("{}/{}/{}.json", TWILIO_API, self.account_sid, resource);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed with {}: {}", resource, status, body);
        }
        Ok(())
    }

    async fn notify_one(&self, alert: &AlertView, target: &NotifyTarget) {
        let Some(phone) = target.phone.as_deref() else {
            return;
        };

        let sms = sms_body(alert);
        if let Err(e) = self
            .post("Messages", &[("To", phone), ("From", &self.from), ("Body", &sms)])
            .await
        {
            warn!("SMS to {} for alert {} failed: {:#}", target.name, alert.id, e);
        }

        let twiml = voice_twiml(alert);
        if let Err(e) = self
            .post("Calls", &[("To", phone), ("From", &self.from), ("Twiml", &twiml)])
            .await
        {
            warn!("Call to {} for alert {} failed: {:#}", target.name, alert.id, e);
        }
    }
}

impl AlertNotifier for TwilioNotifier {
    fn notify(&self, alert: AlertView, targets: Vec<NotifyTarget>) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move {
            join_all(targets.iter().map(|t| this.notify_one(&alert, t))).await;
            info!("Out-of-band notifications for alert {} finished", alert.id);
        })
    }
}

fn sms_body(alert: &AlertView) -> String {
    format!(
        "EMERGENCY: {} triggered an alert. Location: {}",
        alert.triggered_by.name,
        alert.location.maps_link()
    )
}

fn voice_twiml(alert: &AlertView) -> String {
    format!(
        "<Response><Say>Emergency alert. {} needs help. Check your messages for their location.</Say></Response>",
        escape_xml(&alert.triggered_by.name)
    )
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
