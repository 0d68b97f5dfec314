use anyhow::Context;
use axum::async_trait;
use serde::Serialize;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SendgridMailer {
    http: reqwest::Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendgridMailer {
    pub fn new(cfg: &MailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: cfg.sendgrid_api_key.clone(),
            from_email: cfg.from_email.clone(),
            from_name: cfg.from_name.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SendgridMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let body = SgMail {
            personalizations: vec![SgPersonalization {
                to: vec![SgAddress { email: to.into() }],
                subject: subject.into(),
            }],
            from: SgFrom {
                email: self.from_email.clone(),
                name: self.from_name.clone(),
            },
            content: vec![SgContent {
                kind: "text/html".into(),
                value: html.into(),
            }],
        };

        let res = self
            .http
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request")?;

        // SendGrid answers 202 Accepted on success
        if res.status() == reqwest::StatusCode::ACCEPTED {
            tracing::debug!(to = %to, "email accepted for delivery");
            Ok(())
        } else {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("sendgrid failed: status={status} body={text}")
        }
    }
}

#[derive(Serialize)]
struct SgMail {
    personalizations: Vec<SgPersonalization>,
    from: SgFrom,
    content: Vec<SgContent>,
}

#[derive(Serialize)]
struct SgPersonalization {
    to: Vec<SgAddress>,
    subject: String,
}

#[derive(Serialize)]
struct SgAddress {
    email: String,
}

#[derive(Serialize)]
struct SgFrom {
    email: String,
    name: String,
}

#[derive(Serialize)]
struct SgContent {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}
