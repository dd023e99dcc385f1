use reqwest::{Client, header};
use resend_rs::{Resend, types::CreateEmailBaseOptions};
use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{EmailJsSettings, PayRates};
use crate::engine::{PaySummary, format_money};

const EMAILJS_SEND_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("request to mail service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Resend error: {0}")]
    Resend(#[from] resend_rs::Error),

    #[error("mail service is not configured: {0}")]
    NotConfigured(String),
}

/// Template parameters of the pay summary email. Every amount is already
/// formatted for display.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PayEmail {
    #[serde(rename = "recipient_email")]
    pub recipient: String,
    pub member_name: String,
    pub total_hours: String,
    pub rate_neto: String,
    #[serde(rename = "rate_deducciones")]
    pub rate_deductions: String,
    pub total_neto: String,
    pub total_tax: String,
}

impl PayEmail {
    pub fn new(recipient: &str, summary: &PaySummary) -> Self {
        PayEmail {
            recipient: recipient.to_string(),
            member_name: summary.member.clone(),
            total_hours: format!("{:.2}", summary.total_hours),
            rate_neto: format_money(summary.rate_neto),
            rate_deductions: format_money(summary.rate_deductions),
            total_neto: format_money(summary.total_neto),
            total_tax: format_money(summary.total_deductions),
        }
    }
}

pub trait Mailer: Send + Sync + 'static {
    /// Sends one pay summary and returns the provider's message id.
    fn send(&self, email: &PayEmail) -> impl Future<Output = Result<String, MailError>> + Send;
}

/// Plain-text body for providers that do not render templates.
pub fn build_plain_email(email: &PayEmail, rates: &PayRates) -> String {
    let lines = [
        format!("Hola {},", email.member_name),
        String::new(),
        "Resumen de pago:".to_string(),
        format!("Horas totales: {} hrs", email.total_hours),
        format!("Rate neto (por hora): ${}", email.rate_neto),
        format!("Total Neto: ${}", email.total_neto),
        format!("Deducciones (ACC / IRD): -${}", email.total_tax),
        String::new(),
        "Detalle adicional:".to_string(),
        format!(
            "CÁLCULO BRUTO: ${:.2} + {}% Holiday Pay (${}).",
            rates.base_gross, rates.holiday_pay_pct, rates.gross_display
        ),
        format!(
            "DEDUCCIONES IRD: ${:.2} PAYE + ${:.2} ACC = ${}/hr.",
            rates.paye, rates.acc, email.rate_deductions
        ),
        String::new(),
        "Saludos,".to_string(),
        "Orchard TEAM".to_string(),
    ];
    lines.join("\n")
}

pub fn subject_for(email: &PayEmail) -> String {
    format!("Resumen de pago - {}", email.member_name)
}

#[derive(Serialize)]
struct EmailJsRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a PayEmail,
}

/// Sends through an EmailJS template.
#[derive(Clone)]
pub struct EmailJsMailer {
    client: Client,
    settings: EmailJsSettings,
    endpoint: String,
}

impl EmailJsMailer {
    pub fn new(client: Client, settings: EmailJsSettings) -> Self {
        EmailJsMailer {
            client,
            settings,
            endpoint: EMAILJS_SEND_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Mailer for EmailJsMailer {
    async fn send(&self, email: &PayEmail) -> Result<String, MailError> {
        let Some(public_key) = self.settings.public_key.as_deref() else {
            error!("EmailJS public key is missing");
            return Err(MailError::NotConfigured("EMAILJS_PUBLIC_KEY".to_string()));
        };

        info!(
            "Sending pay summary for {} through EmailJS template {}",
            email.member_name, self.settings.template_id
        );

        let body = serde_json::to_string(&EmailJsRequest {
            service_id: &self.settings.service_id,
            template_id: &self.settings.template_id,
            user_id: public_key,
            template_params: email,
        })
        .map_err(|e| MailError::NotConfigured(format!("could not encode request: {}", e)))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if !status.is_success() {
            error!("EmailJS returned error status {}: {}", status, text);
            return Err(MailError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        info!("Pay summary for {} sent through EmailJS", email.member_name);
        Ok(text)
    }
}

/// Sends the plain-text summary through Resend.
#[derive(Clone)]
pub struct ResendMailer {
    resend: Resend,
    from: String,
    rates: PayRates,
}

impl ResendMailer {
    pub fn new(resend: Resend, from: impl Into<String>, rates: PayRates) -> Self {
        ResendMailer {
            resend,
            from: from.into(),
            rates,
        }
    }
}

impl Mailer for ResendMailer {
    async fn send(&self, email: &PayEmail) -> Result<String, MailError> {
        let subject = subject_for(email);
        let text = build_plain_email(email, &self.rates);

        info!("Preparing to send email with subject: {}", subject);

        let message = CreateEmailBaseOptions::new(&self.from, [email.recipient.as_str()], &subject)
            .with_text(&text);

        match self.resend.emails.send(message).await {
            Ok(response) => {
                info!("Email sent successfully with ID: {}", response.id);
                Ok(response.id.to_string())
            }
            Err(e) => {
                error!("Failed to send email: {}", e);
                Err(MailError::Resend(e))
            }
        }
    }
}
