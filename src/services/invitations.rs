use std::fmt;

use askama::Template;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    error::AppError,
    models::{participant::Participant, trip::Trip},
    services::mail::{MailReceipt, Mailbox, Mailer, OutgoingEmail},
};

/// Long date as shown in invitations, e.g. "March 1, 2024".
pub fn format_long_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%B %-d, %Y").to_string()
}

#[derive(Template)]
#[template(path = "confirmation_email.html")]
struct ConfirmationEmailTemplate<'a> {
    destination: &'a str,
    starts: &'a str,
    ends: &'a str,
    link: &'a str,
}

pub fn confirmation_email(
    config: &AppConfig,
    trip: &Trip,
    participant: &Participant,
) -> Result<OutgoingEmail, AppError> {
    let starts = format_long_date(trip.starts_at);
    let ends = format_long_date(trip.ends_at);
    let link = config.confirmation_url(trip.id, participant.id);

    let html = ConfirmationEmailTemplate {
        destination: &trip.destination,
        starts: &starts,
        ends: &ends,
        link: &link,
    }
    .render()
    .map_err(|err| AppError::Mail(format!("failed to render confirmation email: {err}")))?;

    Ok(OutgoingEmail {
        from: Mailbox {
            name: config.mail_from_name.clone(),
            address: config.mail_from_address.clone(),
        },
        to: participant.email.clone(),
        subject: format!(
            "Confirm your attendance on the trip to {} on {starts}",
            trip.destination
        ),
        html,
    })
}

/// Outcome of one fan-out, one entry per recipient.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub sent: Vec<(String, MailReceipt)>,
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.sent.len() + self.failed.len()
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} emails failed",
            self.failed.len(),
            self.attempted()
        )?;
        for (recipient, reason) in &self.failed {
            write!(f, "; {recipient}: {reason}")?;
        }
        Ok(())
    }
}

/// Sends every email concurrently and waits for all of them. A failed send
/// never cancels its siblings.
pub async fn dispatch(mailer: &dyn Mailer, emails: Vec<OutgoingEmail>) -> DeliveryReport {
    let outcomes = join_all(emails.iter().map(|email| async move {
        (email.to.clone(), mailer.send(email).await)
    }))
    .await;

    let mut report = DeliveryReport::default();
    for (recipient, outcome) in outcomes {
        match outcome {
            Ok(receipt) => {
                debug!(to = %recipient, message_id = %receipt.message_id, "confirmation email sent");
                report.sent.push((recipient, receipt));
            }
            Err(err) => {
                warn!(to = %recipient, "confirmation email failed: {err}");
                report.failed.push((recipient, err.to_string()));
            }
        }
    }
    report
}
