//! SMTP mailer used for admin alerts
//!
//! The transport is verified once at start-up. A failed verification marks
//! the client invalid and schedules another attempt 30 minutes later; while
//! invalid, `send_mail` refuses instead of queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, warn};

use crate::error::MailError;

const VERIFY_RETRY_INTERVAL: Duration = Duration::from_secs(60 * 30);

/// SMTP relay configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay host (implicit TLS)
    pub host: String,
    /// Relay port, 465 for SMTPS
    pub port: u16,
    /// Account used both for authentication and as sender address
    pub account: String,
    pub password: String,
    /// Display name of the sender
    pub sender_name: String,
}

/// A single outgoing mail
#[derive(Debug, Clone)]
pub struct EmailOptions {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

struct Inner {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
    valid: AtomicBool,
}

/// Handle to the SMTP transport; cheap to clone
#[derive(Clone)]
pub struct EmailService {
    inner: Arc<Inner>,
}

impl EmailService {
    /// Build the transport. Verification happens in [`EmailService::start`].
    pub fn new(config: &EmailConfig) -> Self {
        let transport = build_transport(config)
            .map_err(|e| error!("[Mailer] failed to build transport: {}", e))
            .ok();
        let from = config
            .account
            .parse::<Address>()
            .map(|address| Mailbox::new(Some(config.sender_name.clone()), address))
            .map_err(|e| error!("[Mailer] invalid sender address: {}", e))
            .ok();

        Self {
            inner: Arc::new(Inner {
                transport,
                from,
                valid: AtomicBool::new(false),
            }),
        }
    }

    /// A mailer that never sends; every call is logged and refused
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: None,
                from: None,
                valid: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the verification loop
    pub fn start(&self) {
        let service = self.clone();
        tokio::spawn(async move { service.verify_client().await });
    }

    async fn verify_client(&self) {
        let Some(transport) = self.inner.transport.as_ref() else {
            warn!("[Mailer] no transport configured, mails are disabled");
            return;
        };

        loop {
            match transport.test_connection().await {
                Ok(true) => {
                    self.inner.valid.store(true, Ordering::Relaxed);
                    info!("[Mailer] client init succeed!");
                    return;
                }
                Ok(false) => {
                    self.inner.valid.store(false, Ordering::Relaxed);
                    error!("[Mailer] client init failed! relay refused, retry when after 30 mins");
                }
                Err(e) => {
                    self.inner.valid.store(false, Ordering::Relaxed);
                    error!("[Mailer] client init failed! retry when after 30 mins: {}", e);
                }
            }
            tokio::time::sleep(VERIFY_RETRY_INTERVAL).await;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Relaxed)
    }

    /// Send a mail in the background. Returns false when the client is not
    /// usable; delivery failures are only logged.
    pub fn send_mail(&self, options: EmailOptions) -> bool {
        if !self.is_valid() {
            warn!("[Mailer] send failed! reason: init failed");
            return false;
        }
        let (Some(transport), Some(from)) = (self.inner.transport.clone(), self.inner.from.clone())
        else {
            warn!("[Mailer] send failed! reason: no transport");
            return false;
        };

        let message = match build_message(from, &options) {
            Ok(message) => message,
            Err(e) => {
                error!("[Mailer] send failed! reason: {}", e);
                return false;
            }
        };

        tokio::spawn(async move {
            match transport.send(message).await {
                Ok(response) => info!(
                    "[Mailer] send succeed! code: {}, to: {}",
                    response.code(),
                    options.to
                ),
                Err(e) => error!("[Mailer] send failed! reason: {}", e),
            }
        });
        true
    }

    /// Same as `send_mail` with the subject prefixed by `[prefix]`
    pub fn send_mail_as(&self, prefix: &str, options: EmailOptions) -> bool {
        let subject = prefixed_subject(prefix, &options.subject);
        self.send_mail(EmailOptions { subject, ..options })
    }
}

fn build_transport(config: &EmailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        .port(config.port)
        .credentials(Credentials::new(
            config.account.clone(),
            config.password.clone(),
        ))
        .build();
    Ok(transport)
}

fn build_message(from: Mailbox, options: &EmailOptions) -> Result<Message, MailError> {
    let message = Message::builder()
        .from(from)
        .to(options.to.parse::<Mailbox>()?)
        .subject(options.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            options.text.clone(),
            options.html.clone(),
        ))?;
    Ok(message)
}

fn prefixed_subject(prefix: &str, subject: &str) -> String {
    format!("[{}] {}", prefix, subject)
}
