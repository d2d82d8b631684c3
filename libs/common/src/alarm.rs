//! Alert mails sent to the site administrator when a backing service fails

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::mail::{EmailOptions, EmailService};

/// Admits at most one call per window
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Returns true when the caller may proceed and records the attempt
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match *last {
            Some(previous) if now.duration_since(previous) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Sends `[app] subject` mails to the admin address
#[derive(Clone)]
pub struct Alarm {
    mailer: EmailService,
    app_name: String,
    admin_email: String,
    subject: String,
    throttle: Option<Arc<Throttle>>,
}

impl Alarm {
    pub fn new(
        mailer: EmailService,
        app_name: impl Into<String>,
        admin_email: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            app_name: app_name.into(),
            admin_email: admin_email.into(),
            subject: subject.into(),
            throttle: None,
        }
    }

    /// Limit this alarm to one mail per `window`
    pub fn throttled(mut self, window: Duration) -> Self {
        self.throttle = Some(Arc::new(Throttle::new(window)));
        self
    }

    /// Same recipient, different subject, no throttle
    pub fn with_subject(&self, subject: impl Into<String>) -> Self {
        Self {
            mailer: self.mailer.clone(),
            app_name: self.app_name.clone(),
            admin_email: self.admin_email.clone(),
            subject: subject.into(),
            throttle: None,
        }
    }

    /// Raise the alarm. Returns false when the throttle swallowed it.
    pub fn raise(&self, error: &str) -> bool {
        if let Some(throttle) = &self.throttle {
            if !throttle.try_acquire() {
                debug!("alarm '{}' throttled", self.subject);
                return false;
            }
        }

        self.mailer.send_mail_as(
            &self.app_name,
            EmailOptions {
                to: self.admin_email.clone(),
                subject: self.subject.clone(),
                text: error.to_string(),
                html: format!("<pre><code>{}</code></pre>", error),
            },
        );
        true
    }
}
