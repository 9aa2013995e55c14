//! Outbound email
//!
//! Messages are queued in-process and delivered by a single background
//! worker. The queue has three priority tiers drained strictly in order
//! (high, normal, low), FIFO within a tier. A failed delivery goes to the
//! back of its tier and is held back for a linear backoff before the next
//! attempt; after `max_attempts` it is dropped. Callers never wait for
//! delivery.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::EmailConfig;

/// Delivery priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    fn tier(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// A plain-text email ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// SMTP delivery over rustls
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from, e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address '{}': {}", email.to, e))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes mail to the log instead of sending it
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (not sent, delivery disabled)");
        Ok(())
    }
}

/// Pick the mailer for the configuration, falling back to logging
pub fn create_mailer(config: &EmailConfig) -> Arc<dyn Mailer> {
    if !config.enabled {
        return Arc::new(LogMailer);
    }
    match SmtpMailer::from_config(config) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            tracing::warn!("Email delivery disabled: {}", e);
            Arc::new(LogMailer)
        }
    }
}

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct QueuedEmail {
    email: OutgoingEmail,
    priority: Priority,
    attempts: u32,
    not_before: Option<Instant>,
}

impl QueuedEmail {
    fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

enum Next {
    Ready(QueuedEmail),
    /// Only backing-off messages remain; the earliest becomes ready here
    Waiting(Instant),
    Empty,
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Requeued,
    Dropped,
}

/// Priority email queue with a single delivery worker
pub struct EmailQueue {
    tiers: Mutex<[VecDeque<QueuedEmail>; 3]>,
    notify: Notify,
    mailer: Arc<dyn Mailer>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl EmailQueue {
    pub fn new(mailer: Arc<dyn Mailer>, max_attempts: u32) -> Self {
        Self {
            tiers: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            notify: Notify::new(),
            mailer,
            max_attempts: max_attempts.max(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Base delay before a retry; the nth retry waits n times this
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn backoff_for(&self, attempts: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(attempts)
            .min(MAX_RETRY_BACKOFF)
    }

    /// Queue a message for delivery and return immediately
    pub async fn enqueue(&self, email: OutgoingEmail, priority: Priority) {
        self.push(QueuedEmail {
            email,
            priority,
            attempts: 0,
            not_before: None,
        })
        .await;
    }

    async fn push(&self, queued: QueuedEmail) {
        self.tiers.lock().await[queued.priority.tier()].push_back(queued);
        self.notify.notify_one();
    }

    /// First ready message in tier order; backing-off messages are skipped
    async fn pop(&self) -> Next {
        let now = Instant::now();
        let mut tiers = self.tiers.lock().await;
        let mut earliest: Option<Instant> = None;
        for tier in tiers.iter_mut() {
            if let Some(pos) = tier.iter().position(|q| q.is_ready(now)) {
                if let Some(queued) = tier.remove(pos) {
                    return Next::Ready(queued);
                }
            }
            for at in tier.iter().filter_map(|q| q.not_before) {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
        }
        earliest.map_or(Next::Empty, Next::Waiting)
    }

    pub async fn len(&self) -> usize {
        self.tiers.lock().await.iter().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Attempt delivery of the next message. `None` when the queue is empty.
    ///
    /// Waits when every queued message is still backing off, waking early
    /// if new mail is enqueued.
    pub async fn process_next(&self) -> Option<Delivery> {
        let mut queued = loop {
            match self.pop().await {
                Next::Ready(queued) => break queued,
                Next::Waiting(until) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(until) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                Next::Empty => return None,
            }
        };
        queued.attempts += 1;

        match self.mailer.send(&queued.email).await {
            Ok(()) => {
                tracing::debug!(to = %queued.email.to, "Email delivered");
                Some(Delivery::Sent)
            }
            Err(e) if queued.attempts < self.max_attempts => {
                let backoff = self.backoff_for(queued.attempts);
                tracing::warn!(
                    to = %queued.email.to,
                    attempt = queued.attempts,
                    retry_in_ms = backoff.as_millis() as u64,
                    "Email delivery failed, will retry: {}",
                    e
                );
                queued.not_before = Some(Instant::now() + backoff);
                self.push(queued).await;
                Some(Delivery::Requeued)
            }
            Err(e) => {
                tracing::error!(
                    to = %queued.email.to,
                    subject = %queued.email.subject,
                    "Email dropped after {} attempts: {}",
                    queued.attempts,
                    e
                );
                Some(Delivery::Dropped)
            }
        }
    }

    /// Deliver until the queue is empty
    pub async fn drain(&self) {
        while self.process_next().await.is_some() {}
    }

    /// Start the background delivery worker
    pub fn spawn_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.drain().await;
                self.notify.notified().await;
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records delivered mail; fails the first `failures` attempts
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: std::sync::Mutex<Vec<OutgoingEmail>>,
        failures: AtomicUsize,
        pub attempts: AtomicUsize,
    }

    impl RecordingMailer {
        pub fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow!("smtp unavailable"));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn mail(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        }
    }

    #[tokio::test]
    async fn test_higher_tier_drains_first_fifo_within_tier() {
        let mailer = Arc::new(RecordingMailer::default());
        let queue = EmailQueue::new(mailer.clone(), 3);

        queue.enqueue(mail("low1"), Priority::Low).await;
        queue.enqueue(mail("normal1"), Priority::Normal).await;
        queue.enqueue(mail("high1"), Priority::High).await;
        queue.enqueue(mail("normal2"), Priority::Normal).await;
        queue.enqueue(mail("high2"), Priority::High).await;
        assert_eq!(queue.len().await, 5);

        queue.drain().await;

        let order: Vec<String> = mailer.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(order, vec!["high1", "high2", "normal1", "normal2", "low1"]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let mailer = Arc::new(RecordingMailer::failing(2));
        let queue = EmailQueue::new(mailer.clone(), 3);
        queue.enqueue(mail("a"), Priority::Normal).await;

        assert_eq!(queue.process_next().await, Some(Delivery::Requeued));
        assert_eq!(queue.process_next().await, Some(Delivery::Requeued));
        assert_eq!(queue.process_next().await, Some(Delivery::Sent));
        assert_eq!(queue.process_next().await, None);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_after_max_attempts() {
        let mailer = Arc::new(RecordingMailer::failing(10));
        let queue = EmailQueue::new(mailer.clone(), 3);
        queue.enqueue(mail("a"), Priority::High).await;

        queue.drain().await;

        assert_eq!(mailer.attempts.load(Ordering::SeqCst), 3);
        assert!(mailer.sent().is_empty());
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_message_yields_to_rest_of_tier() {
        let mailer = Arc::new(RecordingMailer::failing(1));
        let queue = EmailQueue::new(mailer.clone(), 3);
        queue.enqueue(mail("first"), Priority::Normal).await;
        queue.enqueue(mail("second"), Priority::Normal).await;

        queue.drain().await;

        let order: Vec<String> = mailer.sent().into_iter().map(|m| m.to).collect();
        assert_eq!(order, vec!["second", "first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_backoff() {
        let mailer = Arc::new(RecordingMailer::failing(2));
        let queue =
            EmailQueue::new(mailer.clone(), 3).with_retry_backoff(Duration::from_secs(2));
        queue.enqueue(mail("a"), Priority::Normal).await;

        let start = Instant::now();
        queue.drain().await;

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.attempts.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backing_off_message_does_not_block_new_mail() {
        let mailer = Arc::new(RecordingMailer::failing(1));
        let queue =
            EmailQueue::new(mailer.clone(), 3).with_retry_backoff(Duration::from_secs(10));
        queue.enqueue(mail("flaky"), Priority::High).await;
        assert_eq!(queue.process_next().await, Some(Delivery::Requeued));

        queue.enqueue(mail("fresh"), Priority::Low).await;
        let start = Instant::now();
        assert_eq!(queue.process_next().await, Some(Delivery::Sent));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(mailer.sent()[0].to, "fresh");

        assert_eq!(queue.process_next().await, Some(Delivery::Sent));
        assert_eq!(mailer.sent()[1].to, "flaky");
    }

    #[test]
    fn test_backoff_grows_linearly_and_caps() {
        let queue = EmailQueue::new(Arc::new(LogMailer), 3)
            .with_retry_backoff(Duration::from_secs(2));
        assert_eq!(queue.backoff_for(1), Duration::from_secs(2));
        assert_eq!(queue.backoff_for(2), Duration::from_secs(4));
        assert_eq!(queue.backoff_for(100), MAX_RETRY_BACKOFF);
    }

    #[tokio::test]
    async fn test_worker_delivers_in_background() {
        let mailer = Arc::new(RecordingMailer::default());
        let queue = Arc::new(EmailQueue::new(mailer.clone(), 3));
        let worker = queue.clone().spawn_worker();

        queue.enqueue(mail("bg"), Priority::Low).await;

        let delivered = tokio::time::timeout(Duration::from_secs(2), async {
            while mailer.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(delivered.is_ok());
        worker.abort();
    }

    #[test]
    fn test_create_mailer_falls_back_to_log() {
        let config = EmailConfig {
            enabled: true,
            ..Default::default()
        };
        // No SMTP host: falls back without panicking.
        let _mailer = create_mailer(&config);
        assert!(SmtpMailer::from_config(&config).is_err());
    }
}
