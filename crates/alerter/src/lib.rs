use crate::error::AlerterError;
use configuration::TelegramConfig;
use events::TradeEvent;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
pub mod error;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str, // To allow for formatting like bold, italics etc.
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if the token or chat_id is missing from the configuration,
    /// allowing the system to gracefully disable alerting.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2", // Use Markdown for rich formatting
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AlerterError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// The trading side's handle for publishing events.
///
/// Sending never blocks and never fails the caller: when the service is gone or
/// alerting is disabled the event is dropped and logged at debug level.
#[derive(Debug, Clone, Default)]
pub struct AlertSender {
    tx: Option<mpsc::UnboundedSender<TradeEvent>>,
}

impl AlertSender {
    /// A connected sender and the receiver the alerter service drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TradeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn notify(&self, event: TradeEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(event) {
            tracing::debug!(symbol = e.0.symbol(), "Alerter service is gone, dropping event.");
        }
    }
}

/// A long-running service that drains trade events, logs them and forwards them
/// to Telegram when it is configured. Ends when every `AlertSender` is dropped.
pub async fn run_alerter_service(
    alerter: Option<TelegramAlerter>,
    mut event_rx: mpsc::UnboundedReceiver<TradeEvent>,
) {
    tracing::info!("Alerter service started. Listening for trade events.");

    if let Some(alerter) = &alerter {
        if let Err(e) = alerter.send_message("✅ *Apex Engine Started*").await {
            tracing::error!(error = ?e, "Failed to send Telegram startup alert.");
        }
    }

    while let Some(event) = event_rx.recv().await {
        tracing::info!(symbol = event.symbol(), "{}", event.summary());

        if let Some(alerter) = &alerter {
            if let Err(e) = alerter.send_message(&format_alert(&event)).await {
                tracing::error!(error = ?e, "Failed to send Telegram alert.");
            }
        }
    }

    tracing::info!("All alert senders dropped. Alerter service shutting down.");
}

/// Renders an event as a MarkdownV2 chat message.
pub fn format_alert(event: &TradeEvent) -> String {
    let icon = match event {
        TradeEvent::Entered(p) if p.is_degraded() => "🚨",
        TradeEvent::Entered(_) => "📈",
        TradeEvent::Closed(c) if c.realized_pnl.is_sign_negative() => "🔻",
        TradeEvent::Closed(_) => "💰",
        TradeEvent::Rejected(_) => "⚠️",
    };
    format!("{} {}", icon, escape_markdown(&event.summary()))
}

/// A helper function to escape characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{}", c)))
}
