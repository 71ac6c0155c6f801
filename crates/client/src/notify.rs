//! User-visible notifications (toasts).
//!
//! Stores report outcomes through a [`Notifier`]. Delivery is
//! fire-and-forget: a notifier never fails and never blocks the caller.

use std::time::Duration;

use tokio::sync::mpsc;

/// Visual treatment of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastVariant {
    #[default]
    Default,
    /// Error styling.
    Destructive,
}

/// A transient notification shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: Option<String>,
    pub variant: ToastVariant,
    /// How long the toast stays visible. `None` uses the sink's default.
    pub duration: Option<Duration>,
}

impl Toast {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant: ToastVariant::Default,
            duration: None,
        }
    }

    /// An error toast carrying the underlying message as its description.
    #[must_use]
    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variant: ToastVariant::Destructive,
            ..Self::new(title).with_description(description)
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Notifier that writes toasts to the tracing log.
///
/// Used by headless front ends such as the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        let description = toast.description.as_deref().unwrap_or_default();
        match toast.variant {
            ToastVariant::Default => {
                tracing::info!(title = %toast.title, description, "toast");
            }
            ToastVariant::Destructive => {
                tracing::warn!(title = %toast.title, description, "toast");
            }
        }
    }
}

/// Notifier that forwards toasts over an unbounded channel.
///
/// The receiving half belongs to whatever renders toasts. Toasts sent after
/// the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its toasts arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, toast: Toast) {
        if self.tx.send(toast).is_err() {
            tracing::debug!("Toast receiver dropped; notification discarded");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_toast() {
        let toast = Toast::destructive("Sign-in error", "Invalid login credentials");
        assert_eq!(toast.variant, ToastVariant::Destructive);
        assert_eq!(
            toast.description.as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(toast.duration, None);
    }

    #[test]
    fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.notify(Toast::new("first"));
        notifier.notify(Toast::new("second").with_duration(Duration::from_secs(2)));

        assert_eq!(rx.try_recv().unwrap().title, "first");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.title, "second");
        assert_eq!(second.duration, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.notify(Toast::new("ignored"));
    }
}
