use std::io::Write;

use bill_domain::notifications::{Notification, NotificationSink};
use parking_lot::Mutex;
use tracing::warn;

/// Prints notifications as lines on a terminal.
pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleNotifier {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl NotificationSink for ConsoleNotifier {
    fn emit(&self, notification: Notification) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{}", render(&notification)).and_then(|()| out.flush()) {
            warn!(bill_id = notification.key, %err, "failed to print notification");
        }
    }
}

pub fn render(notification: &Notification) -> String {
    format!("[{}] #{} {}", notification.title, notification.key, notification.body)
}
