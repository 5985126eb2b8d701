//! Error display collaborator.

use tracing::error;

/// Shows a failure message to the user, e.g. as a toast.
///
/// Only called for requests that opted in with `show_error`, and never for
/// requests this client canceled itself.
pub trait ErrorNotifier: Send + Sync {
    fn notify(&self, message: &str);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

impl ErrorNotifier for TracingNotifier {
    fn notify(&self, message: &str) {
        error!(message, "request error");
    }
}
