//! Navigation side-channel used by the request pipeline.
//!
//! The only navigation the core ever triggers is "go to the login view",
//! after a 401 invalidated the session.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Login,
    Dashboard,
    Other(String),
}

pub trait Navigator: Send + Sync {
    fn current_view(&self) -> View;

    /// Switch to the login view.
    ///
    /// Once this returns, `current_view` must report `View::Login`. The
    /// pipeline checks the current view under its expiry lock to navigate at
    /// most once for a burst of 401s, so the update cannot be deferred.
    fn go_to_login(&self);
}

/// Navigator that keeps track of the current view and optionally forwards
/// every navigation to a UI task.
#[derive(Debug)]
pub struct ViewTracker {
    current: Mutex<View>,
    tx: Option<mpsc::UnboundedSender<View>>,
}

impl ViewTracker {
    pub fn new(initial: View) -> Self {
        Self {
            current: Mutex::new(initial),
            tx: None,
        }
    }

    pub fn with_channel(initial: View) -> (Self, mpsc::UnboundedReceiver<View>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            current: Mutex::new(initial),
            tx: Some(tx),
        };
        (tracker, rx)
    }

    /// Record a navigation performed by the UI itself.
    pub fn set_view(&self, view: View) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = view;
    }
}

impl Navigator for ViewTracker {
    fn current_view(&self) -> View {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn go_to_login(&self) {
        debug!("Navigating to login view");
        self.set_view(View::Login);
        if let Some(ref tx) = self.tx {
            if tx.send(View::Login).is_err() {
                warn!("Navigation dropped - receiver closed");
            }
        }
    }
}
