#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use paperdesk_core::auth::{MemoryCredentialStore, StoredCredentials};
use paperdesk_core::tasks::Sleeper;
use paperdesk_core::{
    ApiClient, Config, Navigator, NotificationSink, Notice, SessionManager, SharedSession, UserProfile, View,
    ViewTracker,
};

/// Navigator counting how often the pipeline sent the user to login.
pub struct CountingNavigator {
    tracker: ViewTracker,
    redirects: AtomicUsize,
}

impl CountingNavigator {
    pub fn new(initial: View) -> Self {
        Self {
            tracker: ViewTracker::new(initial),
            redirects: AtomicUsize::new(0),
        }
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn current_view(&self) -> View {
        self.tracker.current_view()
    }

    fn go_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        self.tracker.go_to_login();
    }
}

#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Sleeper that returns immediately, for polling tests against a mock server.
#[derive(Default)]
pub struct InstantSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.delays.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

pub struct Harness {
    pub api: ApiClient,
    pub manager: SessionManager,
    pub session: SharedSession,
    pub store: Arc<MemoryCredentialStore>,
    pub navigator: Arc<CountingNavigator>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(Config {
            base_url: base_url.to_string(),
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, StoredCredentials::default())
    }

    pub fn with_record(base_url: &str, record: StoredCredentials) -> Self {
        Self::build(
            Config {
                base_url: base_url.to_string(),
                ..Config::default()
            },
            record,
        )
    }

    fn build(config: Config, record: StoredCredentials) -> Self {
        let store = Arc::new(MemoryCredentialStore::with_record(record));
        let session = SharedSession::new(store.clone());
        let navigator = Arc::new(CountingNavigator::new(View::Dashboard));
        let sink = Arc::new(RecordingSink::default());
        let api = ApiClient::new(&config, session.clone(), navigator.clone(), sink.clone()).expect("client builds");
        let manager = SessionManager::new(api.clone());
        Self {
            api,
            manager,
            session,
            store,
            navigator,
            sink,
        }
    }

    /// Put the session into the authenticated state directly.
    pub async fn authenticate(&self, token: &str) {
        self.session
            .establish(token.to_string(), profile("alice"))
            .await
            .expect("establish session");
    }
}

pub fn profile(username: &str) -> UserProfile {
    UserProfile {
        id: 1,
        username: username.to_string(),
        email: None,
        is_active: true,
        is_superuser: false,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    }
}

pub fn profile_json(username: &str, email: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "id": 1,
        "username": username,
        "email": email,
        "is_active": true,
        "is_superuser": false,
        "created_at": "2024-03-01T08:00:00Z",
        "updated_at": "2024-03-01T08:00:00Z"
    })
}
