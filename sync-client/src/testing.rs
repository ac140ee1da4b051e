//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthSession;
use crate::device::RuntimeEnvironment;
use crate::storage::MemoryStore;

pub(crate) const TEST_TOKEN: &str = "tok-1";

pub(crate) fn environment() -> RuntimeEnvironment {
    RuntimeEnvironment {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".into(),
        screen_resolution: "1920x1080".into(),
        timezone: "America/Denver".into(),
        language: "en-US".into(),
    }
}

/// Session over `storage`, already logged in with [`TEST_TOKEN`].
pub(crate) fn logged_in(storage: &MemoryStore) -> Arc<AuthSession> {
    let session = AuthSession::new(Arc::new(storage.clone()));
    session.login(TEST_TOKEN, None).unwrap();
    Arc::new(session)
}

/// Poll `condition` on the (usually paused) tokio clock.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..20_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
