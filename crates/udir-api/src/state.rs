//! Application state management

use crate::auth::{AuthService, Clock, SystemClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use udir_core::{
    AppConfig, ConfigError, EventSink, LogRecoveryNotifier, RecoveryNotifier, UserDirectory,
};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Authentication service
    pub auth: Arc<AuthService>,
    /// Out-of-band channel for recovery tokens
    pub notifier: Arc<dyn RecoveryNotifier>,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Build state around the given directory gateway and event sink
    pub fn new(
        config: AppConfig,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, directory, events, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let auth = AuthService::from_config(&config, directory, events, clock)?;

        Ok(Self {
            config,
            auth: Arc::new(auth),
            notifier: Arc::new(LogRecoveryNotifier),
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
        })
    }

    /// Replace the recovery delivery channel
    pub fn with_notifier(mut self, notifier: Arc<dyn RecoveryNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
