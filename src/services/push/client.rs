//! Browser side of push registration, written against capability traits so
//! the permission and retry rules can run and be tested outside a browser.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::server::PushService;
use crate::db::models::CreatePushSubscription;

pub const SERVICE_WORKER_PATH: &str = "/sw.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
    Chromium,
    Firefox,
    Brave,
    Edge,
    Safari,
    Unknown,
}

/// Feature probes a page can run. Brave reports a Chrome user agent, so the
/// user agent is only consulted after the capability checks.
pub trait BrowserProbe {
    fn user_agent(&self) -> &str;
    /// `navigator.brave` is present.
    fn has_brave_api(&self) -> bool;
    /// `window.safari.pushNotification` is present.
    fn has_safari_push_api(&self) -> bool;
    /// `navigator.userAgentData.brands`, empty when unavailable.
    fn brand_hints(&self) -> Vec<String>;
}

pub fn detect_family(probe: &dyn BrowserProbe) -> BrowserFamily {
    if probe.has_brave_api() {
        return BrowserFamily::Brave;
    }
    if probe.has_safari_push_api() {
        return BrowserFamily::Safari;
    }

    let brands = probe.brand_hints();
    let has_brand = |needle: &str| brands.iter().any(|b| b.contains(needle));
    if has_brand("Brave") {
        return BrowserFamily::Brave;
    }
    if has_brand("Microsoft Edge") {
        return BrowserFamily::Edge;
    }
    if has_brand("Google Chrome") || has_brand("Chromium") {
        return BrowserFamily::Chromium;
    }

    let ua = probe.user_agent();
    if ua.contains("Edg/") {
        BrowserFamily::Edge
    } else if ua.contains("Firefox/") {
        BrowserFamily::Firefox
    } else if ua.contains("Chrome/") || ua.contains("Chromium/") {
        BrowserFamily::Chromium
    } else if ua.contains("Safari/") {
        BrowserFamily::Safari
    } else {
        BrowserFamily::Unknown
    }
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: Duration::ZERO,
    };
}

pub trait BrowserStrategy: Send + Sync {
    fn family(&self) -> BrowserFamily;
    fn requires_user_gesture(&self) -> bool;
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::NONE
    }
    fn is_recoverable(&self, _error: &PushManagerError) -> bool {
        false
    }
}

struct ChromiumStrategy;
struct FirefoxStrategy;
struct BraveStrategy;
struct EdgeStrategy;
struct SafariStrategy;
struct UnknownStrategy;

impl BrowserStrategy for ChromiumStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Chromium
    }
    fn requires_user_gesture(&self) -> bool {
        false
    }
}

impl BrowserStrategy for FirefoxStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Firefox
    }
    fn requires_user_gesture(&self) -> bool {
        false
    }
}

/// Brave's push service depends on an optional Google component; when it is
/// off the subscribe call aborts but often succeeds on a later attempt.
impl BrowserStrategy for BraveStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Brave
    }
    fn requires_user_gesture(&self) -> bool {
        true
    }
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_secs(2),
        }
    }
    fn is_recoverable(&self, error: &PushManagerError) -> bool {
        matches!(error, PushManagerError::Abort(_))
    }
}

impl BrowserStrategy for EdgeStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Edge
    }
    fn requires_user_gesture(&self) -> bool {
        true
    }
}

impl BrowserStrategy for SafariStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Safari
    }
    fn requires_user_gesture(&self) -> bool {
        true
    }
}

impl BrowserStrategy for UnknownStrategy {
    fn family(&self) -> BrowserFamily {
        BrowserFamily::Unknown
    }
    fn requires_user_gesture(&self) -> bool {
        true
    }
}

pub fn strategy_for(family: BrowserFamily) -> Box<dyn BrowserStrategy> {
    match family {
        BrowserFamily::Chromium => Box::new(ChromiumStrategy),
        BrowserFamily::Firefox => Box::new(FirefoxStrategy),
        BrowserFamily::Brave => Box::new(BraveStrategy),
        BrowserFamily::Edge => Box::new(EdgeStrategy),
        BrowserFamily::Safari => Box::new(SafariStrategy),
        BrowserFamily::Unknown => Box::new(UnknownStrategy),
    }
}

// ============================================================================
// Browser & Server Seams
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

/// DOMException names raised by the Push API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushManagerError {
    #[error("AbortError: {0}")]
    Abort(String),
    #[error("NotAllowedError: {0}")]
    NotAllowed(String),
    #[error("InvalidStateError: {0}")]
    InvalidState(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PushClientError {
    #[error("Push messaging is not supported in this browser")]
    Unsupported,
    #[error("Permission prompt needs a user gesture in this browser")]
    GestureRequired,
    #[error("Notification permission is {0:?}")]
    PermissionDenied(Permission),
    #[error("Push manager error: {0}")]
    Manager(#[from] PushManagerError),
    #[error("Server rejected subscription change: {0}")]
    Server(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[async_trait]
pub trait PushManager: Send + Sync {
    fn supports_push(&self) -> bool;
    fn permission(&self) -> Permission;
    async fn request_permission(&self) -> Permission;
    async fn register_service_worker(&self, script: &str) -> Result<(), PushManagerError>;
    async fn get_subscription(&self) -> Result<Option<BrowserSubscription>, PushManagerError>;
    async fn subscribe(
        &self,
        application_server_key: &str,
    ) -> Result<BrowserSubscription, PushManagerError>;
    async fn unsubscribe(&self) -> Result<bool, PushManagerError>;
}

/// Where the client persists its subscription.
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    async fn save(&self, user_id: &str, subscription: &BrowserSubscription) -> Result<(), String>;
    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<(), String>;
}

#[async_trait]
impl SubscriptionSink for PushService {
    async fn save(&self, user_id: &str, subscription: &BrowserSubscription) -> Result<(), String> {
        self.register(CreatePushSubscription {
            user_id: user_id.to_string(),
            endpoint: subscription.endpoint.clone(),
            p256dh: subscription.p256dh.clone(),
            auth: subscription.auth.clone(),
            user_agent: None,
        })
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
    }

    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<(), String> {
        self.unregister(user_id, endpoint)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Push Client
// ============================================================================

pub struct PushClient<M, S> {
    manager: M,
    sink: S,
    strategy: Box<dyn BrowserStrategy>,
    vapid_public_key: String,
}

impl<M: PushManager, S: SubscriptionSink> PushClient<M, S> {
    pub fn new(
        manager: M,
        sink: S,
        probe: &dyn BrowserProbe,
        vapid_public_key: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            sink,
            strategy: strategy_for(detect_family(probe)),
            vapid_public_key: vapid_public_key.into(),
        }
    }

    pub fn family(&self) -> BrowserFamily {
        self.strategy.family()
    }

    /// Prompt for notification permission. `user_gesture` says whether the
    /// call originates from a click or key press.
    pub async fn request_permission(
        &self,
        user_gesture: bool,
    ) -> Result<Permission, PushClientError> {
        if !self.manager.supports_push() {
            return Err(PushClientError::Unsupported);
        }
        match self.manager.permission() {
            Permission::Granted => return Ok(Permission::Granted),
            Permission::Denied => return Err(PushClientError::PermissionDenied(Permission::Denied)),
            Permission::Default => {}
        }
        if self.strategy.requires_user_gesture() && !user_gesture {
            return Err(PushClientError::GestureRequired);
        }

        match self.manager.request_permission().await {
            Permission::Granted => Ok(Permission::Granted),
            other => Err(PushClientError::PermissionDenied(other)),
        }
    }

    /// Subscribe this browser and persist it for `user_id`. Failures are
    /// logged and yield `None`.
    pub async fn subscribe(&self, user_id: &str) -> Option<BrowserSubscription> {
        match self.try_subscribe(user_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    browser = ?self.strategy.family(),
                    "Push subscribe failed: {}",
                    e
                );
                None
            }
        }
    }

    async fn try_subscribe(&self, user_id: &str) -> Result<BrowserSubscription, PushClientError> {
        if !self.manager.supports_push() {
            return Err(PushClientError::Unsupported);
        }
        let permission = self.manager.permission();
        if permission != Permission::Granted {
            return Err(PushClientError::PermissionDenied(permission));
        }

        self.manager
            .register_service_worker(SERVICE_WORKER_PATH)
            .await?;

        let subscription = match self.manager.get_subscription().await? {
            Some(existing) => existing,
            None => self.subscribe_with_retry().await?,
        };

        self.sink
            .save(user_id, &subscription)
            .await
            .map_err(PushClientError::Server)?;

        Ok(subscription)
    }

    async fn subscribe_with_retry(&self) -> Result<BrowserSubscription, PushManagerError> {
        let policy = self.strategy.retry_policy();
        let mut attempt = 0;
        loop {
            match self.manager.subscribe(&self.vapid_public_key).await {
                Ok(subscription) => return Ok(subscription),
                Err(e) if attempt < policy.max_retries && self.strategy.is_recoverable(&e) => {
                    attempt += 1;
                    tracing::debug!(
                        attempt,
                        max_retries = policy.max_retries,
                        "Recoverable push subscribe error, retrying: {}",
                        e
                    );
                    tokio::time::sleep(policy.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns `false` when the browser had no subscription.
    pub async fn unsubscribe(&self, user_id: &str) -> Result<bool, PushClientError> {
        let Some(existing) = self.manager.get_subscription().await? else {
            return Ok(false);
        };

        self.manager.unsubscribe().await?;
        self.sink
            .remove(user_id, &existing.endpoint)
            .await
            .map_err(PushClientError::Server)?;
        Ok(true)
    }
}
