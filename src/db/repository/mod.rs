pub mod marketplace;
pub mod notification;
pub mod preference;
pub mod push_subscription;

pub use marketplace::MarketplaceRepository;
pub use notification::NotificationRepository;
pub use preference::PreferenceRepository;
pub use push_subscription::PushSubscriptionRepository;
