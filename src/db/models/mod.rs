//! Database models split into separate files and re-exported at
//! `crate::db::models`.

pub mod marketplace;
pub mod notification;
pub mod notification_type;
pub mod preference;
pub mod push_subscription;

pub use self::marketplace::*;
pub use self::notification::*;
pub use self::notification_type::*;
pub use self::preference::*;
pub use self::push_subscription::*;
