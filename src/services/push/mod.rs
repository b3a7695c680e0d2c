pub mod client;
pub mod gateway;
pub mod presentation;
pub mod server;

pub use gateway::{DeliveryOutcome, PushGateway, VapidKeys, WebPushGateway};
pub use presentation::{presentation_for, PushPayload, Urgency};
pub use server::{PushSendReport, PushService};
