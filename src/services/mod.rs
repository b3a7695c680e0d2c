pub mod init;
pub mod notifiers;
pub mod preferences;
pub mod push;
pub mod realtime;
pub mod store;
pub mod templates;
pub mod webhooks;
