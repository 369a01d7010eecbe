pub mod backend;
pub mod discord;
pub mod noop;
pub mod router;

pub use backend::NotifyBackend;
pub use discord::DiscordWebhook;
pub use noop::NoopBackend;
pub use router::NotifyRouter;
