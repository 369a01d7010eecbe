pub mod aggregate;
pub mod guard;
pub mod leaderboard;
pub mod notify;
pub mod poller;
pub mod render;
pub mod reports;
pub mod scheduler;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;
