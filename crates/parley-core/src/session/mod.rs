//! Conversation sessions and their orchestration: per-session state, turn
//! scheduling, topic selection, and the top-level session manager.

pub mod manager;
pub mod scheduler;
pub mod state;
pub mod topic;

pub use manager::SessionManager;
pub use scheduler::TurnScheduler;
pub use state::ConversationSession;
pub use topic::TopicSelector;
