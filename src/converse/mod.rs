mod session;

pub use session::{ConversationTurn, ConverseConfig, ConverseSession};
