//! Client-side synchronization for GUDPALS.
//!
//! Everything here talks to the store through a [`Gateway`]: load an ordered
//! history, subscribe to pushes for the same scope, and merge pushes into the
//! local sequence without duplicates. Writes that must be single-instance go
//! through [`RegistrationWriter`]. Live video runs through [`LiveSession`].

pub mod chat;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod http;
pub mod live;
pub mod local;
pub mod merge;
pub mod registration;
pub mod reminders;
pub mod scope;

pub use chat::{ChatRoom, ConversationScope, conversations, inbox};
pub use error::{Result, SyncError};
pub use feed::Subscription;
pub use gateway::Gateway;
pub use http::HttpGateway;
pub use live::{LiveSession, LiveState, LiveViewer, MediaService, end_live, go_live};
pub use local::LocalGateway;
pub use merge::{MergeStore, Record};
pub use registration::{RegistrationOutcome, RegistrationWriter};
pub use scope::{Scope, ScopeFeed, SessionChatScope};
