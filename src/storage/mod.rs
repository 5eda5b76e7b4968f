mod content;
mod schema;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{
    ChannelSubscription, ContentItem, DatabaseError, MediaKind, NewContent, SubscriptionOutcome,
};
