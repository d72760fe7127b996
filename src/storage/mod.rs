mod entries;
mod feeds;
mod receipts;
mod schema;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Feed, FeedEntry, NewEntry, Subscription, SubscriptionSettings,
};
