pub mod dispatcher;
pub mod feeds;
pub mod janitor;
pub mod subscriptions;

pub use dispatcher::{DispatchResult, Dispatcher};
pub use feeds::{AddFeedResult, FeedService, FetchFeedResult};
pub use janitor::{CleanupResult, Janitor};
pub use subscriptions::{ChannelSubscription, SubscribeResult, SubscriptionService, UnsubscribeResult};
