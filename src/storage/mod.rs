mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{
    ClaimedFeed, Feed, FeedWithOwner, FollowRow, FollowedFeed, NewPost, Post, StoreError, User,
};
