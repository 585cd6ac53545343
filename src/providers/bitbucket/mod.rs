mod client;
mod collector;
mod paginator;
mod provider;
mod reducer;
mod resolver;
mod types;


pub use provider::{BitbucketProvider, GatherSettings};
