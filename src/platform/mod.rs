//! Remote merchant-platform API client
//!
//! Everything that crosses the wire to the platform lives here: the OAuth
//! token exchange, cursor-paginated collection fetches, and webhook
//! registration. The rest of the service talks to the [`PlatformApi`]
//! trait, so tests substitute a scripted stub instead of a network.

pub mod client;
pub mod types;

pub use client::{HttpPlatformClient, PlatformApi};
pub use types::{
    AccessTokenResponse, Page, RemoteInventoryLevel, RemoteLineItem, RemoteOrder, RemoteProduct,
};
