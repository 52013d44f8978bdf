//! Subscriber registry for frame fan-out
//!
//! The registry tracks every live subscriber and hands each broadcast frame
//! to all of them. Each subscriber owns a small bounded queue; a subscriber
//! that falls behind loses frames instead of slowing anyone else down.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SubscriberRegistry>
//!                     ┌─────────────────────────┐
//!                     │ subscribers: HashMap<   │
//!                     │   SubscriberId,         │
//!                     │   mpsc::Sender<Frame>,  │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Capture loop]         [Subscription]          [Subscription]
//!    source.next_frame()    sub.pull()              sub.pull()
//!         │                       │                       │
//!         └──► registry.broadcast()──► try_send ──► multipart ──► TCP
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` is reference counted, so every subscriber queue holds the
//! same allocation. Broadcasting a frame never copies image data.

pub mod config;
pub mod entry;
pub mod frame;
pub mod store;
pub mod subscription;

pub use config::RegistryConfig;
pub use entry::{BroadcastOutcome, Delivery};
pub use frame::{Frame, SubscriberId};
pub use store::SubscriberRegistry;
pub use subscription::Subscription;
