//! # ntlink
//!
//! A real-time pub-sub client for NetworkTables v4 telemetry servers,
//! with a buffered time-indexed history and offline playback.
//!
//! ## Core Concepts
//!
//! - **Topics**: Named, typed data streams announced by the peer
//! - **Subscriptions**: Standing requests for samples by name or prefix
//! - **History**: Every sample is kept, enabling nearest-floor lookups
//!   and timeline scrubbing
//! - **Playback**: A frozen cursor replays stored history through the
//!   same listener interface, live or from an imported recording
//!
//! ## Example
//!
//! ```ignore
//! use ntlink::{NtClient, ClientConfig, SubscriptionSpec};
//!
//! let client = NtClient::new(ClientConfig::default());
//! client.connect("10.0.0.2");
//!
//! let handle = client.subscribe_with(
//!     SubscriptionSpec::prefix("/swerve/"),
//!     |topic, sample| println!("{topic} = {:?}", sample.value),
//! );
//!
//! // Scrub the timeline: matching listeners are re-fed the values
//! // in effect at that instant.
//! client.set_selected_timestamp(ntlink::Timestamp(1_700_000));
//! client.enable_live_mode();
//!
//! handle.unsubscribe();
//! client.disconnect();
//! ```

pub mod client;
pub mod clock;
pub mod codec;
pub mod connection;
pub mod error;
pub mod import;
pub mod registry;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use client::{ClientConfig, ImportSummary, NtClient, StatusListenerToken, SubscriptionHandle};
pub use clock::ClockSync;
pub use codec::{ControlMessage, SubscriptionOptions, TopicProperties, ValueFrame};
pub use connection::{Connection, ConnectionStatus};
pub use error::{ClientError, Result};
pub use import::{parse_recording, parse_recording_file, ParsedRecording};
pub use registry::{RegistryListenerToken, TopicRegistry};
pub use store::{ReadMode, ValueStore};
pub use subscriptions::{SubscriptionManager, SubscriptionSpec};
pub use types::*;
