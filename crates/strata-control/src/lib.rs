//! # strata-control: Lifecycle Command Bus
//!
//! Lets an operator (or any component) steer running sync loops without
//! holding references to them: messages are published on a [`Topic`] and
//! every [`Subscription`] on that topic receives them.
//!
//! ## Example Usage
//!
//! ```rust
//! use strata_control::{CommandMessage, ControlBus, Topic};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = ControlBus::default();
//! let mut sub = bus.subscribe(&[Topic::Global, Topic::sync("docs")]);
//!
//! bus.publish_str(&Topic::sync("docs"), "pause").unwrap();
//! let delivery = sub.recv().await.unwrap();
//! assert_eq!(delivery.message, CommandMessage::Pause);
//! # }
//! ```

pub mod bus;
pub mod error;
pub mod message;
pub mod topic;

pub use bus::{BusConfig, ControlBus, Delivery, Subscription, DEFAULT_BUS_CAPACITY};
pub use error::{ControlError, ControlResult};
pub use message::{message_from_string, CommandMessage, VOCABULARY};
pub use topic::Topic;
