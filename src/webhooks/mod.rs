//! GitHub webhook deliveries: signature verification and parsing into
//! subscription changes.

pub mod events;
pub mod parser;
pub mod signature;

pub use events::SubscriptionEvent;
pub use parser::{ParseError, parse_webhook};
pub use signature::{WebhookSecret, parse_signature_header};
