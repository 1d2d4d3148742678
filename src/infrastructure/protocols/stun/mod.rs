/// STUN (Session Traversal Utilities for NAT) protocol implementation
/// RFC 5389
pub mod attribute;
pub mod header;
pub mod integrity;
pub mod message;

pub use attribute::{StunAttribute, StunAttributeType};
pub use header::{StunHeader, StunMessageType, MAGIC_COOKIE};
pub use integrity::{verify_message_integrity, StunCredential};
pub use message::{StunError, StunMessage};
