//! Infrastructure layer - Protocol implementations

pub mod protocols;
