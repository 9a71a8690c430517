//! Domain types shared by the relay service.
//!
//! Holds the tenant model and the registry the relay resolves callers against.

pub mod tenant;
