//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! connection reads: the tenant registry and the loaded configuration.

use crate::config::Config;
use relay_core::tenant::TenantRegistry;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn TenantRegistry>,
    pub config: Arc<Config>,
}
