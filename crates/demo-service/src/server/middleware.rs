//! Settings for the middleware layers applied to the router.

use std::time::Duration;

/// Per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
