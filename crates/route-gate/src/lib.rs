//! Route authorization gate for console navigations
//!
//! A pure decision function evaluated once per page navigation. The route
//! table classifies path prefixes as protected or open; the caller supplies
//! whether the session currently holds a credential. No I/O happens here, so
//! evaluation always resolves synchronously to a permit, a redirect to the
//! sign-in page, or (for a signed-in user visiting sign-in) a forward
//! redirect to the landing page.

pub mod error;
pub mod gate;
pub mod path;

pub use error::{Error, Result};
pub use gate::{DEFAULT_PROTECTED_PREFIXES, Decision, RouteRule, RouteTable};
pub use path::normalize_path;
