//! Client-side routing.
//!
//! Locations are normalized and matched against path templates in
//! registration order. A change runs through an ordered chain:
//!
//! 1. before-change guards (may rewrite the destination once)
//! 2. history synchronisation for redirects and rewrites
//! 3. parameter and query extraction, then the active route is replaced
//! 4. after-change hooks (the [`RouterOutlet`] swaps the region here)
//!
//! A failing guard aborts the change and leaves the previous route active.
//!
//! ## Usage
//!
//! ```ignore
//! use trellis_pages::router::{RouteDefinition, Router, RouterOptions};
//!
//! let router = Router::new(RouterOptions::default());
//! router.add(RouteDefinition::new("serie", "/serie/:serieId/:sort")?);
//! router.redirect("/serie/42/asc?search=one%20two").await?;
//!
//! let active = router.active().unwrap();
//! assert_eq!(active.param("serieId"), Some("42"));
//! assert_eq!(active.query("search"), Some("one two"));
//! ```

mod components;
mod core;
mod history;
mod params;
mod pattern;
mod route;
mod session;
mod transition;

pub use components::{LinkAttributes, RouterOutlet, intercepted_location};
pub(crate) use components::intercept_links;
pub use self::core::{ChangeOutcome, Router, RouterOptions};
pub use history::{History, HistoryListener, HistoryMode};
pub use params::{QueryMap, parse_query};
pub use pattern::{PathPattern, normalize_path, split_location};
pub use route::{ActiveRoute, ContentFactory, RouteContent, RouteDefinition};
pub use session::{SessionGuard, session_valid};
pub use transition::Transition;
