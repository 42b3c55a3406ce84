//! # Router Module
//!
//! Route registry built from controllers at startup, and path matching for
//! inbound requests.
//!
//! ## Overview
//!
//! A [`Controller`] lists its operations through [`Operations::add`]. For each
//! one, [`RouterBuilder::register_controller`] reads the route metadata of the
//! request type, joins the annotated path onto the registration prefix and
//! stores an [`ApiDefinition`] keyed by `Controller.Operation`. Derived
//! parameter and response schemas are computed once at this point.
//!
//! ## Architecture
//!
//! Registration and matching are separate phases:
//!
//! 1. **Registration**: a single-threaded `RouterBuilder` collects definitions.
//!    `build()` compiles each path pattern (`/users/{id}`) into a regex and
//!    freezes everything into an immutable [`Router`].
//!
//! 2. **Matching**: the `Router` is shared by `Arc` across request coroutines
//!    and never mutated, so lookups take no locks. [`RouterCell`] guards the
//!    one-time construction when the router lives in a static.
//!
//! ## Example
//!
//! ```rust,ignore
//! use metaroute::router::RouterBuilder;
//!
//! let mut builder = RouterBuilder::new();
//! builder.register_controller("/api", UsersController::default())?;
//! let router = builder.build()?;
//!
//! if let Some(m) = router.route(&http::Method::GET, "/api/users/42") {
//!     println!("{} id={:?}", m.definition.handler_name, m.get_path_param("id"));
//! }
//! ```

mod controller;
mod core;
mod definition;

pub use controller::{Controller, Invoker, Operations};
pub use core::{
    join_path, path_variables, ParamVec, RouteMatch, Router, RouterBuilder, RouterCell,
    MAX_INLINE_PARAMS,
};
pub use definition::{ApiDefinition, RegistrationError};
