//! # Type Parameter Assigner
//!
//! Assign parameter values to the family types of a cloud-hosted Revit
//! model without opening it.
//!
//! The catalog side pages through a model's elements over GraphQL and
//! memoizes the result per model key, so family/type pickers and the viewer
//! color map are computed from one fetch. The job side groups the user's
//! assignment rows into a configuration document, submits it with the
//! source model to a remote automation activity and polls the work item to
//! a terminal status.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────┐
//! │  Query   │──▶│  Catalog  │──▶│    Cache     │──▶ options / colors
//! │ GraphQL  │   │  builder  │   │ per model key│
//! └──────────┘   └───────────┘   └─────────────┘
//!
//! ┌──────────┐   ┌───────────┐   ┌─────────────┐
//! │  Sheet   │──▶│  Payload  │──▶│ Orchestrator │──▶ engine (submit/poll/finalize)
//! │  rows    │   │  builder  │   │  + activity  │
//! └──────────┘   └───────────┘   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`query`] | GraphQL executor |
//! | [`catalog`] | Paginated element catalog |
//! | [`cache`] | Catalog memoization |
//! | [`options`] | Fail-soft option lists |
//! | [`visualize`] | External-id → color mapping |
//! | [`payload`] | Job request assembly |
//! | [`activity`] | Per-version activity resolution |
//! | [`engine`] | Remote execution engine |
//! | [`job`] | Submit/poll orchestration |
//! | [`progress`] | Job progress reporting |
//! | [`session`] | Per-user context |
//! | [`sheet`] | Assignment sheets |
//! | [`urn`] | Model identifiers |
//! | [`server`] | HTTP API |

pub mod activity;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod models;
pub mod options;
pub mod payload;
pub mod progress;
pub mod query;
pub mod server;
pub mod session;
pub mod sheet;
pub mod urn;
pub mod visualize;
