//! Tycho — dynamic HTTP tool execution engine.
//!
//! Invokes arbitrary third-party HTTP APIs as "tools" from a
//! declarative description — endpoint, JSON Schema, auth, optional
//! async-polling rules — with no per-provider client code. One
//! [`engine::Engine`] serves a whole platform: it loads method
//! configuration and credentials from an injected store, signs or
//! injects auth per the credentials shape, drives async jobs to
//! completion, and moves file-handle resources between the blob store
//! and the wire formats APIs expect.
//!
//! # Quick Start
//!
//! ```no_run
//! use tycho::prelude::*;
//!
//! # async fn example(engine: tycho::engine::Engine) {
//! let ctx = CallerContext::builder()
//!     .user_id("u-1")
//!     .canvas_id("c-1")
//!     .build();
//! let response = engine
//!     .execute("image-gen", "generate", serde_json::json!({"prompt": "a cat"}), ctx)
//!     .await;
//! if response.success {
//!     println!("{:?}", response.json());
//! }
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod handler;
pub mod prelude;
pub mod resource;
pub mod schema;
pub mod signer;
pub mod store;
pub mod util;
