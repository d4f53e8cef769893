//! Client-side data layer for the course marketplace API.
//!
//! # Overview
//! Every call flows through the same pipeline:
//!
//! endpoint descriptor → transport adapter (base URL, bearer token, HTTP)
//! → response middleware (notifications, envelope unwrap) → query cache.
//!
//! # Design
//! - Endpoints build `HttpRequest` values as plain data, so the registry is
//!   testable without I/O.
//! - Pipeline stages implement `Service` and compose by wrapping.
//! - The cache invalidates by tag and refetches subscribed entries after
//!   mutations settle.
//! - The progress update patches the cached progress query optimistically and
//!   reverts exactly its own patch on failure.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod cache;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod middleware;
pub mod optimistic;
pub mod tags;
pub mod transport;
pub mod types;

pub use cache::{CacheKey, FetchStatus, PatchHandle, QueryCache};
pub use client::{CourseApi, DefaultPipeline, Subscription};
pub use config::{ClientConfig, PageOrigin};
pub use endpoints::{Endpoint, EndpointKind};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use middleware::{ChannelNotifier, Notification, Notifier, Notifying, TracingNotifier};
pub use optimistic::{OptimisticPatch, OptimisticUpdate, PatchState};
pub use tags::{Tag, TagKind};
pub use transport::{
    HttpClient, NoSession, ReqwestClient, Service, StaticToken, TokenProvider, TransportAdapter,
};
