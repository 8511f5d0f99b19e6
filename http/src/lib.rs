#![deny(
    clippy::all,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![doc = include_str!("../README.md")]
#![allow(clippy::module_name_repetitions)]

pub mod answer;
pub mod client;
pub mod error;
pub mod flow;
pub mod request;
pub mod routing;

pub use self::{
    answer::RequestAnswer,
    client::{Client, ClientBuilder},
    error::{Error, ErrorType},
    flow::{Flow, OverflowStrategy, RetryFlow},
    request::{Request, RequestBuilder},
    routing::Route,
};

/// Version of the REST API the client speaks.
pub const API_VERSION: u8 = 9;
