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

pub mod headers;

mod ledger;

pub use self::{
    headers::RatelimitSnapshot,
    ledger::{Ledger, LedgerClosed, Passage},
};
