//! Host side of the `readwise` command: a blocking ureq `Transport` for
//! `readwise_core::Reader` and the JSON rendering the binary prints.

pub mod output;
pub mod transport;

pub use output::{print_json, DocumentSummary};
pub use transport::UreqTransport;
