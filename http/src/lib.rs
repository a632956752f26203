#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications
)]
#![warn(missing_docs)]

/*!
This crate provides the http/1.1 wire primitives used by
`courier-client`: the error taxonomy, methods and statuses, a header
multimap, outgoing request bodies, and an incremental response body
reader that can either borrow its transport from an in-flight exchange or
own it for streaming.

It contains no I/O of its own beyond `AsyncRead`/`AsyncWrite` plumbing;
dialing, pooling, and request orchestration live in the client crate.
*/

mod error;
pub use error::{Error, Result};

mod method;
pub use method::Method;

mod status;
pub use status::Status;

mod version;
pub use version::Version;

mod headers;
pub use headers::Headers;

mod header_name;
pub use header_name::{HeaderName, KnownHeaderName};

mod header_value;
pub use header_value::HeaderValue;

mod header_values;
pub use header_values::HeaderValues;

mod body;
pub use body::Body;

mod buffer;
pub use buffer::Buffer;

mod maybe_owned;
#[doc(hidden)]
pub use maybe_owned::MaybeOwned;

mod received_body;
pub use received_body::{ReceivedBody, ReceivedBodyState};

mod transport;
pub use transport::{BoxedTransport, Transport};

mod util;
pub use util::content_encoding;
