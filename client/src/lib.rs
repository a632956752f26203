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
A requests-style asynchronous http/1.1 client.

A [`Client`] is a session: it owns a per-origin connection pool, a cookie
jar, default headers, and default authentication, and drives each request
through a pipeline that handles connection reuse, cookie round-trips,
basic/bearer/digest auth (including the 401 challenge dance), and
method-aware redirect following.

```no_run
use courier_client::{Auth, Client, RequestOptions, RustlsConfig, TcpConfig};

# futures_lite::future::block_on(async {
let client = Client::new(RustlsConfig::new(TcpConfig::default()))
    .with_auth(Auth::basic("user", "secret"));

let response = client
    .post(
        "https://api.example.com/widgets",
        RequestOptions::new().with_json(r#"{"name":"sprocket"}"#),
    )
    .await?;

println!("{} from {}", response.status(), response.url());
println!("{}", response.text());
# courier_client::Result::Ok(()) });
```

I/O is driven entirely by the caller awaiting futures; dropping a request
future cancels it and closes whatever connection it held. A session makes
no internal thread-safety promises: issue requests on it sequentially, or
clone it per task and accept independent orderings.
*/

mod auth;
pub use auth::{Auth, AuthContext, AuthScheme, DigestAuth};

mod client;
pub use client::{Client, IntoUrl};

mod conn;

mod connector;
pub use connector::Connector;

mod jar;
pub use jar::{Cookie, CookieJar, SameSite};

mod options;
pub use options::{RequestOptions, TlsConfig};

mod plan;

mod pool;

mod redirects;

mod response;
pub use response::{BodyStream, HttpError, Response, StreamedResponse};

mod tcp;
pub use tcp::TcpConfig;

mod tls;
pub use tls::RustlsConfig;

pub mod testing;

pub use courier_http::{
    Body, Error, HeaderName, HeaderValue, HeaderValues, Headers, KnownHeaderName, Method,
    ReceivedBody, Result, Status, Version,
};
