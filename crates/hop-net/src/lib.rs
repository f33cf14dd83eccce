//! Networking for page navigation: URL canonicalization, HTTP/1.1 messages
//! and client, charset decoding, and the fetch/prefetch seams the router
//! depends on.

pub mod client;
pub mod decode;
pub mod fetch;
pub mod http;
pub mod tls;
pub mod url;

pub use client::Http11Client;
pub use client::HttpClientConfig;
pub use decode::decode_body;
pub use fetch::FetchFuture;
pub use fetch::FetchedPage;
pub use fetch::HttpPageFetcher;
pub use fetch::HttpPrefetcher;
pub use fetch::PageFetcher;
pub use fetch::Prefetcher;
pub use http::Header;
pub use http::HttpResponse;
pub use http::HttpStatusCode;
pub use tls::TrustStoreMode;
pub use url::PageUrl;
pub use url::Scheme;
