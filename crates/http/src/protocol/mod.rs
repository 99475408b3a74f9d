//! Protocol independent request/response model.
//!
//! Both the HTTP/1.1 state machine and the HTTP/2 session driver translate
//! what they read off the wire into the types of this module, so middleware
//! sees one shape regardless of the negotiated protocol:
//!
//! - [`HeaderCollection`]: case-insensitive ordered header multi-map
//! - [`RequestHead`] / [`Request`]: request line, headers and [`RequestBody`]
//! - [`HttpContext`]: request + [`Response`](crate::response::Response) pair
//! - [`HttpContextPool`]: free-list the engine leases contexts from
//! - [`HttpError`], [`ParseError`], [`ResponseError`], [`BodyError`]

mod message;
pub use message::PayloadItem;

mod header;
pub use header::HeaderCollection;

mod request;
pub use request::Request;
pub use request::RequestHead;

mod body;
pub use body::BodySender;
pub use body::RequestBody;

mod context;
pub use context::HttpContext;

mod pool;
pub use pool::HttpContextPool;
pub use pool::PooledContext;

mod error;
pub use error::BodyError;
pub use error::BoxError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::ResponseError;
pub use error::is_benign_io;
