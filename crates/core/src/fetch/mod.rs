//! Shared HTTP session used by every adapter.
//!
//! A [`FetchSession`] owns the cookie jar, default headers, optional upstream
//! proxy and the pacing policy of one source. Calls are single-attempt and
//! return `None` on any transport error or non-2xx status; retrying is left to
//! the caller.

mod bootstrap;
mod charset;
mod session;

pub use bootstrap::Bootstrap;
pub use charset::decode_body;
pub use session::{FetchResponse, FetchSession, RequestOptions, SessionError, TimeoutClass};
