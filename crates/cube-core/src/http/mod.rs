//! HTTP plumbing: the transport seam, the `ureq` transport and the
//! authenticated session every REST call goes through.

pub mod session;
pub mod transport;
pub mod ureq_transport;

pub use session::{error_message, HttpSession};
pub use transport::{HttpTransport, Method, Request, Response};
pub use ureq_transport::UreqTransport;
