//! dapter — Debug Adapter Protocol endpoint library.
//!
//! [DAP](https://microsoft.github.io/debug-adapter-protocol/) is a
//! JSON-based, length-prefixed, bidirectional request/response/event
//! protocol between a debugger UI and a debugger backend. A [`Session`]
//! implements either peer: register typed handlers for inbound requests
//! and events, send outbound requests whose responses resolve
//! asynchronously, and let the engine correlate every frame on one
//! full-duplex byte stream.
//!
//! ```no_run
//! use dapter::protocol::InitializeRequest;
//! use dapter::{DapError, Session};
//!
//! # async fn demo() -> Result<(), DapError> {
//! let (read, write) = dapter::net::connect("localhost", 4711)
//!     .await
//!     .map_err(|e| DapError::Transport(e.to_string()))?;
//!
//! let session = Session::new();
//! session.on_error(|message| eprintln!("protocol error: {message}"));
//! session.bind(read, write)?;
//!
//! let capabilities = session
//!     .send(InitializeRequest {
//!         adapter_id: "lldb".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{capabilities:?}");
//! # Ok(())
//! # }
//! ```
//!
//! Message types beyond the bundled [`protocol`] catalog are declared with
//! [`schema_struct!`] plus [`schema_request!`] or [`schema_event!`].

pub mod codec;
pub mod error;
pub mod future;
pub mod net;
pub mod protocol;
pub mod schema;
pub mod session;
pub mod transport;
pub mod value;

// Re-export the working surface.
pub use codec::{CodecError, Decoder, Encoder, FieldEncoder};
pub use error::DapError;
pub use future::ResponseFuture;
pub use schema::{find_type, type_of, Schema, TypeDescriptor};
pub use session::{Event, IntoResponse, Rejection, Request, Response, Session};
pub use transport::{ContentReader, ContentWriter};
pub use value::{Null, Object, Value, Variant};
