//! Seam between the connection engines and the application.
//!
//! Both the HTTP/1.1 state machine and the HTTP/2 session driver hand every
//! initialized [`HttpContext`] to a [`Dispatcher`] and wait for it to finish
//! before the context goes back to the pool. A dispatcher is expected to leave
//! a response on the context; it never returns errors, turning application
//! failures into responses is its own business.

use crate::protocol::HttpContext;

#[trait_variant::make(Dispatcher: Send)]
pub trait LocalDispatcher {
    async fn dispatch(&self, context: &mut HttpContext);
}
