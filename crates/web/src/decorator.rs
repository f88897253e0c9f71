//! Decorators wrap one value into another, typically a [`RequestHandler`]
//! into a handler that post-processes its responses.
//!
//! [`RequestHandler`]: crate::handler::RequestHandler

pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}
