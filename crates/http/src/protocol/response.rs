use http::Response;

/// The head of a response before its body is attached.
pub type ResponseHead = Response<()>;
