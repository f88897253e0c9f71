use bytes::Bytes;
use edge_http::protocol::{HttpError, SendError};
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The body of every response produced inside the pipeline.
///
/// Besides plain bytes and streams it can hold a JSON value that has not been
/// serialized yet, so the pretty printer decides how it is rendered.
pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Json(Option<Value>),
    Stream(UnsyncBoxBody<Bytes, HttpError>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self { inner: Kind::Once(Some(bytes)) } }
    }

    pub fn json(value: Value) -> Self {
        Self { inner: Kind::Json(Some(value)) }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)) }
    }

    pub fn is_empty(&self) -> bool {
        match &self.inner {
            Kind::Once(None) | Kind::Json(None) => true,
            Kind::Once(Some(bytes)) => bytes.is_empty(),
            Kind::Json(Some(_)) => false,
            Kind::Stream(body) => body.is_end_stream(),
        }
    }

    /// The buffered bytes, if this body is not a stream or a pending JSON value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            Kind::Once(bytes) => bytes.as_ref(),
            _ => None,
        }
    }

    /// Takes a pending JSON value out, leaving the body empty.
    pub fn take_json(&mut self) -> Option<Value> {
        match &mut self.inner {
            Kind::Json(value) => {
                let value = value.take();
                self.inner = Kind::Once(None);
                value
            }
            _ => None,
        }
    }

    pub fn take(&mut self) -> Self {
        self.replace(Self::empty())
    }

    pub fn replace(&mut self, body: Self) -> Self {
        std::mem::replace(self, body)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("Once").field(bytes).finish(),
            Kind::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Kind::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::once(Bytes::from(bytes))
    }
}

impl From<()> for ResponseBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        Self::json(value)
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let kind = &mut self.get_mut().inner;
        match kind {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Json(option_value) => Poll::Ready(option_value.take().map(|value| {
                serde_json::to_vec(&value)
                    .map(|bytes| Frame::data(Bytes::from(bytes)))
                    .map_err(|e| SendError::invalid_body(e).into())
            })),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Json(option_value) => option_value.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) | Kind::Json(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Json(Some(_)) => SizeHint::default(),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_http::protocol::ParseError;
    use futures::TryStreamExt;
    use http_body_util::{BodyExt, StreamBody};
    use serde_json::json;
    use std::io;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ResponseBody>();
    }

    #[tokio::test]
    async fn test_string_body() {
        let s = "Hello world".to_string();
        let len = s.len() as u64;

        let mut body = ResponseBody::from(s);

        assert_eq!(body.size_hint().exact(), Some(len));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body() {
        let mut body = ResponseBody::from("");

        assert!(body.is_empty());
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_json_body_serializes_compactly() {
        let body = ResponseBody::json(json!({"a": [1, 2]}));
        assert!(!body.is_empty());
        assert_eq!(body.size_hint().exact(), None);

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from_static(br#"{"a":[1,2]}"#));
    }

    #[test]
    fn test_take_json() {
        let mut body = ResponseBody::json(json!([1]));
        assert_eq!(body.take_json(), Some(json!([1])));
        assert!(body.is_empty());
        assert!(body.take_json().is_none());
    }

    #[tokio::test]
    async fn test_stream_body() {
        let chunks: Vec<Result<_, io::Error>> = vec![
            Ok(Frame::data(Bytes::from(vec![1]))),
            Ok(Frame::data(Bytes::from(vec![2]))),
            Ok(Frame::data(Bytes::from(vec![3]))),
        ];
        let stream = futures::stream::iter(chunks).map_err(|err| ParseError::from(err).into());
        let mut body = ResponseBody::stream(StreamBody::new(stream));

        assert!(body.size_hint().exact().is_none());
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap().as_ref(), [1]);
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap().as_ref(), [2]);
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap().as_ref(), [3]);
        assert!(body.frame().await.is_none());
    }
}
