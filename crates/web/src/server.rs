use crate::pipeline::EdgeHandler;
use edge_http::connection::HttpConnection;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ServerBuilder {
    handler: Option<EdgeHandler>,
    address: Option<SocketAddr>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { handler: None, address: None }
    }

    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn handler(mut self, handler: EdgeHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let handler = self.handler.ok_or(ServerError::MissingHandler)?;
        let address = self.address.ok_or(ServerError::MissingAddress)?;
        Ok(Server { handler: Arc::new(handler), address })
    }
}

#[derive(Debug)]
pub struct Server {
    handler: Arc<EdgeHandler>,
    address: SocketAddr,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("address must be set")]
    MissingAddress,
    #[error("can't bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the configured address and serves until the task is dropped.
    pub async fn start(self) -> Result<(), ServerError> {
        let tcp_listener =
            TcpListener::bind(self.address).await.map_err(|source| ServerError::Bind { address: self.address, source })?;
        info!(address = %self.address, layout = ?self.handler.layout(), "start listening");
        self.serve(tcp_listener).await;
        Ok(())
    }

    /// Accepts connections from an already bound listener, one task per connection.
    pub async fn serve(self, tcp_listener: TcpListener) {
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer);
                match connection.process(handler).await {
                    Ok(_) => {
                        debug!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                    }
                }
            });
        }
    }
}
