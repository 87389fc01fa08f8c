use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};

use crate::connection::Connection;
use crate::engine::BlobEngine;
use crate::http::{FrameError, HttpRequest, HttpResponse};
use crate::service::KvService;
use crate::thread_pool::ThreadPool;

pub struct Server<E: BlobEngine, P: ThreadPool> {
    service: Arc<KvService<E, P>>,
}

impl<E: BlobEngine, P: ThreadPool> Server<E, P> {
    pub fn new(service: KvService<E, P>) -> Result<Self> {
        Ok(Self {
            service: Arc::new(service),
        })
    }

    pub async fn serve(&self, addr: String) -> Result<()> {
        let listener = TcpListener::bind(&addr).await?;
        log::info!("listening on {}", listener.local_addr()?);
        self.serve_on(listener).await
    }

    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = process_stream(service, stream).await {
                            log::error!("connection {} failed, reason: {}", peer, e);
                        }
                    });
                }
                Err(e) => log::error!("connection error: {}", e),
            }
        }
    }
}

async fn process_stream<E: BlobEngine, P: ThreadPool>(
    service: Arc<KvService<E, P>>,
    stream: TcpStream,
) -> Result<()> {
    let mut connection = Connection::new(stream);

    loop {
        let request = match connection.read::<HttpRequest>().await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                // answer framing errors, then drop the connection
                if let Some(frame_error) = e.downcast_ref::<FrameError>() {
                    let status = match frame_error {
                        FrameError::TooLarge(_) => 413,
                        FrameError::Malformed(_) => 400,
                    };
                    log::warn!("rejecting request, reason: {}", frame_error);
                    connection
                        .write(&HttpResponse::empty(status).with_header("Connection", "close"))
                        .await?;
                    return Ok(());
                }
                return Err(e);
            }
        };

        let keep_alive = request.keep_alive();
        let mut response = service.handle(&request).await;
        if !keep_alive {
            response = response.with_header("Connection", "close");
        }
        connection.write(&response).await?;

        if !keep_alive {
            return Ok(());
        }
    }
}
