use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::connection::Connection;
use crate::engine::EntryId;
use crate::http::{HttpRequest, HttpResponse, Method};

pub struct Client {
    connection: Connection,
    host: String,
    token: Option<String>,
    route_base: String,
}

#[derive(Deserialize)]
struct Stored {
    id: EntryId,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "message")]
    error: String,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Client {
            connection: Connection::new(stream),
            host: addr.to_string(),
            token: None,
            route_base: String::new(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_route_base(mut self, base: &str) -> Self {
        self.route_base = base.trim_end_matches('/').to_string();
        self
    }

    pub async fn put(&mut self, value: &str) -> Result<EntryId> {
        let request = HttpRequest::new(Method::Post, format!("{}/store/", self.route_base))
            .with_form(&[("data", value)]);
        let response = self.send(request).await?;

        match response.status {
            200 => Ok(serde_json::from_slice::<Stored>(&response.body)?.id),
            _ => Err(error_from(&response)),
        }
    }

    pub async fn get(&mut self, id: EntryId) -> Result<Option<String>> {
        let request = HttpRequest::new(Method::Get, format!("{}/{}/", self.route_base, id));
        let response = self.send(request).await?;

        match response.status {
            200 => Ok(Some(String::from_utf8(response.body)?)),
            404 => Ok(None),
            _ => Err(error_from(&response)),
        }
    }

    async fn send(&mut self, request: HttpRequest) -> Result<HttpResponse> {
        let mut request = request.with_header("Host", self.host.clone());
        if let Some(token) = &self.token {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }

        self.connection.write(&request).await?;
        self.connection
            .read::<HttpResponse>()
            .await?
            .ok_or_else(|| anyhow!("server closed the connection"))
    }
}

fn error_from(response: &HttpResponse) -> anyhow::Error {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => anyhow!("{} (status {})", body.error, response.status),
        Err(_) => anyhow!("request failed with status {}", response.status),
    }
}
