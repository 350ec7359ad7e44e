//! Blocking HTTP transport backed by ureq.

use std::time::Duration;

use readwise_core::config::MAX_RESPONSE_BYTES;
use readwise_core::{ApiError, HttpMethod, HttpRequest, HttpResponse, Transport};
use tracing::debug;

/// Executes core `HttpRequest`s with a shared ureq agent.
///
/// Status codes are returned as data (`http_status_as_error(false)`) so the
/// core does the dispatch. A timeout, connection failure or a body over
/// `MAX_RESPONSE_BYTES` becomes `ApiError::Transport`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

fn decorate<B>(mut builder: ureq::RequestBuilder<B>, req: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (key, value) in &req.query {
        builder = builder.query(key, value);
    }
    for (name, value) in &req.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let result = match (req.method, &req.body) {
            (HttpMethod::Get, _) => decorate(self.agent.get(&req.url), req).call(),
            (HttpMethod::Delete, Some(body)) => decorate(self.agent.delete(&req.url), req)
                .force_send_body()
                .send(body.as_bytes()),
            (HttpMethod::Delete, None) => decorate(self.agent.delete(&req.url), req).call(),
            (HttpMethod::Post, Some(body)) => {
                decorate(self.agent.post(&req.url), req).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => decorate(self.agent.post(&req.url), req).send_empty(),
            (HttpMethod::Patch, Some(body)) => {
                decorate(self.agent.patch(&req.url), req).send(body.as_bytes())
            }
            (HttpMethod::Patch, None) => decorate(self.agent.patch(&req.url), req).send_empty(),
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!("{} {} -> {status}", req.method.as_str(), req.url);

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    /// Serve one canned response on a random port. The raw request (head and
    /// body) is sent back over the returned channel.
    fn serve_once(status_line: &'static str, body: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();
            tx.send(head + &String::from_utf8(request_body).unwrap())
                .unwrap();

            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(body.as_bytes()).unwrap();
            stream.flush().unwrap();
        });

        (format!("http://{addr}"), rx)
    }

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            query: vec![("limit".to_string(), "100".to_string())],
            headers: vec![("authorization".to_string(), "Token t".to_string())],
            body: None,
        }
    }

    #[test]
    fn reads_bodies_larger_than_ten_mebibytes() {
        let body = "x".repeat(11 * 1024 * 1024);
        let (addr, _rx) = serve_once("HTTP/1.1 200 OK", body);

        let transport = UreqTransport::new(Duration::from_secs(30));
        let response = transport.execute(&get(format!("{addr}/list/"))).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), 11 * 1024 * 1024);
    }

    #[test]
    fn error_statuses_are_returned_as_data() {
        let (addr, rx) = serve_once("HTTP/1.1 429 Too Many Requests", String::new());

        let transport = UreqTransport::new(Duration::from_secs(30));
        let response = transport.execute(&get(format!("{addr}/list/"))).unwrap();
        assert_eq!(response.status, 429);

        let request = rx.recv().unwrap();
        assert!(request.starts_with("GET /list/?limit=100 HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("authorization: token t\r\n"));
    }

    #[test]
    fn delete_sends_its_json_body() {
        let (addr, rx) = serve_once("HTTP/1.1 204 No Content", String::new());

        let transport = UreqTransport::new(Duration::from_secs(30));
        let request = HttpRequest {
            method: HttpMethod::Delete,
            url: format!("{addr}/delete/doc1/"),
            query: Vec::new(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(r#"{"id":"doc1"}"#.to_string()),
        };
        let response = transport.execute(&request).unwrap();
        assert_eq!(response.status, 204);

        let raw = rx.recv().unwrap();
        assert!(raw.starts_with("DELETE /delete/doc1/ HTTP/1.1\r\n"));
        assert!(raw.ends_with(r#"{"id":"doc1"}"#));
    }
}
