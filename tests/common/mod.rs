#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod temp_files {
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Write `content` to a fresh temp file with the given extension
    pub fn create_temp_file(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("brrtd_test_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    pub fn create_temp_yaml(content: &str) -> NamedTempFile {
        create_temp_file(content, "yaml")
    }
}

pub mod http {
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// A response read off the wire
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: HashMap<String, String>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    pub fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Read the status line and headers of one response, leaving the body unread
    pub fn read_head(reader: &mut BufReader<TcpStream>) -> Option<RawResponse> {
        let mut status_line = String::new();
        if reader.read_line(&mut status_line).ok()? == 0 {
            return None;
        }
        let status = status_line.split_whitespace().nth(1)?.parse().ok()?;

        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).ok()?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
        Some(RawResponse {
            status,
            headers,
            body: Vec::new(),
        })
    }

    /// Read exactly one response (headers plus `content-length` body)
    ///
    /// Returns `None` if the server closed the connection without answering.
    pub fn read_response(reader: &mut BufReader<TcpStream>) -> Option<RawResponse> {
        let mut response = read_head(reader)?;
        let len: usize = response
            .header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0; len];
        reader.read_exact(&mut body).ok()?;
        response.body = body;
        Some(response)
    }

    /// Send a raw request on a fresh connection and read one response
    pub fn send_request(addr: SocketAddr, raw: &str) -> Option<RawResponse> {
        let mut stream = connect(addr);
        stream.write_all(raw.as_bytes()).unwrap();
        let mut reader = BufReader::new(stream);
        read_response(&mut reader)
    }

    /// `GET path` with `Connection: close`
    pub fn get(addr: SocketAddr, path: &str) -> RawResponse {
        send_request(
            addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        )
        .expect("server closed connection without a response")
    }

    /// Whether the server closed the connection (EOF) without sending bytes
    pub fn closed_without_response(mut stream: TcpStream) -> bool {
        let mut buf = [0u8; 1];
        matches!(stream.read(&mut buf), Ok(0) | Err(_))
    }
}

pub mod test_server {
    use brrtdispatch::config::ServerConfig;
    use brrtdispatch::server::{Server, ServerHandle};
    use std::net::SocketAddr;

    /// Loopback config on an ephemeral port with short timeouts
    pub fn test_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            workers: 2,
            shutdown_grace_ms: 1_000,
            keep_alive_timeout_ms: 1_000,
            ..ServerConfig::default()
        }
    }

    /// Running server that is shut down when dropped
    pub struct TestServer {
        handle: Option<ServerHandle>,
    }

    impl TestServer {
        /// Register handlers through `setup`, then start
        pub fn start<F>(config: ServerConfig, setup: F) -> Self
        where
            F: FnOnce(&Server),
        {
            let server = Server::new(config);
            setup(&server);
            Self::from_server(server)
        }

        pub fn from_server(server: Server) -> Self {
            let handle = server.start().unwrap();
            handle.wait_ready().unwrap();
            Self {
                handle: Some(handle),
            }
        }

        pub fn addr(&self) -> SocketAddr {
            self.handle().local_addr()
        }

        pub fn handle(&self) -> &ServerHandle {
            self.handle.as_ref().unwrap()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.shutdown();
            }
        }
    }
}
