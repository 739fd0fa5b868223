use std::thread;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::multipart::Form;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

use crate::config::Config;
use crate::error::NetworkError;
use crate::input_loader::JobPair;

/// Sends one comparison job to the remote calculator and hands back the raw
/// HTML answer.
pub trait Submitter {
    fn submit(&self, pair: &JobPair) -> Result<String, NetworkError>;
}

const FORM_OP: &str = "seqBasedCalc";
const ROBOT_AGENT: &str = concat!("misi-robot/", env!("CARGO_PKG_VERSION"));

pub struct AniClient {
    client: Client,
    url: String,
    retries: u32,
    retry_wait: Duration,
}

impl AniClient {
    pub fn new(config: &Config) -> Result<Self, NetworkError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(ROBOT_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));

        // reqwest applies a 30s default when no timeout is set, so an explicit
        // None is needed to wait forever.
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|source| NetworkError::Transport {
                url: config.url.clone(),
                source,
            })?;

        Ok(AniClient {
            client,
            url: config.url.clone(),
            retries: config.retries,
            retry_wait: config.retry_wait,
        })
    }

    fn build_form(&self, pair: &JobPair) -> Result<Form, NetworkError> {
        let attach = |form: Form, name: &'static str, path: &std::path::Path| {
            form.file(name, path).map_err(|source| NetworkError::Upload {
                path: path.to_path_buf(),
                source,
            })
        };
        let form = Form::new().text("op", FORM_OP);
        let form = attach(form, "file1", pair.query.path())?;
        attach(form, "file2", pair.reference.path())
    }

    fn post_once(&self, pair: &JobPair) -> Result<String, NetworkError> {
        let transport = |source| NetworkError::Transport {
            url: self.url.clone(),
            source,
        };

        // The form owns both upload handles and drops them once the request is done.
        let form = self.build_form(pair)?;
        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        resp.text().map_err(transport)
    }
}

impl Submitter for AniClient {
    fn submit(&self, pair: &JobPair) -> Result<String, NetworkError> {
        let mut attempt = 0;
        loop {
            debug!("POST {} attempt {} for {}", self.url, attempt + 1, pair);
            match self.post_once(pair) {
                Ok(body) => {
                    debug!("Received {} bytes", body.len());
                    return Ok(body);
                }
                // A missing or unreadable input file will not fix itself.
                Err(e @ NetworkError::Upload { .. }) => return Err(e),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Request failed ({}), retry {}/{} in {}s",
                        e,
                        attempt,
                        self.retries,
                        self.retry_wait.as_secs()
                    );
                    thread::sleep(self.retry_wait);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::input_loader::FastaFile;
    use clap::Parser;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Serves `responses` to consecutive connections and reports every raw
    /// request it received.
    fn serve(responses: Vec<String>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut stream);
                let _ = tx.send(request);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{}/calc", addr), rx)
    }

    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let head = text[..head_end].to_ascii_lowercase();
                let body_len = buf.len() - head_end - 4;
                let content_length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok());
                match content_length {
                    Some(len) if body_len >= len => break,
                    None if text.ends_with("0\r\n\r\n") => break,
                    _ => {}
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn ok_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn pair_in(dir: &TempDir) -> JobPair {
        let q = dir.path().join("query.fna");
        let r = dir.path().join("ref.fna");
        fs::write(&q, ">q\nACGT\n").unwrap();
        fs::write(&r, ">r\nTTGA\n").unwrap();
        JobPair {
            query: FastaFile::new(q, 8),
            reference: FastaFile::new(r, 8),
        }
    }

    fn client_for(url: &str, extra: &[&str]) -> AniClient {
        let mut argv = vec!["misi-robot", "/q", "/r", "/o", "--url", url];
        argv.extend_from_slice(extra);
        let config = Config::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap();
        AniClient::new(&config).unwrap()
    }

    #[test]
    fn posts_multipart_form_with_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(&dir);
        let (url, requests) = serve(vec![ok_response("<html>done</html>")]);

        let body = client_for(&url, &[]).submit(&pair).unwrap();
        assert_eq!(body, "<html>done</html>");

        let request = requests.recv().unwrap();
        assert!(request.starts_with("POST /calc"));
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains("name=\"op\""));
        assert!(request.contains("seqBasedCalc"));
        assert!(request.contains("name=\"file1\"; filename=\"query.fna\""));
        assert!(request.contains("name=\"file2\"; filename=\"ref.fna\""));
        assert!(request.contains(">q\nACGT"));
    }

    #[test]
    fn http_error_status_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(&dir);
        let response =
            "HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let (url, _requests) = serve(vec![response]);

        let err = client_for(&url, &[]).submit(&pair).unwrap_err();
        assert!(matches!(err, NetworkError::Status { status: 502, .. }));
    }

    #[test]
    fn retries_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(&dir);
        let failing =
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string();
        let (url, requests) = serve(vec![failing, ok_response("ok")]);

        let client = client_for(&url, &["--retries", "2", "--retry-wait-secs", "0"]);
        assert_eq!(client.submit(&pair).unwrap(), "ok");
        assert_eq!(requests.iter().take(2).count(), 2);
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/calc", listener.local_addr().unwrap());
        drop(listener);

        let err = client_for(&url, &[]).submit(&pair).unwrap_err();
        assert!(matches!(err, NetworkError::Transport { .. }));
    }

    #[test]
    fn missing_upload_file_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut pair = pair_in(&dir);
        pair.reference = FastaFile::new(dir.path().join("gone.fna"), 0);

        let client = client_for("http://127.0.0.1:9/calc", &["--retries", "5"]);
        let err = client.submit(&pair).unwrap_err();
        assert!(matches!(err, NetworkError::Upload { .. }));
    }
}
