//! FTP polling source.
//!
//! Speaks just enough FTP for tailing: `USER`/`PASS`, `TYPE I`, `SIZE` for the
//! current length and passive-mode `REST` + `RETR` for the new range. The
//! control connection is kept between polls and rebuilt after any error.

use super::config::FtpSettings;
use super::source::LogSource;
use crate::error::TransportError;
use async_trait::async_trait;
use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub struct FtpSource {
    settings: FtpSettings,
    remote_path: String,
    control: Option<FtpControl>,
}

impl FtpSource {
    pub fn new(settings: FtpSettings, remote_path: impl Into<String>) -> Self {
        Self {
            settings,
            remote_path: remote_path.into(),
            control: None,
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        timeout(self.settings.timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout(self.settings.timeout))?
    }

    async fn control(&mut self) -> Result<&mut FtpControl, TransportError> {
        if self.control.is_none() {
            let control = self.with_timeout(FtpControl::open(&self.settings)).await?;
            self.control = Some(control);
        }
        self.control
            .as_mut()
            .ok_or_else(|| TransportError::Ftp("control connection unavailable".to_string()))
    }

    async fn query_size(&mut self) -> Result<Option<u64>, TransportError> {
        let path = self.remote_path.clone();
        let control = self.control().await?;
        let (code, text) = control.command(&format!("SIZE {}", path)).await?;
        match code {
            213 => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| TransportError::Ftp(format!("bad SIZE reply: {}", text))),
            550 => Ok(None),
            _ => Err(TransportError::Ftp(format!("SIZE failed: {} {}", code, text))),
        }
    }

    async fn retrieve(&mut self, start: u64, len: u64) -> Result<Vec<u8>, TransportError> {
        let host = self.settings.host.clone();
        let path = self.remote_path.clone();
        let control = self.control().await?;

        let port = control.passive_port().await?;
        let data = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| TransportError::Ftp(format!("data connection failed: {}", e)))?;

        control.expect(&format!("REST {}", start), &[350]).await?;
        control.expect(&format!("RETR {}", path), &[125, 150]).await?;

        let mut buf = Vec::with_capacity(len as usize);
        data.take(len)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| TransportError::Ftp(format!("data read failed: {}", e)))?;

        // 226 on a full transfer, 426/451 when we stopped before EOF
        let (code, text) = control.read_reply().await?;
        if code >= 500 {
            return Err(TransportError::Ftp(format!("RETR failed: {} {}", code, text)));
        }
        Ok(buf)
    }
}

#[async_trait]
impl LogSource for FtpSource {
    fn describe(&self) -> String {
        format!(
            "ftp://{}@{}:{}{}",
            self.settings.user, self.settings.host, self.settings.port, self.remote_path
        )
    }

    async fn size(&mut self) -> Result<Option<u64>, TransportError> {
        let timeout_after = self.settings.timeout;
        let result = timeout(timeout_after, self.query_size())
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout_after)));
        if result.is_err() {
            self.control = None;
        }
        result
    }

    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransportError> {
        let timeout_after = self.settings.timeout;
        let result = timeout(timeout_after, self.retrieve(start, end.saturating_sub(start)))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout_after)));
        if result.is_err() {
            self.control = None;
        }
        result
    }

    async fn close(&mut self) {
        if let Some(mut control) = self.control.take() {
            let _ = control.command("QUIT").await;
        }
    }
}

struct FtpControl {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FtpControl {
    async fn open(settings: &FtpSettings) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((settings.host.as_str(), settings.port))
            .await
            .map_err(|e| TransportError::Ftp(format!("connect failed: {}", e)))?;
        let (read_half, writer) = stream.into_split();
        let mut control = Self {
            reader: BufReader::new(read_half),
            writer,
        };

        let (code, text) = control.read_reply().await?;
        if code != 220 {
            return Err(TransportError::Ftp(format!("unexpected greeting: {} {}", code, text)));
        }

        let (code, text) = control.command(&format!("USER {}", settings.user)).await?;
        match code {
            230 => {}
            331 => {
                control
                    .expect(&format!("PASS {}", settings.password), &[230, 202])
                    .await?;
            }
            _ => return Err(TransportError::Ftp(format!("USER rejected: {} {}", code, text))),
        }

        control.expect("TYPE I", &[200]).await?;
        debug!("FTP session established with {}", settings.host);
        Ok(control)
    }

    async fn read_reply(&mut self) -> Result<(u16, String), TransportError> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;

        // Multi-line replies: "123-..." until "123 ..."
        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{} ", code);
            loop {
                let line = self.read_line().await?;
                if line.starts_with(&terminator) {
                    break;
                }
            }
        }

        Ok((code, first.get(4..).unwrap_or("").to_string()))
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| TransportError::Ftp(format!("control read failed: {}", e)))?;
        if n == 0 {
            return Err(TransportError::Ftp("control connection closed".to_string()));
        }
        Ok(line.trim_end().to_string())
    }

    async fn command(&mut self, cmd: &str) -> Result<(u16, String), TransportError> {
        self.writer
            .write_all(format!("{}\r\n", cmd).as_bytes())
            .await
            .map_err(|e| TransportError::Ftp(format!("control write failed: {}", e)))?;
        self.read_reply().await
    }

    async fn expect(&mut self, cmd: &str, ok: &[u16]) -> Result<String, TransportError> {
        let (code, text) = self.command(cmd).await?;
        if ok.contains(&code) {
            Ok(text)
        } else {
            let verb = cmd.split_whitespace().next().unwrap_or(cmd);
            Err(TransportError::Ftp(format!("{} failed: {} {}", verb, code, text)))
        }
    }

    /// Enter passive mode and return the data port. The host in the reply is
    /// ignored; servers behind NAT often report a private address.
    async fn passive_port(&mut self) -> Result<u16, TransportError> {
        let text = self.expect("PASV", &[227]).await?;
        parse_pasv_port(&text)
    }
}

fn parse_code(line: &str) -> Result<u16, TransportError> {
    line.get(..3)
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| TransportError::Ftp(format!("malformed reply: {}", line)))
}

fn parse_pasv_port(text: &str) -> Result<u16, TransportError> {
    let malformed = || TransportError::Ftp(format!("malformed PASV reply: {}", text));

    let open = text.find('(').ok_or_else(malformed)?;
    let close = text[open..].find(')').ok_or_else(malformed)? + open;
    let parts: Vec<u16> = text[open + 1..close]
        .split(',')
        .map(|p| p.trim().parse::<u16>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;
    if parts.len() != 6 || parts[4] > 255 || parts[5] > 255 {
        return Err(malformed());
    }
    Ok(parts[4] * 256 + parts[5])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_pasv_port() {
        assert_eq!(
            parse_pasv_port("Entering Passive Mode (192,168,1,2,195,80).").unwrap(),
            195 * 256 + 80
        );
        assert!(parse_pasv_port("Entering Passive Mode").is_err());
        assert!(parse_pasv_port("(1,2,3,4,999,1)").is_err());
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("220 ready").unwrap(), 220);
        assert!(parse_code("hi").is_err());
    }

    /// Minimal scripted FTP server serving `content` for one session.
    async fn spawn_fake_server(content: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            writer.write_all(b"220-Welcome\r\n220 ready\r\n").await.unwrap();

            let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let data_port = data_listener.local_addr().unwrap().port();
            let mut rest = 0usize;

            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap() > 0 {
                let cmd = line.trim_end().to_string();
                line.clear();
                let reply = if cmd.starts_with("USER") {
                    "331 password please".to_string()
                } else if cmd.starts_with("PASS") {
                    "230 logged in".to_string()
                } else if cmd.starts_with("TYPE") {
                    "200 ok".to_string()
                } else if cmd.starts_with("SIZE /logs/missing.log") {
                    "550 not found".to_string()
                } else if cmd.starts_with("SIZE") {
                    format!("213 {}", content.len())
                } else if cmd.starts_with("PASV") {
                    format!(
                        "227 Entering Passive Mode (10,0,0,1,{},{})",
                        data_port / 256,
                        data_port % 256
                    )
                } else if let Some(offset) = cmd.strip_prefix("REST ") {
                    rest = offset.parse().unwrap();
                    "350 restarting".to_string()
                } else if cmd.starts_with("RETR") {
                    writer.write_all(b"150 opening\r\n").await.unwrap();
                    let (mut data, _) = data_listener.accept().await.unwrap();
                    data.write_all(&content[rest..]).await.unwrap();
                    drop(data);
                    "226 done".to_string()
                } else if cmd.starts_with("QUIT") {
                    writer.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                } else {
                    "502 not implemented".to_string()
                };
                writer
                    .write_all(format!("{}\r\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
        });

        port
    }

    fn settings(port: u16) -> FtpSettings {
        FtpSettings {
            host: "127.0.0.1".to_string(),
            port,
            user: "reforger".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_size_and_ranged_read() {
        let port = spawn_fake_server(b"line one\nline two\n").await;
        let mut source = FtpSource::new(settings(port), "/logs/console.log");

        assert_eq!(source.size().await.unwrap(), Some(18));
        assert_eq!(source.read_range(9, 18).await.unwrap(), b"line two\n");
        source.close().await;
    }

    #[tokio::test]
    async fn test_missing_remote_file() {
        let port = spawn_fake_server(b"").await;
        let mut source = FtpSource::new(settings(port), "/logs/missing.log");
        assert_eq!(source.size().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut source = FtpSource::new(settings(port), "/logs/console.log");
        assert!(source.size().await.is_err());
    }
}
