//! Minimal passive-mode FTP client for the corpus server.
//!
//! Only the commands the sync needs are spoken: `USER`/`PASS`, `TYPE I`,
//! `CWD`, `PASV`, `NLST`, `LIST`, `MDTM` and `RETR`. One logical session is
//! kept per [`FtpSource`]; concurrent callers serialize on it, and any error
//! that leaves the session in an unknown state drops it so the next call
//! reconnects.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::listing::{parse_list_line, parse_mdtm_timestamp};
use super::{RemoteFileEntry, RemoteSource, TransferError};

/// Standard FTP control port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Connect timeout for control and data connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read buffer for binary transfers.
const TRANSFER_CHUNK_BYTES: usize = 64 * 1024;

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// Login credentials. The empty pair is the normal anonymous mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// User name; empty means `anonymous`.
    pub user: String,
    /// Password; empty means the conventional anonymous password.
    pub password: String,
}

impl Credentials {
    /// Anonymous credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Creates explicit credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    fn login_pair(&self) -> (&str, &str) {
        let user = if self.user.is_empty() {
            ANONYMOUS_USER
        } else {
            self.user.as_str()
        };
        let password = if self.password.is_empty() && user == ANONYMOUS_USER {
            ANONYMOUS_PASSWORD
        } else {
            self.password.as_str()
        };
        (user, password)
    }
}

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    text: String,
}

/// FTP implementation of [`RemoteSource`].
pub struct FtpSource {
    host: String,
    port: u16,
    credentials: Credentials,
    session: Mutex<Option<Session>>,
}

impl FtpSource {
    /// Creates a source for `host` on the standard port with anonymous login.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_credentials(host, DEFAULT_FTP_PORT, Credentials::anonymous())
    }

    /// Creates a source with an explicit port and credentials.
    pub fn with_credentials(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            session: Mutex::new(None),
        }
    }

    async fn ensure_session<'s>(
        &self,
        slot: &'s mut Option<Session>,
    ) -> Result<&'s mut Session, TransferError> {
        let session = match slot.take() {
            Some(session) => session,
            None => Session::connect(&self.host, self.port, &self.credentials).await?,
        };
        Ok(slot.insert(session))
    }
}

impl std::fmt::Debug for FtpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpSource")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.credentials.login_pair().0)
            .finish_non_exhaustive()
    }
}

/// Drops the session when `result` says it can no longer be trusted.
fn settle<T>(slot: &mut Option<Session>, result: &Result<T, TransferError>) {
    if let Err(error) = result
        && error.invalidates_session()
    {
        debug!(error = %error, "discarding FTP session");
        *slot = None;
    }
}

#[async_trait]
impl RemoteSource for FtpSource {
    fn target(&self) -> String {
        if self.port == DEFAULT_FTP_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn list_names(&self, remote_dir: &str) -> Result<Vec<String>, TransferError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;
        let result = session.listing(remote_dir, "NLST").await;
        settle(&mut guard, &result);
        let lines = result?;
        // Some servers answer NLST with paths relative to the login directory.
        Ok(lines
            .into_iter()
            .map(|line| match line.rsplit_once('/') {
                Some((_, name)) => name.to_string(),
                None => line,
            })
            .collect())
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn list_details(
        &self,
        remote_dir: &str,
    ) -> Result<Vec<RemoteFileEntry>, TransferError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;
        let result = session.listing(remote_dir, "LIST").await;
        settle(&mut guard, &result);
        let lines = result?;

        let mut entries = Vec::with_capacity(lines.len());
        for line in &lines {
            match parse_list_line(line) {
                Some(entry) => entries.push(entry),
                None => warn!(line = %line, "skipping unparseable listing line"),
            }
        }
        Ok(entries)
    }

    async fn modified_time(
        &self,
        remote_dir: &str,
        name: &str,
    ) -> Result<DateTime<Utc>, TransferError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;
        let result = session.modified_time(remote_dir, name).await;
        settle(&mut guard, &result);
        result
    }

    #[instrument(skip(self, destination), fields(host = %self.host, dest = %destination.display()))]
    async fn retrieve(
        &self,
        remote_dir: &str,
        name: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;
        let result = session.retrieve(remote_dir, name, destination).await;
        settle(&mut guard, &result);
        result
    }
}

/// An authenticated control connection.
struct Session {
    control: BufReader<TcpStream>,
    peer: IpAddr,
    cwd: Option<String>,
}

impl Session {
    #[instrument(skip(credentials))]
    async fn connect(host: &str, port: u16, credentials: &Credentials) -> Result<Self, TransferError> {
        let target = format!("{host}:{port}");
        let stream = connect_with_timeout(&target).await?;
        let peer = stream
            .peer_addr()
            .map_err(|e| TransferError::connect(target.clone(), e))?
            .ip();

        let mut session = Self {
            control: BufReader::new(stream),
            peer,
            cwd: None,
        };

        let greeting = session.reply().await?;
        if greeting.code != 220 {
            return Err(TransferError::protocol("CONNECT", greeting.code, greeting.text));
        }

        let (user, password) = credentials.login_pair();
        let reply = session.command(&format!("USER {user}")).await?;
        match reply.code {
            230 => {}
            331 | 332 => {
                session
                    .command_expect(&format!("PASS {password}"), &[230, 202])
                    .await?;
            }
            code => return Err(TransferError::protocol("USER", code, reply.text)),
        }

        session.command_expect("TYPE I", &[200]).await?;
        debug!(target = %target, "FTP session established");
        Ok(session)
    }

    async fn send(&mut self, command: &str) -> Result<(), TransferError> {
        let stream = self.control.get_mut();
        stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await
            .map_err(TransferError::connection_lost)?;
        stream.flush().await.map_err(TransferError::connection_lost)
    }

    async fn reply(&mut self) -> Result<Reply, TransferError> {
        read_reply(&mut self.control)
            .await
            .map_err(TransferError::connection_lost)
    }

    async fn command(&mut self, command: &str) -> Result<Reply, TransferError> {
        self.send(command).await?;
        self.reply().await
    }

    async fn command_expect(
        &mut self,
        command: &str,
        accepted: &[u16],
    ) -> Result<Reply, TransferError> {
        let reply = self.command(command).await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(TransferError::protocol(command, reply.code, reply.text))
        }
    }

    async fn change_dir(&mut self, remote_dir: &str) -> Result<(), TransferError> {
        if self.cwd.as_deref() == Some(remote_dir) {
            return Ok(());
        }
        self.command_expect(&format!("CWD {remote_dir}"), &[250])
            .await?;
        self.cwd = Some(remote_dir.to_string());
        Ok(())
    }

    async fn open_data(&mut self) -> Result<TcpStream, TransferError> {
        let reply = self.command_expect("PASV", &[227]).await?;
        let (_, port) = parse_pasv(&reply.text)
            .ok_or_else(|| TransferError::protocol("PASV", reply.code, reply.text.clone()))?;
        // The advertised address is often a private one behind NAT; the
        // control peer is always reachable.
        connect_with_timeout(&format!("{}:{port}", self.peer)).await
    }

    async fn listing(&mut self, remote_dir: &str, verb: &str) -> Result<Vec<String>, TransferError> {
        self.change_dir(remote_dir).await?;
        let data = self.open_data().await?;
        let start = self.command(verb).await?;
        match start.code {
            125 | 150 => {}
            // CWD already succeeded, so "no such file" here means an empty directory.
            450 | 550 => return Ok(Vec::new()),
            code => return Err(TransferError::protocol(verb, code, start.text)),
        }

        let mut body = String::new();
        BufReader::new(data)
            .read_to_string(&mut body)
            .await
            .map_err(TransferError::connection_lost)?;
        self.expect_completion(verb).await?;

        Ok(body
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn modified_time(
        &mut self,
        remote_dir: &str,
        name: &str,
    ) -> Result<DateTime<Utc>, TransferError> {
        self.change_dir(remote_dir).await?;
        let reply = self.command_expect(&format!("MDTM {name}"), &[213]).await?;
        parse_mdtm_timestamp(&reply.text).ok_or_else(|| TransferError::timestamp(name, reply.text))
    }

    async fn retrieve(
        &mut self,
        remote_dir: &str,
        name: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        self.change_dir(remote_dir).await?;
        let mut data = self.open_data().await?;
        self.command_expect(&format!("RETR {name}"), &[125, 150])
            .await?;

        let file = File::create(destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0_u8; TRANSFER_CHUNK_BYTES];
        let mut bytes_written: u64 = 0;

        loop {
            let read = data
                .read(&mut buffer)
                .await
                .map_err(TransferError::connection_lost)?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .await
                .map_err(|e| TransferError::io(destination, e))?;
            bytes_written += read as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        drop(data);

        self.expect_completion("RETR").await?;
        debug!(name, bytes = bytes_written, "transfer complete");
        Ok(bytes_written)
    }

    async fn expect_completion(&mut self, verb: &str) -> Result<(), TransferError> {
        let done = self.reply().await?;
        if matches!(done.code, 226 | 250) {
            Ok(())
        } else {
            Err(TransferError::protocol(verb, done.code, done.text))
        }
    }
}

async fn connect_with_timeout(target: &str) -> Result<TcpStream, TransferError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(error)) => Err(TransferError::connect(target, error)),
        Err(_) => Err(TransferError::connect(
            target,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        )),
    }
}

/// Reads one (possibly multi-line) reply from the control channel.
///
/// Multi-line replies open with `NNN-` and end at the first line starting
/// with the same code followed by a space.
async fn read_reply<R>(reader: &mut R) -> std::io::Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(closed_control());
    }
    let (code, multiline) = parse_reply_head(&line)?;
    let mut text = line.get(4..).unwrap_or("").trim_end().to_string();

    if multiline {
        let terminator = format!("{code} ");
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(closed_control());
            }
            text.push('\n');
            if line.starts_with(&terminator) {
                text.push_str(line[terminator.len()..].trim_end());
                break;
            }
            text.push_str(line.trim_end());
        }
    }

    Ok(Reply { code, text })
}

fn parse_reply_head(line: &str) -> std::io::Result<(u16, bool)> {
    let code = line
        .get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed FTP reply: {}", line.trim_end()),
            )
        })?;
    Ok((code, line.as_bytes().get(3) == Some(&b'-')))
}

fn closed_control() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "control connection closed by server",
    )
}

/// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
fn parse_pasv(text: &str) -> Option<(Ipv4Addr, u16)> {
    let open = text.find('(')?;
    let close = open + text[open..].find(')')?;
    let numbers = text[open + 1..close]
        .split(',')
        .map(|part| part.trim().parse::<u8>().ok())
        .collect::<Option<Vec<u8>>>()?;
    let [a, b, c, d, high, low] = numbers.as_slice() else {
        return None;
    };
    Some((
        Ipv4Addr::new(*a, *b, *c, *d),
        u16::from(*high) * 256 + u16::from(*low),
    ))
}
