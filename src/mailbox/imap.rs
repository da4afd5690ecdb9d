//! IMAP over implicit TLS, limited to the commands a run needs.
//!
//! LOGIN, SELECT, SEARCH UNSEEN, FETCH BODY.PEEK[], STORE +FLAGS (\Seen)
//! and LOGOUT. The client is blocking; [`ImapMailbox`] moves every call
//! onto tokio's blocking pool.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::{FetchedMessage, Mailbox, MailboxConnector, MessageId};
use crate::config::MailboxConfig;
use crate::error::MailboxError;

/// Largest literal accepted from the server.
pub const MAX_LITERAL_BYTES: usize = 64 * 1024 * 1024;

/// TLS stream used against real servers.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

// ── Responses ───────────────────────────────────────────────────────

/// Completion status of a tagged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// Everything the server sent for one tagged command.
#[derive(Debug, Default)]
struct Response {
    untagged: Vec<String>,
    literals: Vec<Vec<u8>>,
    status: Option<Status>,
    text: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }
}

/// Parse `OK ...` / `NO ...` / `BAD ...` after the tag.
fn parse_status(rest: &str) -> (Option<Status>, String) {
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        _ => None,
    };
    (status, text.trim().to_string())
}

/// Byte count of a trailing `{n}` literal announcement, if any.
fn literal_len(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let inner = line[open + 1..].strip_suffix('}')?;
    let inner = inner.strip_suffix('+').unwrap_or(inner);
    inner.parse().ok()
}

/// Collect ids from `* SEARCH 1 2 3` lines.
fn parse_search(untagged: &[String]) -> Vec<MessageId> {
    untagged
        .iter()
        .filter_map(|line| {
            let rest = line.strip_prefix("* ")?;
            let (keyword, ids) = rest.split_once(' ').unwrap_or((rest, ""));
            keyword.eq_ignore_ascii_case("SEARCH").then_some(ids)
        })
        .flat_map(|ids| ids.split_whitespace())
        .map(MessageId::new)
        .collect()
}

/// Encode a string as an IMAP quoted string.
fn quote(value: &str) -> Result<String, MailboxError> {
    if value.contains(['\r', '\n']) {
        return Err(MailboxError::Protocol(
            "line breaks are not allowed in quoted strings".into(),
        ));
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    Ok(format!("\"{escaped}\""))
}

// ── Client ──────────────────────────────────────────────────────────

/// Blocking IMAP client over any byte stream.
pub struct ImapClient<S: Read + Write> {
    reader: BufReader<S>,
    next_tag: u32,
}

impl<S: Read + Write> ImapClient<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn connect(stream: S) -> Result<Self, MailboxError> {
        let mut client = Self {
            reader: BufReader::new(stream),
            next_tag: 1,
        };
        let greeting = client.read_line()?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok(client)
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<(), MailboxError> {
        let cmd = format!("LOGIN {} {}", quote(user)?, quote(password)?);
        let resp = self.send("LOGIN", &cmd)?;
        if !resp.is_ok() {
            return Err(MailboxError::Login {
                user: user.to_string(),
                reason: resp.text,
            });
        }
        Ok(())
    }

    pub fn select(&mut self, folder: &str) -> Result<(), MailboxError> {
        let resp = self.send("SELECT", &format!("SELECT {}", quote(folder)?))?;
        if !resp.is_ok() {
            return Err(MailboxError::Select {
                folder: folder.to_string(),
                reason: resp.text,
            });
        }
        Ok(())
    }

    pub fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError> {
        let resp = self.checked("SEARCH", "SEARCH UNSEEN")?;
        Ok(parse_search(&resp.untagged))
    }

    /// Fetch the whole message. `BODY.PEEK[]` leaves the flags untouched.
    pub fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>, MailboxError> {
        let resp = self
            .send("FETCH", &format!("FETCH {id} BODY.PEEK[]"))
            .map_err(|e| MailboxError::Fetch {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.is_ok() {
            return Err(MailboxError::Fetch {
                id: id.to_string(),
                reason: resp.text,
            });
        }
        resp.literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Fetch {
                id: id.to_string(),
                reason: "server returned no message body".into(),
            })
    }

    pub fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailboxError> {
        self.checked("STORE", &format!("STORE {id} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), MailboxError> {
        // A BYE followed by a closed socket is a normal ending.
        match self.send("LOGOUT", "LOGOUT") {
            Ok(_) | Err(MailboxError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send a command and require an `OK` completion.
    fn checked(&mut self, name: &str, cmd: &str) -> Result<Response, MailboxError> {
        let resp = self.send(name, cmd)?;
        if !resp.is_ok() {
            return Err(MailboxError::Command {
                command: name.to_string(),
                reason: resp.text,
            });
        }
        Ok(resp)
    }

    /// Send one tagged command and read until its completion line.
    fn send(&mut self, name: &str, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        debug!(tag = %tag, command = name, "IMAP command");
        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        self.read_response(&tag)
    }

    fn read_response(&mut self, tag: &str) -> Result<Response, MailboxError> {
        let mut resp = Response::default();
        loop {
            let mut line = self.read_line()?;
            while let Some(len) = literal_len(&line) {
                resp.literals.push(self.read_literal(len)?);
                let rest = self.read_line()?;
                line.push_str(&rest);
            }

            if let Some(rest) = line.strip_prefix(tag).and_then(|r| r.strip_prefix(' ')) {
                let (status, text) = parse_status(rest);
                resp.status = status;
                resp.text = text;
                return Ok(resp);
            }
            resp.untagged.push(line);
        }
    }

    /// Read a `{len}` literal, growing the buffer only as bytes arrive.
    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailboxError> {
        if len > MAX_LITERAL_BYTES {
            return Err(MailboxError::Protocol(format!(
                "literal of {len} bytes exceeds the {MAX_LITERAL_BYTES} byte limit"
            )));
        }
        let mut literal = Vec::new();
        let read = self
            .reader
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut literal)?;
        if read < len {
            return Err(MailboxError::Closed);
        }
        Ok(literal)
    }

    /// Read one CRLF-terminated line, without the terminator.
    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(MailboxError::Closed);
        }
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

// ── TLS connection ──────────────────────────────────────────────────

/// Open TCP + TLS, log in and select the configured folder.
pub fn connect_tls(config: &MailboxConfig) -> Result<ImapClient<TlsStream>, MailboxError> {
    let connect_err = |reason: String| MailboxError::Connect {
        host: config.host.clone(),
        port: config.port,
        reason,
    };

    let tcp = TcpStream::connect((config.host.as_str(), config.port))
        .map_err(|e| connect_err(e.to_string()))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| MailboxError::Tls(format!("invalid server name {}: {e}", config.host)))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let tls = rustls::StreamOwned::new(conn, tcp);

    let mut client = ImapClient::connect(tls)?;
    client.login(&config.user, config.password.expose_secret())?;
    client.select(&config.folder)?;
    Ok(client)
}

/// Opens [`ImapMailbox`] sessions from a [`MailboxConfig`].
pub struct ImapConnector {
    config: MailboxConfig,
}

impl ImapConnector {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn open(&self) -> Result<Box<dyn Mailbox>, MailboxError> {
        let config = self.config.clone();
        let client = tokio::task::spawn_blocking(move || connect_tls(&config))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))??;

        info!(
            host = %self.config.host,
            folder = %self.config.folder,
            "Mailbox session opened"
        );
        Ok(Box::new(ImapMailbox::new(client)))
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Async [`Mailbox`] over a blocking [`ImapClient`].
pub struct ImapMailbox<S: Read + Write> {
    client: Arc<Mutex<ImapClient<S>>>,
}

impl<S> ImapMailbox<S>
where
    S: Read + Write + Send + 'static,
{
    pub fn new(client: ImapClient<S>) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapClient<S>) -> Result<T, MailboxError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut guard = client
                .lock()
                .map_err(|_| MailboxError::Task("IMAP client mutex poisoned".into()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl<S> Mailbox for ImapMailbox<S>
where
    S: Read + Write + Send + 'static,
{
    async fn list_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError> {
        self.blocking(|c| c.search_unseen()).await
    }

    async fn fetch(&mut self, id: &MessageId) -> Result<FetchedMessage, MailboxError> {
        let id = id.clone();
        self.blocking(move |c| {
            let raw = c.fetch_raw(&id)?;
            Ok(FetchedMessage::new(id, raw))
        })
        .await
    }

    async fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailboxError> {
        let id = id.clone();
        self.blocking(move |c| c.mark_seen(&id)).await
    }

    async fn close(&mut self) -> Result<(), MailboxError> {
        self.blocking(|c| c.logout()).await?;
        info!("Mailbox session closed");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// In-memory stream: reads a canned server transcript, records writes.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedStream {
        fn new(script: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    input: Cursor::new(script.to_vec()),
                    written: Arc::clone(&written),
                },
                written,
            )
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sent(written: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(written.lock().unwrap().clone()).unwrap()
    }

    const GREETING: &str = "* OK IMAP4rev1 ready\r\n";

    // ── Parsing helpers ─────────────────────────────────────────────

    #[test]
    fn literal_len_detects_trailing_literal() {
        assert_eq!(literal_len("* 1 FETCH (BODY[] {342}"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (BODY[] {12+}"), Some(12));
        assert_eq!(literal_len("* 1 FETCH (FLAGS (\\Seen))"), None);
        assert_eq!(literal_len("{abc}"), None);
    }

    #[test]
    fn search_ids_are_collected_in_order() {
        let lines = vec![
            "* 3 EXISTS".to_string(),
            "* SEARCH 4 9 12".to_string(),
        ];
        let ids: Vec<String> = parse_search(&lines)
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["4", "9", "12"]);
    }

    #[test]
    fn empty_search_yields_no_ids() {
        assert!(parse_search(&["* SEARCH".to_string()]).is_empty());
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote(r#"pa"ss\word"#).unwrap(), r#""pa\"ss\\word""#);
        assert!(quote("a\r\nb").is_err());
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status("OK LOGIN completed").0, Some(Status::Ok));
        assert_eq!(parse_status("no [AUTHENTICATIONFAILED] nope").0, Some(Status::No));
        let (status, text) = parse_status("BAD syntax");
        assert_eq!(status, Some(Status::Bad));
        assert_eq!(text, "syntax");
    }

    // ── Command flow ────────────────────────────────────────────────

    #[test]
    fn login_select_search_fetch_store_logout() {
        let body = "Subject: Invoice #1\r\n\r\nhello\r\n";
        let script = format!(
            "{GREETING}\
             A0001 OK LOGIN completed\r\n\
             * 2 EXISTS\r\n\
             A0002 OK [READ-WRITE] SELECT completed\r\n\
             * SEARCH 2\r\n\
             A0003 OK SEARCH completed\r\n\
             * 2 FETCH (BODY[] {{{len}}}\r\n{body})\r\n\
             A0004 OK FETCH completed\r\n\
             * 2 FETCH (FLAGS (\\Seen))\r\n\
             A0005 OK STORE completed\r\n\
             * BYE logging out\r\n\
             A0006 OK LOGOUT completed\r\n",
            len = body.len(),
        );
        let (stream, written) = ScriptedStream::new(script.as_bytes());

        let mut client = ImapClient::connect(stream).unwrap();
        client.login("ap@corp.test", "secret").unwrap();
        client.select("INBOX").unwrap();
        let ids = client.search_unseen().unwrap();
        assert_eq!(ids, vec![MessageId::new("2")]);
        let raw = client.fetch_raw(&ids[0]).unwrap();
        assert_eq!(raw, body.as_bytes());
        client.mark_seen(&ids[0]).unwrap();
        client.logout().unwrap();

        let sent = sent(&written);
        assert!(sent.contains("A0001 LOGIN \"ap@corp.test\" \"secret\"\r\n"));
        assert!(sent.contains("A0002 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A0003 SEARCH UNSEEN\r\n"));
        assert!(sent.contains("A0004 FETCH 2 BODY.PEEK[]\r\n"));
        assert!(sent.contains("A0005 STORE 2 +FLAGS (\\Seen)\r\n"));
        assert!(sent.contains("A0006 LOGOUT\r\n"));
    }

    #[test]
    fn rejected_login_is_a_login_error() {
        let script = format!("{GREETING}A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();

        let err = client.login("ap", "wrong").unwrap_err();
        match err {
            MailboxError::Login { user, reason } => {
                assert_eq!(user, "ap");
                assert!(reason.contains("Invalid credentials"));
            }
            other => panic!("expected login error, got {other:?}"),
        }
    }

    #[test]
    fn oversized_literal_is_refused_before_reading() {
        let script = format!(
            "{GREETING}* 2 FETCH (BODY[] {{{len}}}\r\nshort)\r\nA0001 OK FETCH completed\r\n",
            len = MAX_LITERAL_BYTES + 1,
        );
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();

        let err = client.fetch_raw(&MessageId::new("2")).unwrap_err();
        assert!(matches!(err, MailboxError::Fetch { ref reason, .. } if reason.contains("exceeds")));
    }

    #[test]
    fn truncated_literal_is_a_closed_connection() {
        let script = format!("{GREETING}* 2 FETCH (BODY[] {{100}}\r\nonly a few bytes");
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();

        let err = client.fetch_raw(&MessageId::new("2")).unwrap_err();
        assert!(
            matches!(err, MailboxError::Fetch { ref reason, .. } if reason.contains("closed")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn bye_greeting_is_rejected() {
        let (stream, _) = ScriptedStream::new(b"* BYE too many connections\r\n");
        assert!(matches!(
            ImapClient::connect(stream),
            Err(MailboxError::Protocol(_))
        ));
    }

    #[test]
    fn fetch_without_body_is_a_fetch_error() {
        let script = format!("{GREETING}A0001 OK FETCH completed\r\n");
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();

        let err = client.fetch_raw(&MessageId::new("7")).unwrap_err();
        assert!(matches!(err, MailboxError::Fetch { ref id, .. } if id == "7"));
    }

    #[test]
    fn closed_connection_mid_command() {
        let (stream, _) = ScriptedStream::new(GREETING.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();
        assert!(matches!(
            client.search_unseen(),
            Err(MailboxError::Closed)
        ));
    }

    #[test]
    fn logout_tolerates_closed_socket() {
        let script = format!("{GREETING}* BYE bye\r\n");
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut client = ImapClient::connect(stream).unwrap();
        client.logout().unwrap();
    }

    #[tokio::test]
    async fn async_session_delegates_to_client() {
        let script = format!(
            "{GREETING}\
             * SEARCH 5 6\r\n\
             A0001 OK SEARCH completed\r\n\
             A0002 NO STORE failed\r\n\
             A0003 OK LOGOUT completed\r\n"
        );
        let (stream, _) = ScriptedStream::new(script.as_bytes());
        let mut mailbox = ImapMailbox::new(ImapClient::connect(stream).unwrap());

        let ids = mailbox.list_unseen().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(matches!(
            mailbox.mark_seen(&ids[0]).await,
            Err(MailboxError::Command { .. })
        ));
        mailbox.close().await.unwrap();
    }
}
