use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// A raw SMTP reply, preserving the numeric status code and message text.
/// Multi-line replies are joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self.message.split('\n').collect();
        for (idx, line) in lines.iter().enumerate() {
            let sep = if idx + 1 == lines.len() { ' ' } else { '-' };
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}{sep}{line}", self.code)?;
        }
        Ok(())
    }
}

/// Longest single reply line kept, in bytes.
pub(crate) const MAX_LINE_BYTES: usize = 2048;
/// Most lines accepted in one (multi-line) reply.
pub(crate) const MAX_REPLY_LINES: usize = 64;

/// What came back from the peer for one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Incoming {
    Reply(SmtpReply),
    /// Bytes that do not form a valid reply, decoded lossily.
    Unparseable(String),
}

/// One SMTP connection with a wall-clock budget that starts at connect and
/// bounds every later read and write.
pub(crate) struct SmtpSession {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    deadline: Instant,
}

impl SmtpSession {
    pub(crate) fn connect(addr: &SocketAddr, budget: Duration) -> io::Result<Self> {
        let deadline = Instant::now() + budget;
        let stream = TcpStream::connect_timeout(addr, budget)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            deadline,
        })
    }

    fn remaining(&self) -> io::Result<Duration> {
        let left = self.deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "session time budget exhausted",
            ));
        }
        Ok(left)
    }

    pub(crate) fn send_line(&mut self, command: &str) -> io::Result<()> {
        self.stream.set_write_timeout(Some(self.remaining()?))?;
        let mut line = command.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.stream.write_all(&line)?;
        self.stream.flush()
    }

    /// Reads one complete reply, following `NNN-` continuation lines.
    /// Malformed, oversized or over-long replies come back as
    /// [`Incoming::Unparseable`]; only socket problems are errors.
    pub(crate) fn read_reply(&mut self) -> io::Result<Incoming> {
        let mut code = None;
        let mut message = String::new();
        for _ in 0..MAX_REPLY_LINES {
            let (raw, complete) = self.read_raw_line()?;
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\r', '\n']);
            if !complete {
                return Ok(Incoming::Unparseable(format!(
                    "{line} [line exceeds {MAX_LINE_BYTES} bytes]"
                )));
            }
            let Some((line_code, more, text)) = split_reply_line(line) else {
                return Ok(Incoming::Unparseable(line.to_string()));
            };
            match code {
                None => code = Some(line_code),
                Some(first) if first != line_code => {
                    return Ok(Incoming::Unparseable(format!(
                        "reply code changed mid-reply: {first} then {line_code}"
                    )));
                }
                Some(_) => message.push('\n'),
            }
            message.push_str(text);
            if !more {
                return Ok(Incoming::Reply(SmtpReply {
                    code: line_code,
                    message,
                }));
            }
        }
        Ok(Incoming::Unparseable(format!(
            "reply exceeds {MAX_REPLY_LINES} lines"
        )))
    }

    /// One line up to and including `\n`, capped at [`MAX_LINE_BYTES`].
    /// The flag is false when the cap was hit before the newline. Every
    /// socket read gets only what is left of the session budget.
    fn read_raw_line(&mut self) -> io::Result<(Vec<u8>, bool)> {
        let mut line = Vec::new();
        loop {
            self.stream.set_read_timeout(Some(self.remaining()?))?;
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            let (used, done) = match available.iter().position(|byte| *byte == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            let room = MAX_LINE_BYTES - line.len();
            line.extend_from_slice(&available[..used.min(room)]);
            self.reader.consume(used);
            if done && used <= room {
                return Ok((line, true));
            }
            if line.len() >= MAX_LINE_BYTES {
                return Ok((line, false));
            }
        }
    }
}

/// `"250-PIPELINING"` -> `(250, true, "PIPELINING")`.
fn split_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let code = line
        .get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .filter(|code| (200..600).contains(code))?;
    let more = match line.as_bytes().get(3) {
        None | Some(b' ') => false,
        Some(b'-') => true,
        Some(_) => return None,
    };
    Some((code, more, line.get(4..).unwrap_or_default()))
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Short code for the log details, e.g. `ConnectionRefused (os error 111)`.
pub(crate) fn error_code(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => format!("{:?} (os error {code})", err.kind()),
        None => format!("{:?}", err.kind()),
    }
}
