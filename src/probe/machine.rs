use super::session::SmtpReply;

/// Replies that prove a live, well-behaved SMTP server even though it refuses
/// the synthetic sender or recipient.
pub const REJECTION_CODES: [u16; 4] = [550, 553, 501, 503];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Connecting,
    /// TCP connected, waiting for the server banner.
    AwaitingGreeting,
    EhloSent,
    MailFromSent,
    RcptToSent,
    Quitting,
    Closed,
    Failed,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(String),
    Close,
}

/// Response-driven SMTP dialogue for one connection. Pure: the caller owns
/// the socket and feeds replies in.
#[derive(Debug, Clone)]
pub struct SmtpMachine {
    state: ProbeState,
    connected: bool,
    identity: String,
    domain: String,
}

impl SmtpMachine {
    pub fn new(identity: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            state: ProbeState::Connecting,
            connected: false,
            identity: identity.into(),
            domain: domain.into(),
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn on_connect(&mut self) {
        self.connected = true;
        self.state = ProbeState::AwaitingGreeting;
    }

    pub fn on_reply(&mut self, reply: &SmtpReply) -> Action {
        use ProbeState::*;

        match (self.state, reply.code) {
            (Connecting | Closed | Failed, _) => Action::Close,
            (_, 221) | (Quitting, _) => {
                self.state = Closed;
                Action::Close
            }
            (AwaitingGreeting, 220) => {
                self.state = EhloSent;
                Action::Send(format!("EHLO {}", self.identity))
            }
            (EhloSent, 250) => {
                self.state = MailFromSent;
                Action::Send(format!("MAIL FROM:<probe@{}>", self.identity))
            }
            (MailFromSent, 250) => {
                self.state = RcptToSent;
                Action::Send(format!("RCPT TO:<probe@{}>", self.domain))
            }
            (RcptToSent, 250 | 251) => self.quit(),
            (_, code) if REJECTION_CODES.contains(&code) => {
                self.connected = true;
                self.quit()
            }
            _ => self.quit(),
        }
    }

    /// Input that is not an SMTP reply. The peer answered, so `connected`
    /// is left as it is; the dialogue ends with a `QUIT`.
    pub fn on_unparseable(&mut self) -> Action {
        match self.state {
            ProbeState::Connecting | ProbeState::Closed | ProbeState::Failed => Action::Close,
            ProbeState::Quitting => {
                self.state = ProbeState::Closed;
                Action::Close
            }
            _ => self.quit(),
        }
    }

    /// Socket error or timeout. Absorbing.
    pub fn on_failure(&mut self) {
        self.connected = false;
        self.state = ProbeState::Failed;
    }

    /// Socket closed by either side; yields the final `connected` flag.
    pub fn on_close(&mut self) -> bool {
        if self.state != ProbeState::Failed {
            self.state = ProbeState::Closed;
        }
        self.connected
    }

    fn quit(&mut self) -> Action {
        self.state = ProbeState::Quitting;
        Action::Send("QUIT".to_string())
    }
}
