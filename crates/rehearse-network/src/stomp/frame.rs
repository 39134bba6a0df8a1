//! STOMP 프레임 인코딩/디코딩.
//!
//! 텍스트 프레임: `COMMAND\nheader:value\n...\n\nbody\0`

use rehearse_core::error::CoreError;
use rehearse_core::ports::transport::ConnectHeaders;
use std::fmt;
use std::str::FromStr;

/// STOMP 명령 (클라이언트가 쓰거나 받는 것만)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT/CONNECTED는 헤더 이스케이프를 하지 않는다 (STOMP 1.2)
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(CoreError::Protocol(format!("알 수 없는 STOMP 명령: {other}"))),
        }
    }
}

/// STOMP 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT 프레임: 인증 토큰은 `Authorization`과 `token` 양쪽에 싣는다
    pub fn connect(host: &str, auth: &ConnectHeaders) -> Self {
        let mut frame = Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        frame.headers.extend(auth.pairs());
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// JSON 본문 SEND 프레임
    pub fn send(destination: &str, body: &str) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).with_header("receipt", receipt)
    }

    /// 헤더 조회 (중복 시 첫 번째 값)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 텍스트 프레임으로 인코딩 (NUL 종료)
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// 하트비트(빈 줄만 있는 입력)인지
    pub fn is_heartbeat(input: &str) -> bool {
        input.chars().all(|c| c == '\n' || c == '\r')
    }

    /// 텍스트 프레임 디코딩
    ///
    /// 앞쪽 하트비트 EOL은 무시하고, `content-length`가 있으면 그 길이만큼 본문을 읽는다.
    pub fn decode(input: &str) -> Result<Self, CoreError> {
        let text = input.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Err(CoreError::Protocol("빈 프레임".to_string()));
        }

        let mut pos = 0;
        let mut head = Vec::new();
        loop {
            let Some(nl) = text[pos..].find('\n') else {
                return Err(CoreError::Protocol("헤더 종료 줄 없음".to_string()));
            };
            let line = text[pos..pos + nl].trim_end_matches('\r');
            pos += nl + 1;
            if line.is_empty() {
                break;
            }
            head.push(line);
        }

        let (command_line, header_lines) = head
            .split_first()
            .ok_or_else(|| CoreError::Protocol("명령 줄 없음".to_string()))?;
        let command: Command = command_line.parse()?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::with_capacity(header_lines.len());
        for line in header_lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CoreError::Protocol(format!("잘못된 헤더: {line}")))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let rest = &text[pos..];
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| CoreError::Protocol(format!("잘못된 content-length: {v}")))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => rest.get(..len).ok_or_else(|| {
                CoreError::Protocol(format!("본문 길이 부족: 기대 {len}, 실제 {}", rest.len()))
            })?,
            None => match rest.find('\0') {
                Some(end) => &rest[..end],
                None => rest,
            },
        };

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, CoreError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(CoreError::Protocol(format!(
                    "정의되지 않은 이스케이프: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
