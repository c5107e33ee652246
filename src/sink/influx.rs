//! InfluxDB 1.x write endpoint, spoken as line protocol over plain HTTP.

use crate::sink::{DataPoint, FieldValue, Fields, Measurement, Sink, SinkError, Tag};
use std::fmt;
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, UNIX_EPOCH};
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct InfluxSink {
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl InfluxSink {
    pub fn new(
        endpoint: String,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            username,
            password,
            timeout,
        }
    }

    fn write_path(&self, base_path: &str, database: &str) -> String {
        let mut path = format!(
            "{}/write?db={}&precision=ms",
            base_path.trim_end_matches('/'),
            encode_query(database)
        );
        if let Some(username) = &self.username {
            let _ = write!(path, "&u={}", encode_query(username));
        }
        if let Some(password) = &self.password {
            let _ = write!(path, "&p={}", encode_query(password));
        }
        path
    }
}

impl fmt::Debug for InfluxSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSink")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Sink for InfluxSink {
    fn emit_data_points(
        &self,
        measurement: &Measurement,
        points: &[DataPoint],
    ) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = encode_batch(&measurement.name, points)?;
        let parsed = parse_http_url(&self.endpoint)?;
        let path = self.write_path(&parsed.path, &measurement.database);
        debug!(
            measurement = %measurement,
            points = points.len(),
            "Writing batch to InfluxDB"
        );
        send_http(&parsed, &path, &body, self.timeout)
    }

    fn modify_measurement(
        &self,
        _measurement: &Measurement,
        _selector: &Tag,
        _replacement: &Tag,
        _extra_fields: &Fields,
    ) -> Result<(), SinkError> {
        Err(SinkError::Unsupported(
            "retagging stored series requires the query API",
        ))
    }
}

pub fn encode_batch(measurement: &str, points: &[DataPoint]) -> Result<String, SinkError> {
    let mut body = String::new();
    for point in points {
        encode_line(&mut body, measurement, point)?;
        body.push('\n');
    }
    Ok(body)
}

fn encode_line(out: &mut String, measurement: &str, point: &DataPoint) -> Result<(), SinkError> {
    if point.fields.is_empty() {
        return Err(SinkError::Encode(format!(
            "point in {measurement} has no fields"
        )));
    }

    out.push_str(&escape(measurement, &[',', ' ']));
    for (name, value) in &point.tags {
        let _ = write!(
            out,
            ",{}={}",
            escape(name, &[',', '=', ' ']),
            escape(value, &[',', '=', ' '])
        );
    }

    for (index, (name, value)) in point.fields.iter().enumerate() {
        out.push(if index == 0 { ' ' } else { ',' });
        out.push_str(&escape(name, &[',', '=', ' ']));
        out.push('=');
        match value {
            FieldValue::Float(value) if value.is_finite() => {
                let _ = write!(out, "{value}");
            }
            FieldValue::Float(value) => {
                return Err(SinkError::Encode(format!(
                    "field {name} is not a finite number: {value}"
                )));
            }
            FieldValue::Integer(value) => {
                let _ = write!(out, "{value}i");
            }
            FieldValue::Text(value) => {
                let _ = write!(out, "\"{}\"", escape(value, &['"', '\\']));
            }
        }
    }

    let millis = point
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map_err(|_| SinkError::Encode("timestamp before unix epoch".to_string()))?
        .as_millis();
    let _ = write!(out, " {millis}");
    Ok(())
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedUrl {
    host: String,
    port: u16,
    path: String,
}

fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, SinkError> {
    let invalid = |message: &str| SinkError::Unavailable(format!("invalid url {endpoint}: {message}"));
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| invalid("only http:// supported"))?;

    let (host_port, path) = match trimmed.split_once('/') {
        Some((host_port, path)) => (host_port, format!("/{path}")),
        None => (trimmed, String::new()),
    };
    if host_port.is_empty() {
        return Err(invalid("missing host"));
    }

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
        ),
        None => (host_port, 8086),
    };
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

fn send_http(
    parsed: &ParsedUrl,
    path: &str,
    body: &str,
    timeout: Duration,
) -> Result<(), SinkError> {
    let addr = (parsed.host.as_str(), parsed.port)
        .to_socket_addrs()
        .map_err(|err| SinkError::Unavailable(format!("dns error: {err}")))?
        .next()
        .ok_or_else(|| SinkError::Unavailable("no addresses resolved".to_string()))?;

    let io_error = |err: std::io::Error| SinkError::Unavailable(format!("io error: {err}"));
    let mut stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|err| SinkError::Unavailable(format!("connect error: {err}")))?;
    stream.set_read_timeout(Some(timeout)).map_err(io_error)?;
    stream.set_write_timeout(Some(timeout)).map_err(io_error)?;

    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        path,
        parsed.host,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).map_err(io_error)?;

    let mut response = String::new();
    stream.read_to_string(&mut response).map_err(io_error)?;

    let (headers, response_body) = response
        .split_once("\r\n\r\n")
        .unwrap_or((response.as_str(), ""));
    let status_code = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| SinkError::Unavailable("invalid http response".to_string()))?;

    match status_code {
        200..=299 => Ok(()),
        400..=499 => Err(SinkError::Rejected(format!(
            "http status {status_code} ({})",
            response_body.trim()
        ))),
        _ => Err(SinkError::Unavailable(format!(
            "http status {status_code} ({})",
            response_body.trim()
        ))),
    }
}
